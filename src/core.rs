use std::sync::Arc;

use tracing::info;

use crate::channels::TelegramTransport;
use crate::config::AppConfig;
use crate::handlers::Handlers;
use crate::providers::GeminiProvider;
use crate::registration::{InMemoryCache, Registration};
use crate::state::SqliteStateStore;
use crate::traits::Outbound;

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    // 1. Store
    let store = Arc::new(
        SqliteStateStore::new(&config.state.db_path, config.state.max_connections).await?,
    );
    info!("State store initialized ({})", config.state.db_path);

    // 2. Provider
    let provider = Arc::new(GeminiProvider::new(
        &config.provider.api_key,
        &config.provider.base_url,
    )?);
    info!(
        text_model = %config.provider.text_model,
        vision_model = %config.provider.vision_model,
        "Generative backend configured"
    );

    // 3. Transport
    let transport = Arc::new(TelegramTransport::new(&config.telegram.bot_token)?);
    let outbound: Arc<dyn Outbound> = transport.clone();

    // 4. Registration state machine with its injectable cache
    let registration = Arc::new(Registration::new(
        store.clone(),
        Arc::new(InMemoryCache::default()),
    ));

    // 5. Handlers
    let handlers = Arc::new(Handlers::new(
        store,
        provider,
        outbound,
        registration,
        config.provider.text_model.clone(),
        config.provider.vision_model.clone(),
        config.policy.clone(),
    ));

    if config.policy.enforce_verification {
        info!("Verification gating is ON: unverified users cannot use conversational features");
    }

    // 6. Dispatch until shutdown
    transport.run(handlers).await;
    Ok(())
}
