use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::config::PolicyConfig;
use crate::registration::Registration;
use crate::tasks::FollowUpRegistry;
use crate::traits::{
    extract_text, ChatExchange, FileAnalysis, ModelProvider, Outbound, SearchRecord, StateStore,
};
use crate::types::{AttachmentRef, InboundEvent, UserIdentity};

const MESSAGE_PROMPT_PREFIX: &str =
    "Respond to this message with a helpful and friendly tone, and include relevant emojis: ";
const FOLLOW_UP_TEXT: &str = "Is there anything else I can help you with? 😊";
const MESSAGE_FAILED_TEXT: &str = "❌ Sorry, I couldn't process your request. Please try again.";
const FILE_PROMPT: &str = "Analyze and describe this content in detail:";
const FILE_FAILED_TEXT: &str = "❌ Failed to analyze file";
const SEARCH_USAGE_TEXT: &str = "Usage: /websearch <your query here>";
const UNVERIFIED_TEXT: &str = "Please complete registration with /start first.";

const FALLBACK_MIME: &str = "application/octet-stream";

/// Per-event-type logic behind the registration gate: forward to the
/// generative backend, persist the exchange, reply. Failures send a fixed
/// apology and write nothing.
pub struct Handlers {
    store: Arc<dyn StateStore>,
    provider: Arc<dyn ModelProvider>,
    outbound: Arc<dyn Outbound>,
    registration: Arc<Registration>,
    follow_ups: Arc<FollowUpRegistry>,
    text_model: String,
    vision_model: String,
    policy: PolicyConfig,
}

impl Handlers {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn StateStore>,
        provider: Arc<dyn ModelProvider>,
        outbound: Arc<dyn Outbound>,
        registration: Arc<Registration>,
        text_model: String,
        vision_model: String,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            store,
            provider,
            outbound,
            registration,
            follow_ups: Arc::new(FollowUpRegistry::default()),
            text_model,
            vision_model,
            policy,
        }
    }

    /// Route one inbound event. Registration events go to the state
    /// machine; conversational events pass the (optional) verification
    /// gate first. Never returns an error for per-message failures — those
    /// end with an apology to the user.
    pub async fn dispatch(self: &Arc<Self>, user: UserIdentity, event: InboundEvent) {
        let result = match event {
            InboundEvent::Entry => {
                self.registration
                    .handle_entry(&user, self.outbound.as_ref())
                    .await
            }
            InboundEvent::Contact(contact) => {
                self.registration
                    .handle_contact(&user, &contact, self.outbound.as_ref())
                    .await
            }
            InboundEvent::Text { text } => {
                if self.gate(&user).await {
                    self.spawn_text_reply(user.clone(), text);
                }
                Ok(())
            }
            InboundEvent::Search { query } => {
                if self.gate(&user).await {
                    self.handle_search(&user, &query).await
                } else {
                    Ok(())
                }
            }
            InboundEvent::Attachment(attachment) => {
                if self.gate(&user).await {
                    self.handle_attachment(&user, attachment).await
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            // Transport send failures end up here; there is nothing left
            // to tell the user through a transport that cannot send.
            error!(chat_id = user.chat_id, "Event handling failed: {}", e);
        }
    }

    /// Verification gate for conversational features. Advisory by default:
    /// passes everyone unless `enforce_verification` is on.
    async fn gate(&self, user: &UserIdentity) -> bool {
        if !self.policy.enforce_verification {
            return true;
        }
        if self.registration.is_verified(user.chat_id).await {
            return true;
        }
        if let Err(e) = self.outbound.send_text(user.chat_id, UNVERIFIED_TEXT).await {
            error!(chat_id = user.chat_id, "Failed to send gate notice: {}", e);
        }
        false
    }

    /// Text messages are handled on a detached task so the dispatch loop
    /// keeps accepting events while the backend call is outstanding. The
    /// newer message also cancels any follow-up still pending for the chat.
    fn spawn_text_reply(self: &Arc<Self>, user: UserIdentity, text: String) {
        self.follow_ups.cancel(user.chat_id);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.generate_and_reply(&user, &text).await {
                error!(chat_id = user.chat_id, "Error generating response: {}", e);
                if let Err(e) = this
                    .outbound
                    .send_text(user.chat_id, MESSAGE_FAILED_TEXT)
                    .await
                {
                    error!(chat_id = user.chat_id, "Failed to send apology: {}", e);
                }
            }
        });
    }

    async fn generate_and_reply(&self, user: &UserIdentity, text: &str) -> anyhow::Result<()> {
        let prompt = format!("{}{}", MESSAGE_PROMPT_PREFIX, text);
        let response = self.provider.generate(&self.text_model, &prompt).await?;
        let reply = extract_text(&response);

        self.store
            .append_exchange(&ChatExchange {
                user_id: user.chat_id,
                input: text.to_string(),
                response: reply.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        self.outbound.send_text(user.chat_id, &reply).await?;

        // Unconditional follow-up after a fixed delay, abortable by the
        // next message from this chat.
        let outbound = Arc::clone(&self.outbound);
        let chat_id = user.chat_id;
        let delay = Duration::from_secs(self.policy.follow_up_delay_secs);
        self.follow_ups.schedule(chat_id, async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = outbound.send_text(chat_id, FOLLOW_UP_TEXT).await {
                error!(chat_id, "Failed to send follow-up: {}", e);
            }
        });
        Ok(())
    }

    async fn handle_attachment(
        &self,
        user: &UserIdentity,
        attachment: AttachmentRef,
    ) -> anyhow::Result<()> {
        if let Err(e) = self.analyze_attachment(user, &attachment).await {
            error!(chat_id = user.chat_id, "File processing error: {}", e);
            self.outbound.send_text(user.chat_id, FILE_FAILED_TEXT).await?;
        }
        Ok(())
    }

    async fn analyze_attachment(
        &self,
        user: &UserIdentity,
        attachment: &AttachmentRef,
    ) -> anyhow::Result<()> {
        let file = self.outbound.fetch_file(&attachment.file_id).await?;
        let filename = attachment
            .filename
            .clone()
            .unwrap_or_else(|| file.filename.clone());

        // Declared media kind wins; otherwise guess from the filename and
        // fall back to generic binary.
        let mime_type = attachment.mime_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_raw()
                .unwrap_or(FALLBACK_MIME)
                .to_string()
        });

        info!(
            chat_id = user.chat_id,
            kind = ?attachment.kind,
            filename = %filename,
            size = file.bytes.len(),
            mime = %mime_type,
            "Analyzing attachment"
        );

        let response = self
            .provider
            .generate_with_media(&self.vision_model, FILE_PROMPT, &mime_type, &file.bytes)
            .await?;
        let analysis = extract_text(&response);

        let file_type = mime_type
            .rsplit('/')
            .next()
            .unwrap_or(FALLBACK_MIME)
            .to_string();
        self.store
            .append_file_analysis(&FileAnalysis {
                user_id: user.chat_id,
                filename,
                file_type,
                analysis: analysis.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        self.outbound
            .send_text(user.chat_id, &format!("🔍 Analysis Result:\n{}", analysis))
            .await?;
        Ok(())
    }

    async fn handle_search(&self, user: &UserIdentity, query: &str) -> anyhow::Result<()> {
        let query = query.trim();
        if query.is_empty() {
            self.outbound.send_text(user.chat_id, SEARCH_USAGE_TEXT).await?;
            return Ok(());
        }

        let prompt = format!(
            "Simulate a web search for: {} and provide a concise summary with top links.",
            query
        );
        let result = match self.provider.generate(&self.text_model, &prompt).await {
            Ok(response) => extract_text(&response),
            Err(e) => {
                error!(chat_id = user.chat_id, "Search generation failed: {}", e);
                self.outbound
                    .send_text(user.chat_id, MESSAGE_FAILED_TEXT)
                    .await?;
                return Ok(());
            }
        };

        self.store
            .append_search(&SearchRecord {
                user_id: user.chat_id,
                query: query.to_string(),
                result: result.clone(),
                timestamp: Utc::now(),
            })
            .await?;

        self.outbound
            .send_text(user.chat_id, &format!("🌐 Search Results:\n{}", result))
            .await?;
        Ok(())
    }
}
