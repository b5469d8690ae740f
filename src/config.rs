use std::env;

/// Top-level configuration, built once in `main` and handed to `core::run`.
///
/// The three secrets (bot token, database path, API key) are required and
/// missing ones are startup-fatal. Everything else has a default that can
/// be overridden from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub state: StateConfig,
    pub provider: ProviderConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
}

#[derive(Debug, Clone)]
pub struct StateConfig {
    pub db_path: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: String,
}

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// When true, message/file/search handlers require a verified user.
    /// Off by default: verification is advisory unless the integrator
    /// opts in.
    pub enforce_verification: bool,
    /// Delay before the unconditional follow-up prompt after a reply.
    pub follow_up_delay_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_text_model() -> String {
    "gemini-pro".to_string()
}

fn default_vision_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_max_connections() -> u32 {
    50
}

fn default_follow_up_delay_secs() -> u64 {
    5
}

fn required(name: &str) -> anyhow::Result<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => anyhow::bail!("missing required environment variable {}", name),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let bot_token = required("TELEGRAM_TOKEN")?;
        let db_path = required("DATABASE_PATH")?;
        let api_key = required("GEMINI_API_KEY")?;

        let max_connections = match optional("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| anyhow::anyhow!("DATABASE_MAX_CONNECTIONS is not a number: {}", v))?,
            None => default_max_connections(),
        };
        let follow_up_delay_secs = match optional("FOLLOW_UP_DELAY_SECS") {
            Some(v) => v
                .parse()
                .map_err(|_| anyhow::anyhow!("FOLLOW_UP_DELAY_SECS is not a number: {}", v))?,
            None => default_follow_up_delay_secs(),
        };
        let enforce_verification = matches!(
            optional("ENFORCE_VERIFICATION").as_deref(),
            Some("1") | Some("true") | Some("yes") | Some("on")
        );

        Ok(Self {
            telegram: TelegramConfig { bot_token },
            state: StateConfig {
                db_path,
                max_connections,
            },
            provider: ProviderConfig {
                api_key,
                base_url: optional("GEMINI_BASE_URL").unwrap_or_else(default_base_url),
                text_model: optional("TEXT_MODEL").unwrap_or_else(default_text_model),
                vision_model: optional("VISION_MODEL").unwrap_or_else(default_vision_model),
            },
            policy: PolicyConfig {
                enforce_verification,
                follow_up_delay_secs,
            },
        })
    }
}
