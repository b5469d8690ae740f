use async_trait::async_trait;

use crate::types::FetchedFile;

/// Reply sink and file source for a chat transport (Telegram in
/// production, a recording double in tests).
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Send plain text to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    /// Send `text` together with an interactive button that asks the user
    /// to share their own contact.
    async fn request_contact(&self, chat_id: i64, text: &str) -> anyhow::Result<()>;

    /// Download a file's bytes by its transport identifier.
    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<FetchedFile>;
}
