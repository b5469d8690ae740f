use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Verification status of a user. `Verified` is terminal for the
/// registration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    New,
    PendingContact,
    Verified,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::New => "new",
            UserStatus::PendingContact => "pending_contact",
            UserStatus::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending_contact" => UserStatus::PendingContact,
            "verified" => UserStatus::Verified,
            _ => UserStatus::New,
        }
    }
}

/// Identity record. Exactly one per chat identity, enforced by a unique
/// index on `chat_id`.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub chat_id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub status: UserStatus,
    pub registered_at: DateTime<Utc>,
    pub last_interaction: DateTime<Utc>,
    pub phone_number: Option<String>,
    pub phone_verified_at: Option<DateTime<Utc>>,
}

/// One request/response pair. Append-only.
#[derive(Debug, Clone)]
pub struct ChatExchange {
    pub user_id: i64,
    pub input: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// One processed attachment. Append-only.
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub user_id: i64,
    pub filename: String,
    pub file_type: String,
    pub analysis: String,
    pub timestamp: DateTime<Utc>,
}

/// One search query/result pair. Append-only, separate from chat history.
#[derive(Debug, Clone)]
pub struct SearchRecord {
    pub user_id: i64,
    pub query: String,
    pub result: String,
    pub timestamp: DateTime<Utc>,
}

/// Persistence seam. The store is the source of truth for user state; the
/// in-process cache is advisory only.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn find_user(&self, chat_id: i64) -> anyhow::Result<Option<UserRecord>>;

    /// Insert a new user record. Returns `false` when a record for the same
    /// chat identity already exists (a concurrent insert won the race), in
    /// which case nothing is written.
    async fn insert_user(&self, user: &UserRecord) -> anyhow::Result<bool>;

    /// Mark the user verified, storing the phone number and verification
    /// time. Returns `true` iff exactly one not-yet-verified record was
    /// modified.
    async fn verify_user(
        &self,
        chat_id: i64,
        phone_number: &str,
        verified_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    async fn append_exchange(&self, exchange: &ChatExchange) -> anyhow::Result<()>;

    async fn append_file_analysis(&self, analysis: &FileAnalysis) -> anyhow::Result<()>;

    async fn append_search(&self, search: &SearchRecord) -> anyhow::Result<()>;

    /// Most recent exchanges for a user, newest first.
    async fn recent_exchanges(&self, user_id: i64, limit: u32)
        -> anyhow::Result<Vec<ChatExchange>>;
}
