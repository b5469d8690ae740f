use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::traits::{
    ChatExchange, FileAnalysis, SearchRecord, StateStore, UserRecord, UserStatus,
};

pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub async fn new(db_path: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id INTEGER NOT NULL,
                first_name TEXT NOT NULL,
                username TEXT,
                status TEXT NOT NULL,
                registered_at TEXT NOT NULL,
                last_interaction TEXT NOT NULL,
                phone_number TEXT,
                phone_verified_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        // One record per chat identity.
        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS idx_users_chat_id ON users(chat_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                input TEXT NOT NULL,
                response TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_user_ts
             ON chat_history(user_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL,
                analysis TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_files_user ON files(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS searches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                query TEXT NOT NULL,
                result TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_searches_user_ts
             ON searches(user_id, timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_user(row: &SqliteRow) -> UserRecord {
        UserRecord {
            chat_id: row.get("chat_id"),
            first_name: row.get("first_name"),
            username: row.get("username"),
            status: UserStatus::parse(row.get("status")),
            registered_at: parse_ts(&row.get::<String, _>("registered_at")),
            last_interaction: parse_ts(&row.get::<String, _>("last_interaction")),
            phone_number: row.get("phone_number"),
            phone_verified_at: row
                .get::<Option<String>, _>("phone_verified_at")
                .map(|ts| parse_ts(&ts)),
        }
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn find_user(&self, chat_id: i64) -> anyhow::Result<Option<UserRecord>> {
        let row = sqlx::query(
            "SELECT chat_id, first_name, username, status, registered_at, last_interaction, \
             phone_number, phone_verified_at FROM users WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_user(&r)))
    }

    async fn insert_user(&self, user: &UserRecord) -> anyhow::Result<bool> {
        // INSERT OR IGNORE so a concurrent insert for the same chat_id
        // loses cleanly: the unique index rejects the row and we report it
        // to the caller instead of erroring.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO users \
             (chat_id, first_name, username, status, registered_at, last_interaction, \
              phone_number, phone_verified_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.chat_id)
        .bind(&user.first_name)
        .bind(&user.username)
        .bind(user.status.as_str())
        .bind(user.registered_at.to_rfc3339())
        .bind(user.last_interaction.to_rfc3339())
        .bind(&user.phone_number)
        .bind(user.phone_verified_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn verify_user(
        &self,
        chat_id: i64,
        phone_number: &str,
        verified_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET phone_number = ?, status = ?, phone_verified_at = ? \
             WHERE chat_id = ? AND status != ?",
        )
        .bind(phone_number)
        .bind(UserStatus::Verified.as_str())
        .bind(verified_at.to_rfc3339())
        .bind(chat_id)
        .bind(UserStatus::Verified.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_exchange(&self, exchange: &ChatExchange) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO chat_history (user_id, input, response, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(exchange.user_id)
        .bind(&exchange.input)
        .bind(&exchange.response)
        .bind(exchange.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_file_analysis(&self, analysis: &FileAnalysis) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO files (user_id, filename, file_type, analysis, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(analysis.user_id)
        .bind(&analysis.filename)
        .bind(&analysis.file_type)
        .bind(&analysis.analysis)
        .bind(analysis.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn append_search(&self, search: &SearchRecord) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO searches (user_id, query, result, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(search.user_id)
        .bind(&search.query)
        .bind(&search.result)
        .bind(search.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_exchanges(
        &self,
        user_id: i64,
        limit: u32,
    ) -> anyhow::Result<Vec<ChatExchange>> {
        let rows = sqlx::query(
            "SELECT user_id, input, response, timestamp FROM chat_history \
             WHERE user_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ChatExchange {
                user_id: r.get("user_id"),
                input: r.get("input"),
                response: r.get("response"),
                timestamp: parse_ts(&r.get::<String, _>("timestamp")),
            })
            .collect())
    }
}
