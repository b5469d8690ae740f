use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{info, warn};

use crate::traits::{Outbound, StateStore, UserRecord, UserStatus};
use crate::types::{ContactShare, UserIdentity};

const CONTACT_REQUEST_TEXT: &str =
    "📱 Verification required\nTo use this bot, please share your phone number for security:";
const PENDING_TEXT: &str = "Please complete registration by sharing your contact";
const MISMATCH_TEXT: &str = "⚠️ Please only share your own contact information.";
const VERIFIED_TEXT: &str =
    "✅ Phone verification successful!\nYou can now access all bot features.";
const VERIFY_FAILED_TEXT: &str = "❌ Verification failed. Please try /start again";
const REGISTER_FAILED_TEXT: &str = "❌ Could not register you right now. Please try /start again";

/// Last-known user records, keyed by chat identity. Advisory only — the
/// store is the source of truth. Written exclusively on the verified paths,
/// so a cached record always has `Verified` status.
pub trait UserCache: Send + Sync {
    fn get(&self, chat_id: i64) -> Option<UserRecord>;
    fn put(&self, record: UserRecord);
}

/// Unbounded in-process cache. Mutex-guarded because handlers run on a
/// multi-thread runtime.
#[derive(Default)]
pub struct InMemoryCache {
    inner: Mutex<HashMap<i64, UserRecord>>,
}

impl UserCache for InMemoryCache {
    fn get(&self, chat_id: i64) -> Option<UserRecord> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&chat_id)
            .cloned()
    }

    fn put(&self, record: UserRecord) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(record.chat_id, record);
    }
}

/// Cache that remembers nothing. Every lookup goes to the store.
pub struct NullCache;

impl UserCache for NullCache {
    fn get(&self, _chat_id: i64) -> Option<UserRecord> {
        None
    }

    fn put(&self, _record: UserRecord) {}
}

/// The registration/verification state machine.
///
/// States: no record → `pending_contact` → `verified` (terminal). The entry
/// command creates the record and asks for a contact share; a matching
/// contact share completes verification.
pub struct Registration {
    store: Arc<dyn StateStore>,
    cache: Arc<dyn UserCache>,
}

impl Registration {
    pub fn new(store: Arc<dyn StateStore>, cache: Arc<dyn UserCache>) -> Self {
        Self { store, cache }
    }

    fn welcome(first_name: &str) -> String {
        format!(
            "Welcome back {}! Your registration is complete.",
            first_name
        )
    }

    /// Handle the entry command.
    pub async fn handle_entry(
        &self,
        user: &UserIdentity,
        out: &dyn Outbound,
    ) -> anyhow::Result<()> {
        // Cache hit short-circuits the store read; only verified records
        // are ever cached.
        if let Some(cached) = self.cache.get(user.chat_id) {
            out.send_text(user.chat_id, &Self::welcome(&cached.first_name))
                .await?;
            return Ok(());
        }

        match self.store.find_user(user.chat_id).await? {
            None => {
                let now = Utc::now();
                let record = UserRecord {
                    chat_id: user.chat_id,
                    first_name: user.first_name.clone(),
                    username: user.username.clone(),
                    status: UserStatus::PendingContact,
                    registered_at: now,
                    last_interaction: now,
                    phone_number: None,
                    phone_verified_at: None,
                };
                match self.store.insert_user(&record).await {
                    Ok(true) => {
                        info!(chat_id = user.chat_id, "Registered new user, requesting contact");
                        out.request_contact(user.chat_id, CONTACT_REQUEST_TEXT)
                            .await?;
                    }
                    Ok(false) => {
                        // Lost an insert race; the record exists now, so
                        // the user just needs to finish verification.
                        out.send_text(user.chat_id, PENDING_TEXT).await?;
                    }
                    Err(e) => {
                        warn!(chat_id = user.chat_id, "User insert failed: {}", e);
                        out.send_text(user.chat_id, REGISTER_FAILED_TEXT).await?;
                    }
                }
            }
            Some(existing) => match existing.status {
                UserStatus::New | UserStatus::PendingContact => {
                    out.send_text(user.chat_id, PENDING_TEXT).await?;
                }
                UserStatus::Verified => {
                    let welcome = Self::welcome(&existing.first_name);
                    self.cache.put(existing);
                    out.send_text(user.chat_id, &welcome).await?;
                }
            },
        }
        Ok(())
    }

    /// Handle a contact-share event from `sender`.
    pub async fn handle_contact(
        &self,
        sender: &UserIdentity,
        contact: &ContactShare,
        out: &dyn Outbound,
    ) -> anyhow::Result<()> {
        info!(
            chat_id = sender.chat_id,
            contact_user_id = ?contact.user_id,
            "Received contact"
        );

        // A relayed contact card carries someone else's identity (or none).
        // Reject without touching state; this is a user mistake, not a
        // system fault.
        if contact.user_id != Some(sender.chat_id) {
            out.send_text(sender.chat_id, MISMATCH_TEXT).await?;
            return Ok(());
        }

        let verified = match self
            .store
            .verify_user(sender.chat_id, &contact.phone_number, Utc::now())
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(chat_id = sender.chat_id, "Verification write failed: {}", e);
                false
            }
        };

        if verified {
            // Refresh the cache from the authoritative record.
            if let Some(record) = self.store.find_user(sender.chat_id).await? {
                self.cache.put(record);
            }
            out.send_text(sender.chat_id, VERIFIED_TEXT).await?;
        } else {
            out.send_text(sender.chat_id, VERIFY_FAILED_TEXT).await?;
        }
        Ok(())
    }

    /// Whether the chat identity has completed verification. Used by the
    /// optional gating policy; the cache answer is trusted because only
    /// verified records are cached.
    pub async fn is_verified(&self, chat_id: i64) -> bool {
        if self.cache.get(chat_id).is_some() {
            return true;
        }
        matches!(
            self.store.find_user(chat_id).await,
            Ok(Some(UserRecord {
                status: UserStatus::Verified,
                ..
            }))
        )
    }
}
