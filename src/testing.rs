//! Test doubles: a scripted mock provider, a recording outbound transport,
//! and an in-memory store with operation counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::traits::{
    Candidate, ChatExchange, FileAnalysis, GenerateResponse, ModelProvider, Outbound,
    SearchRecord, StateStore, UserRecord, UserStatus,
};
use crate::types::FetchedFile;

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

/// A recorded call to the mock provider.
#[derive(Debug, Clone)]
pub struct MockGenerateCall {
    pub model: String,
    pub prompt: String,
    pub mime_type: Option<String>,
}

/// Generative backend double with a FIFO queue of scripted responses and a
/// call log. With an empty queue it answers "Mock response".
#[derive(Default)]
pub struct MockProvider {
    responses: Mutex<Vec<GenerateResponse>>,
    pub call_log: Mutex<Vec<MockGenerateCall>>,
    fail: AtomicBool,
}

impl MockProvider {
    pub fn with_responses(responses: Vec<GenerateResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            ..Default::default()
        }
    }

    /// Helper: a single-candidate, single-part response.
    pub fn text_response(text: &str) -> GenerateResponse {
        GenerateResponse {
            candidates: vec![Candidate {
                parts: vec![text.to_string()],
            }],
        }
    }

    pub fn fail_next_calls(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<MockGenerateCall> {
        self.call_log.lock().unwrap().clone()
    }

    fn next_response(&self) -> anyhow::Result<GenerateResponse> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("mock provider failure");
        }
        let mut queue = self.responses.lock().unwrap();
        if queue.is_empty() {
            Ok(Self::text_response("Mock response"))
        } else {
            Ok(queue.remove(0))
        }
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn generate(&self, model: &str, prompt: &str) -> anyhow::Result<GenerateResponse> {
        self.call_log.lock().unwrap().push(MockGenerateCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            mime_type: None,
        });
        self.next_response()
    }

    async fn generate_with_media(
        &self,
        model: &str,
        prompt: &str,
        mime_type: &str,
        _data: &[u8],
    ) -> anyhow::Result<GenerateResponse> {
        self.call_log.lock().unwrap().push(MockGenerateCall {
            model: model.to_string(),
            prompt: prompt.to_string(),
            mime_type: Some(mime_type.to_string()),
        });
        self.next_response()
    }
}

// ---------------------------------------------------------------------------
// RecordingOutbound
// ---------------------------------------------------------------------------

/// Transport double that records everything sent and serves scripted files.
#[derive(Default)]
pub struct RecordingOutbound {
    texts: Mutex<Vec<(i64, String)>>,
    contact_requests: Mutex<Vec<(i64, String)>>,
    files: Mutex<HashMap<String, (String, Vec<u8>)>>,
    fail_fetch: AtomicBool,
}

impl RecordingOutbound {
    pub fn texts(&self) -> Vec<(i64, String)> {
        self.texts.lock().unwrap().clone()
    }

    pub fn contact_requests(&self) -> Vec<(i64, String)> {
        self.contact_requests.lock().unwrap().clone()
    }

    pub fn add_file(&self, file_id: &str, filename: &str, bytes: Vec<u8>) {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), (filename.to_string(), bytes));
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.texts.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn request_contact(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        self.contact_requests
            .lock()
            .unwrap()
            .push((chat_id, text.to_string()));
        Ok(())
    }

    async fn fetch_file(&self, file_id: &str) -> anyhow::Result<FetchedFile> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            anyhow::bail!("mock download failure");
        }
        let files = self.files.lock().unwrap();
        let (filename, bytes) = files
            .get(file_id)
            .ok_or_else(|| anyhow::anyhow!("unknown file id {}", file_id))?;
        Ok(FetchedFile {
            filename: filename.clone(),
            bytes: bytes.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// CountingStore
// ---------------------------------------------------------------------------

/// In-memory `StateStore` with read/insert counters, used to observe cache
/// behavior, plus switches for simulating write failures and insert races.
#[derive(Default)]
pub struct CountingStore {
    users: Mutex<HashMap<i64, UserRecord>>,
    exchanges: Mutex<Vec<ChatExchange>>,
    file_analyses: Mutex<Vec<FileAnalysis>>,
    search_records: Mutex<Vec<SearchRecord>>,
    reads: AtomicUsize,
    inserts: AtomicUsize,
    fail_writes: AtomicBool,
    insert_conflict: AtomicBool,
}

impl CountingStore {
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make the next insert behave as if a concurrent insert won the race.
    pub fn force_insert_conflict(&self, conflict: bool) {
        self.insert_conflict.store(conflict, Ordering::SeqCst);
    }

    pub fn exchanges(&self) -> Vec<ChatExchange> {
        self.exchanges.lock().unwrap().clone()
    }

    pub fn file_analyses(&self) -> Vec<FileAnalysis> {
        self.file_analyses.lock().unwrap().clone()
    }

    pub fn search_records(&self) -> Vec<SearchRecord> {
        self.search_records.lock().unwrap().clone()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn check_writes(&self) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("mock store write failure");
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for CountingStore {
    async fn find_user(&self, chat_id: i64) -> anyhow::Result<Option<UserRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.users.lock().unwrap().get(&chat_id).cloned())
    }

    async fn insert_user(&self, user: &UserRecord) -> anyhow::Result<bool> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        if self.insert_conflict.load(Ordering::SeqCst) || users.contains_key(&user.chat_id) {
            return Ok(false);
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        users.insert(user.chat_id, user.clone());
        Ok(true)
    }

    async fn verify_user(
        &self,
        chat_id: i64,
        phone_number: &str,
        verified_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.check_writes()?;
        let mut users = self.users.lock().unwrap();
        match users.get_mut(&chat_id) {
            Some(user) if user.status != UserStatus::Verified => {
                user.status = UserStatus::Verified;
                user.phone_number = Some(phone_number.to_string());
                user.phone_verified_at = Some(verified_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_exchange(&self, exchange: &ChatExchange) -> anyhow::Result<()> {
        self.check_writes()?;
        self.exchanges.lock().unwrap().push(exchange.clone());
        Ok(())
    }

    async fn append_file_analysis(&self, analysis: &FileAnalysis) -> anyhow::Result<()> {
        self.check_writes()?;
        self.file_analyses.lock().unwrap().push(analysis.clone());
        Ok(())
    }

    async fn append_search(&self, search: &SearchRecord) -> anyhow::Result<()> {
        self.check_writes()?;
        self.search_records.lock().unwrap().push(search.clone());
        Ok(())
    }

    async fn recent_exchanges(
        &self,
        user_id: i64,
        limit: u32,
    ) -> anyhow::Result<Vec<ChatExchange>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut matching: Vec<ChatExchange> = self
            .exchanges
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}
