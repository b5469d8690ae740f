use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

/// Pending follow-up timers, one per chat. A newer message from the same
/// chat aborts the previous pending follow-up instead of racing with it,
/// and a follow-up that fires removes its own entry so the map only holds
/// live timers.
#[derive(Default)]
pub struct FollowUpRegistry {
    inner: Mutex<HashMap<i64, (u64, JoinHandle<()>)>>,
    next_token: AtomicU64,
}

impl FollowUpRegistry {
    /// Schedule a follow-up for a chat, aborting any previous pending one.
    /// The entry is removed once `fut` completes.
    pub fn schedule<F>(self: &Arc<Self>, chat_id: i64, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let registry = Arc::clone(self);

        // Hold the lock across spawn + insert so the task's finish() cannot
        // observe the map before its own entry lands.
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = tokio::spawn(async move {
            fut.await;
            registry.finish(chat_id, token);
        });
        if let Some((_, previous)) = inner.insert(chat_id, (token, handle)) {
            previous.abort();
        }
    }

    /// Abort the pending follow-up for a chat, if any.
    pub fn cancel(&self, chat_id: i64) {
        let entry = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&chat_id);
        if let Some((_, handle)) = entry {
            handle.abort();
        }
    }

    /// Whether a follow-up is still registered for a chat.
    pub fn is_pending(&self, chat_id: i64) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(&chat_id)
    }

    /// Remove a completed entry, but only if it has not been replaced by a
    /// newer follow-up in the meantime.
    fn finish(&self, chat_id: i64, token: u64) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.get(&chat_id).map(|(t, _)| *t) == Some(token) {
            inner.remove(&chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn schedule_aborts_previous_follow_up() {
        let registry = Arc::new(FollowUpRegistry::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let first_fired = fired.clone();
        registry.schedule(7, async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            first_fired.fetch_add(1, Ordering::SeqCst);
        });

        let second_fired = fired.clone();
        registry.schedule(7, async move {
            second_fired.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_aborts_pending_follow_up() {
        let registry = Arc::new(FollowUpRegistry::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let task_fired = fired.clone();
        registry.schedule(7, async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            task_fired.fetch_add(1, Ordering::SeqCst);
        });
        registry.cancel(7);
        // Cancelling a chat with nothing pending is a no-op.
        registry.cancel(8);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!registry.is_pending(7));
    }

    #[tokio::test]
    async fn fired_follow_up_removes_its_entry() {
        let registry = Arc::new(FollowUpRegistry::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let task_fired = fired.clone();
        registry.schedule(7, async move {
            task_fired.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!registry.is_pending(7));
    }

    #[tokio::test]
    async fn finished_task_never_evicts_its_replacement() {
        let registry = Arc::new(FollowUpRegistry::default());

        registry.schedule(7, async {});
        // Give the first task time to fire and clean up.
        tokio::time::sleep(Duration::from_millis(50)).await;

        registry.schedule(7, async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.is_pending(7));
    }
}
