//! Coalescing of concurrent identical requests.
//!
//! The first caller for a key becomes the leader: its future is spawned onto
//! the runtime and every later caller for the same key subscribes to the same
//! outcome. The key is removed when that spawned task settles, whether it
//! succeeded, failed or panicked, so the next call after settlement always
//! starts a fresh request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

type Pending<T> = Arc<Mutex<HashMap<String, watch::Receiver<Option<T>>>>>;

pub struct InFlightRegistry<T> {
    pending: Pending<T>,
}

impl<T> Clone for InFlightRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Handle on a shared pending outcome.
pub struct Flight<T> {
    rx: watch::Receiver<Option<T>>,
    leader: bool,
}

impl<T: Clone> Flight<T> {
    /// True for the caller whose factory was actually spawned.
    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Wait for the shared outcome. `None` means the task died without settling.
    pub async fn wait(mut self) -> Option<T> {
        match self.rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).clone(),
            Err(_) => None,
        }
    }
}

/// Removes the key when dropped, including during unwinding.
struct SettleGuard<T> {
    pending: Pending<T>,
    key: String,
}

impl<T> Drop for SettleGuard<T> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.remove(&self.key);
    }
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Receiver<Option<T>>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the pending request for `key`, or start one with `factory`.
    ///
    /// Check and insert happen under one lock acquisition, so racing callers
    /// can never both become leader. Must be called from within a tokio runtime.
    pub fn get_or_create<F, Fut>(&self, key: &str, factory: F) -> Flight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut pending = self.lock();
        if let Some(rx) = pending.get(key) {
            tracing::debug!(key, "Joining in-flight request");
            return Flight {
                rx: rx.clone(),
                leader: false,
            };
        }

        let (tx, rx) = watch::channel(None);
        pending.insert(key.to_string(), rx.clone());
        drop(pending);

        let settle = SettleGuard {
            pending: Arc::clone(&self.pending),
            key: key.to_string(),
        };
        let fut = factory();
        tokio::spawn(async move {
            let outcome = fut.await;
            drop(settle);
            tx.send_replace(Some(outcome));
        });

        Flight { rx, leader: true }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
