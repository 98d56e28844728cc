//! In-flight request tracking for cancellation
//!
//! Each dispatch that carries a request id registers its cancellation token
//! here under `(session scope, request id)` and removes it when done. A
//! `notifications/cancelled` call looks the pair up and fires the token.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequestKey {
    session: Option<String>,
    /// Canonical JSON text of the id, so `1` and `"1"` stay distinct
    id: String,
}

impl RequestKey {
    fn new(session: Option<&str>, id: &Value) -> Self {
        Self {
            session: session.map(str::to_string),
            id: id.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InFlightRequests {
    entries: Mutex<HashMap<RequestKey, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

impl InFlightRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `token` until the returned guard is dropped. A later registration
    /// under the same key takes over the slot.
    pub fn register(
        self: &Arc<Self>,
        session: Option<&str>,
        id: &Value,
        token: CancellationToken,
    ) -> InFlightGuard {
        let key = RequestKey::new(session, id);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        if self
            .entries
            .lock()
            .insert(key.clone(), (generation, token))
            .is_some()
        {
            tracing::warn!(
                session = ?key.session,
                id = %key.id,
                "Duplicate in-flight request id; previous call can no longer be cancelled"
            );
        }
        InFlightGuard {
            registry: Arc::clone(self),
            key,
            generation,
        }
    }

    /// Fire the token of the matching in-flight call. Returns whether one was found.
    pub fn cancel(&self, session: Option<&str>, id: &Value) -> bool {
        let key = RequestKey::new(session, id);
        match self.entries.lock().get(&key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Removes its entry on drop, unless a newer registration replaced it
pub struct InFlightGuard {
    registry: Arc<InFlightRequests>,
    key: RequestKey,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut entries = self.registry.entries.lock();
        if entries
            .get(&self.key)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            entries.remove(&self.key);
        }
    }
}
