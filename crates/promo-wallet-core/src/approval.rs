//! Correlation-id keyed waiters for cross-context approval decisions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::WalletError;

pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(120);

type Decision = Result<(), WalletError>;

struct Waiter {
    ticket: u64,
    tx: oneshot::Sender<Decision>,
}

#[derive(Clone, Default)]
pub struct ApprovalRegistry {
    waiters: Arc<Mutex<HashMap<String, Waiter>>>,
    tickets: Arc<AtomicU64>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `context_id` immediately and returns the wait.
    ///
    /// A second registration for the same id replaces the first, whose wait then fails
    /// with `Cancelled`. The returned future resolves on a grant, fails with the deny
    /// reason, or fails with `Timeout` once `timeout` elapses.
    pub fn wait_for_approval(
        &self,
        context_id: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), WalletError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;
        let replaced = self
            .lock()
            .insert(context_id.to_owned(), Waiter { ticket, tx });
        if replaced.is_some() {
            debug!(context_id, "approval waiter replaced");
        }

        let guard = WaiterGuard {
            registry: self.clone(),
            context_id: context_id.to_owned(),
            ticket,
        };
        let context_id = context_id.to_owned();
        async move {
            let _guard = guard;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(decision)) => decision,
                Ok(Err(_)) => Err(WalletError::Cancelled(format!(
                    "approval wait for {context_id} was superseded"
                ))),
                Err(_) => {
                    warn!(context_id = %context_id, "approval wait timed out");
                    Err(WalletError::Timeout(context_id))
                }
            }
        }
    }

    /// Returns whether a live waiter received the grant. Unmatched grants are dropped.
    pub fn grant(&self, context_id: &str) -> bool {
        self.resolve(context_id, Ok(()))
    }

    pub fn deny(&self, context_id: &str, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.resolve(context_id, Err(deny_error(reason)))
    }

    pub fn is_waiting(&self, context_id: &str) -> bool {
        self.lock().contains_key(context_id)
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn resolve(&self, context_id: &str, decision: Decision) -> bool {
        let Some(waiter) = self.lock().remove(context_id) else {
            debug!(context_id, "approval signal without a live waiter");
            return false;
        };
        waiter.tx.send(decision).is_ok()
    }

    fn remove_ticket(&self, context_id: &str, ticket: u64) {
        let mut g = self.lock();
        if g.get(context_id).is_some_and(|w| w.ticket == ticket) {
            g.remove(context_id);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Waiter>> {
        self.waiters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Unregisters its waiter when the wait settles or is dropped unpolled.
struct WaiterGuard {
    registry: ApprovalRegistry,
    context_id: String,
    ticket: u64,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        self.registry.remove_ticket(&self.context_id, self.ticket);
    }
}

/// Maps a deny reason carried over the channel back onto the taxonomy.
fn deny_error(reason: String) -> WalletError {
    if reason == WalletError::UserRejected.to_string() {
        WalletError::UserRejected
    } else {
        WalletError::Denied(reason)
    }
}
