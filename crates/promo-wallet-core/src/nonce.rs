use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::Address;

use crate::error::WalletError;

/// Local view of the next free nonce per account.
///
/// The chain's pending nonce lags behind transactions this process has just handed to the
/// signer, so back-to-back submissions reserve from `max(chain_pending, local_next)`.
#[derive(Debug, Default)]
pub struct NonceTracker {
    next: Mutex<HashMap<Address, u64>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `count` consecutive nonces and returns the first.
    pub fn reserve(&self, address: Address, chain_pending: u64, count: u64) -> Result<u64, WalletError> {
        let mut g = self.lock()?;
        let local = g.get(&address).copied().unwrap_or(0);
        let first = local.max(chain_pending);
        g.insert(address, first.saturating_add(count));
        Ok(first)
    }

    /// Records nonces used verbatim (a pinned rebroadcast).
    pub fn observe(&self, address: Address, first: u64, count: u64) -> Result<(), WalletError> {
        let mut g = self.lock()?;
        let end = first.saturating_add(count);
        let entry = g.entry(address).or_insert(end);
        *entry = (*entry).max(end);
        Ok(())
    }

    /// Hands back nonces that never reached the chain, if nothing was reserved after them.
    pub fn release(&self, address: Address, first: u64, count: u64) -> Result<(), WalletError> {
        let mut g = self.lock()?;
        if g.get(&address).copied() == Some(first.saturating_add(count)) {
            g.insert(address, first);
        }
        Ok(())
    }

    pub fn peek(&self, address: Address) -> Option<u64> {
        self.next.lock().ok().and_then(|g| g.get(&address).copied())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Address, u64>>, WalletError> {
        self.next
            .lock()
            .map_err(|e| WalletError::Submission(format!("nonce tracker lock poisoned: {e}")))
    }
}
