//! Deterministic in-memory chain with one account, ERC-20 balances and the promotion vault.
//!
//! Every accepted transaction is mined into its own block immediately. Used by the
//! development profile and by tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{keccak256, Address, B256, U256};
use alloy::sol_types::SolCall;
use promo_wallet_core::contracts::{tip_sent_log, vault_created_log, IPromotionVault, IERC20};
use promo_wallet_core::domain::{ChainLog, LogFilter, TxReceipt, TxRequest};
use promo_wallet_core::{ChainReader, PortError, TransactionSigner};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiptMode {
    /// Receipts are returned as soon as they are asked for.
    #[default]
    Immediate,
    /// Receipt waits never complete, as with a suspended tab.
    Stalled,
    /// Receipt waits fail with a transport error.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinedTx {
    pub request: TxRequest,
    pub hash: B256,
    pub block: u64,
    pub success: bool,
}

#[derive(Debug, Default)]
struct DevState {
    block: u64,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    nonces: HashMap<Address, u64>,
    logs: Vec<ChainLog>,
    receipts: HashMap<B256, TxReceipt>,
    mined: Vec<MinedTx>,
    next_vault_id: u64,
    receipt_mode: ReceiptMode,
    reject_in: Option<usize>,
    revert_next: bool,
    log_queries: usize,
    receipt_waits: usize,
    allowance_reads: usize,
}

#[derive(Debug, Clone)]
pub struct DevChain {
    account: Address,
    state: Arc<Mutex<DevState>>,
    mined: Arc<Notify>,
}

impl DevChain {
    pub fn new(account: Address) -> Self {
        Self {
            account,
            state: Arc::new(Mutex::new(DevState {
                block: 100,
                next_vault_id: 1,
                ..DevState::default()
            })),
            mined: Arc::new(Notify::new()),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) -> Result<(), PortError> {
        self.lock()?.balances.insert((token, owner), amount);
        Ok(())
    }

    pub fn set_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<(), PortError> {
        self.lock()?.allowances.insert((token, owner, spender), amount);
        Ok(())
    }

    pub fn balance(&self, token: Address, owner: Address) -> Result<U256, PortError> {
        Ok(self.lock()?.balances.get(&(token, owner)).copied().unwrap_or_default())
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) -> Result<(), PortError> {
        self.lock()?.receipt_mode = mode;
        Ok(())
    }

    /// The next signature request is declined as if by the user.
    pub fn reject_next_signature(&self) -> Result<(), PortError> {
        self.reject_signature_after(0)
    }

    /// Accepts `accepted` more signature requests, then declines one.
    pub fn reject_signature_after(&self, accepted: usize) -> Result<(), PortError> {
        self.lock()?.reject_in = Some(accepted);
        Ok(())
    }

    /// The next accepted transaction is mined but reverts.
    pub fn revert_next_transaction(&self) -> Result<(), PortError> {
        self.lock()?.revert_next = true;
        Ok(())
    }

    /// Mines an empty block.
    pub fn advance_block(&self) -> Result<u64, PortError> {
        let mut g = self.lock()?;
        g.block += 1;
        Ok(g.block)
    }

    pub fn mined(&self) -> Result<Vec<MinedTx>, PortError> {
        Ok(self.lock()?.mined.clone())
    }

    pub fn log_queries(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.log_queries)
    }

    pub fn receipt_waits(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.receipt_waits)
    }

    pub fn allowance_reads(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.allowance_reads)
    }

    fn lock(&self) -> Result<MutexGuard<'_, DevState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("dev chain lock poisoned: {e}")))
    }

    fn mine(&self, request: TxRequest) -> Result<B256, PortError> {
        let mut g = self.lock()?;
        match g.reject_in {
            Some(0) => {
                g.reject_in = None;
                return Err(PortError::UserRejected("User rejected the request".to_owned()));
            }
            Some(n) => g.reject_in = Some(n - 1),
            None => {}
        }
        if request.from != self.account {
            return Err(PortError::Validation(format!("unknown account {}", request.from)));
        }
        let expected = g.nonces.get(&request.from).copied().unwrap_or(0);
        if request.nonce < expected {
            return Err(PortError::Rpc {
                code: -32000,
                message: "nonce too low".to_owned(),
            });
        }
        if request.nonce > expected {
            return Err(PortError::Rpc {
                code: -32000,
                message: format!("nonce too high: expected {expected}, got {}", request.nonce),
            });
        }

        let mut seed = Vec::with_capacity(60 + request.data.len());
        seed.extend_from_slice(request.from.as_slice());
        seed.extend_from_slice(&request.nonce.to_be_bytes());
        seed.extend_from_slice(request.to.as_slice());
        seed.extend_from_slice(&request.data);
        let hash = keccak256(seed);

        g.block += 1;
        let block = g.block;
        g.nonces.insert(request.from, expected + 1);
        let logs = if std::mem::take(&mut g.revert_next) {
            None
        } else {
            apply_call(&mut g, &request)
        };
        let success = logs.is_some();
        let logs: Vec<ChainLog> = logs
            .unwrap_or_default()
            .into_iter()
            .map(|mut log| {
                log.block_number = Some(block);
                log.transaction_hash = Some(hash);
                log
            })
            .collect();
        g.logs.extend(logs.iter().cloned());
        g.receipts.insert(
            hash,
            TxReceipt {
                transaction_hash: hash,
                block_number: Some(block),
                success,
                logs,
            },
        );
        g.mined.push(MinedTx {
            request,
            hash,
            block,
            success,
        });
        debug!(%hash, block, success, "dev chain mined transaction");
        drop(g);
        self.mined.notify_waiters();
        Ok(hash)
    }
}

/// Executes a call against the in-memory contracts. `None` means the call reverted.
fn apply_call(state: &mut DevState, request: &TxRequest) -> Option<Vec<ChainLog>> {
    let data = request.data.as_ref();
    let selector: [u8; 4] = data.get(..4)?.try_into().ok()?;
    let owner = request.from;

    if selector == IERC20::approveCall::SELECTOR {
        let call = IERC20::approveCall::abi_decode(data, true).ok()?;
        state
            .allowances
            .insert((request.to, owner, call.spender), call.amount);
        return Some(Vec::new());
    }

    if selector == IPromotionVault::createVaultCall::SELECTOR {
        let call = IPromotionVault::createVaultCall::abi_decode(data, true).ok()?;
        let total = call.rewardPerSlot.checked_mul(U256::from(call.slots))?;
        pull_tokens(state, call.token, owner, request.to, total)?;
        let vault_id = U256::from(state.next_vault_id);
        state.next_vault_id += 1;
        return Some(vec![vault_created_log(
            request.to,
            vault_id,
            owner,
            call.token,
            total,
            call.postRef,
        )]);
    }

    if selector == IPromotionVault::tipCall::SELECTOR {
        let call = IPromotionVault::tipCall::abi_decode(data, true).ok()?;
        pull_tokens(state, call.token, owner, request.to, call.amount)?;
        let credited = state.balances.entry((call.token, call.to)).or_default();
        *credited = credited.saturating_add(call.amount);
        // Tokens were pulled into the vault and forwarded to the recipient.
        let vault = state.balances.entry((call.token, request.to)).or_default();
        *vault = vault.saturating_sub(call.amount);
        return Some(vec![tip_sent_log(
            request.to,
            owner,
            call.to,
            call.token,
            call.amount,
            call.postRef,
        )]);
    }

    None
}

/// `transferFrom(owner, spender, amount)` as executed by the vault.
fn pull_tokens(
    state: &mut DevState,
    token: Address,
    owner: Address,
    spender: Address,
    amount: U256,
) -> Option<()> {
    let allowance = state
        .allowances
        .get(&(token, owner, spender))
        .copied()
        .unwrap_or_default();
    let balance = state.balances.get(&(token, owner)).copied().unwrap_or_default();
    if allowance < amount || balance < amount {
        return None;
    }
    state
        .allowances
        .insert((token, owner, spender), allowance - amount);
    state.balances.insert((token, owner), balance - amount);
    let held = state.balances.entry((token, spender)).or_default();
    *held = held.saturating_add(amount);
    Some(())
}

impl TransactionSigner for DevChain {
    fn address(&self) -> Address {
        self.account
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, PortError> {
        self.mine(request)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, PortError> {
        let mode = {
            let mut g = self.lock()?;
            g.receipt_waits += 1;
            g.receipt_mode
        };
        match mode {
            ReceiptMode::Immediate => {}
            ReceiptMode::Stalled => std::future::pending::<()>().await,
            ReceiptMode::Dropped => {
                return Err(PortError::Transport("receipt subscription dropped".to_owned()))
            }
        }
        loop {
            let notified = self.mined.notified();
            let receipt = self.lock()?.receipts.get(&tx_hash).cloned();
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            notified.await;
        }
    }
}

impl ChainReader for DevChain {
    async fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, PortError> {
        let mut g = self.lock()?;
        g.allowance_reads += 1;
        Ok(g.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, PortError> {
        self.balance(token, owner)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, PortError> {
        Ok(self.lock()?.nonces.get(&address).copied().unwrap_or(0))
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        Ok(self.lock()?.block)
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, PortError> {
        let mut g = self.lock()?;
        g.log_queries += 1;
        Ok(g.logs.iter().filter(|l| filter.matches(l)).cloned().collect())
    }
}
