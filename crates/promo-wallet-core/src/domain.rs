use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

/// Display metadata for a queued request. The pipeline never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionMeta {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub token_symbol: Option<String>,
}

impl ActionMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Queued,
    AwaitingUser,
    Processing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItemSummary {
    pub id: ActionId,
    pub status: ActionStatus,
    pub position: usize,
    pub meta: ActionMeta,
}

/// Point-in-time view of the wallet action queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub items: Vec<QueueItemSummary>,
    /// Head of the queue when it is awaiting the user or processing.
    pub active_id: Option<ActionId>,
}

impl QueueSummary {
    pub fn active(&self) -> Option<&QueueItemSummary> {
        let id = self.active_id?;
        self.items.iter().find(|x| x.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanCall {
    CreatePromotion {
        reward_per_slot: U256,
        slots: u32,
        expiry: u64,
        min_followers: u32,
        post_ref: B256,
    },
    SendTip {
        recipient: Address,
        post_ref: B256,
    },
}

/// Parameters for one allowance-check → approve → submit → confirm cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub context_id: String,
    pub owner: Address,
    /// Vault contract: both the spender of the allowance and the target of the primary call.
    pub contract: Address,
    pub token: Address,
    /// Token amount (smallest unit) moved by the primary call.
    pub amount: U256,
    /// Allowance the contract must hold before the primary call; never below `amount`.
    pub allowance_target: U256,
    pub call: PlanCall,
    /// Pinned nonce for a rebroadcast of an earlier attempt.
    #[serde(default)]
    pub nonce: Option<u64>,
}

impl TransactionPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn create_promotion(
        context_id: impl Into<String>,
        owner: Address,
        contract: Address,
        token: Address,
        reward_per_slot: U256,
        slots: u32,
        expiry: u64,
        min_followers: u32,
        post_ref: B256,
    ) -> Result<Self, WalletError> {
        let amount = reward_per_slot
            .checked_mul(U256::from(slots))
            .ok_or_else(|| WalletError::InvalidParams("promotion funding overflows".to_owned()))?;
        Ok(Self {
            context_id: context_id.into(),
            owner,
            contract,
            token,
            amount,
            allowance_target: amount,
            call: PlanCall::CreatePromotion {
                reward_per_slot,
                slots,
                expiry,
                min_followers,
                post_ref,
            },
            nonce: None,
        })
    }

    pub fn tip(
        context_id: impl Into<String>,
        owner: Address,
        contract: Address,
        token: Address,
        amount: U256,
        recipient: Address,
        post_ref: B256,
    ) -> Self {
        Self {
            context_id: context_id.into(),
            owner,
            contract,
            token,
            amount,
            allowance_target: amount,
            call: PlanCall::SendTip {
                recipient,
                post_ref,
            },
            nonce: None,
        }
    }

    pub fn with_allowance_target(mut self, target: U256) -> Self {
        self.allowance_target = target.max(self.amount);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn validate(&self) -> Result<(), WalletError> {
        if self.amount.is_zero() {
            return Err(WalletError::InvalidParams("amount must be positive".to_owned()));
        }
        if self.token == Address::ZERO || self.contract == Address::ZERO {
            return Err(WalletError::InvalidParams(
                "token and contract addresses are required".to_owned(),
            ));
        }
        if self.allowance_target < self.amount {
            return Err(WalletError::InvalidParams(
                "allowance target below amount".to_owned(),
            ));
        }
        match &self.call {
            PlanCall::CreatePromotion { slots, .. } if *slots == 0 => Err(
                WalletError::InvalidParams("promotion needs at least one slot".to_owned()),
            ),
            PlanCall::SendTip { recipient, .. } if *recipient == Address::ZERO => Err(
                WalletError::InvalidParams("invalid recipient address".to_owned()),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
    pub logs: Vec<ChainLog>,
}

/// Log query by contract address, positional topics and block range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    pub address: Address,
    /// `None` in a position matches any topic.
    pub topics: Vec<Option<B256>>,
    pub from_block: u64,
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    pub fn matches(&self, log: &ChainLog) -> bool {
        if log.address != self.address {
            return false;
        }
        if let Some(block) = log.block_number {
            if block < self.from_block || self.to_block.is_some_and(|to| block > to) {
                return false;
            }
        }
        self.topics.iter().enumerate().all(|(i, want)| match want {
            Some(topic) => log.topics.get(i) == Some(topic),
            None => true,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    Receipt,
    EventLog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub context_id: String,
    pub tx_hash: B256,
    pub nonce: u64,
    pub approval_tx_hash: Option<B256>,
    pub parsed_id: Option<U256>,
    pub block_number: Option<u64>,
    pub confirmed_by: ConfirmationSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub target: Address,
    pub post_ref: B256,
    #[serde(default)]
    pub delivered: bool,
}

impl Recipient {
    pub fn new(target: Address, post_ref: B256) -> Self {
        Self {
            target,
            post_ref,
            delivered: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub context_id: String,
    pub processed: usize,
    pub total: usize,
    pub status: BatchStatus,
    #[serde(default)]
    pub error: Option<String>,
    /// Processed indices whose transaction was sent but never verified on-chain.
    #[serde(default)]
    pub unverified: Vec<usize>,
}

/// Multi-recipient payout request covered by one granted approval context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub context_id: String,
    pub token: Address,
    pub amount_each: U256,
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenBounds {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfacePlacement {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}
