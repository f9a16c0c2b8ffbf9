use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ActionId;
use crate::ports::PortError;

/// Outcome-level failures of the approval and submission pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum WalletError {
    #[error("request not found: {0}")]
    NotFound(String),
    #[error("This request is not currently active.")]
    NotActive(ActionId),
    #[error("User rejected the request")]
    UserRejected,
    #[error("Insufficient token balance")]
    InsufficientFunds,
    #[error("Insufficient token allowance")]
    InsufficientAllowance,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("wallet provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("transaction {tx_hash} was submitted but could not be verified on-chain in time")]
    VerificationTimeout { tx_hash: B256 },
    #[error("approval timed out for {0}")]
    Timeout(String),
    #[error("request cancelled: {0}")]
    Cancelled(String),
    /// Deny signal relayed from another context; carries its reason verbatim.
    #[error("{0}")]
    Denied(String),
    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },
    #[error("transaction submission failed: {0}")]
    Submission(String),
    #[error("illegal submission transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

impl WalletError {
    /// Protocol misuse returned to the caller of `respond`, never to the requester.
    pub fn is_queue_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::NotActive(_))
    }

    /// The transaction may still land; callers reconcile by re-reading the chain.
    pub fn is_reported_only(&self) -> bool {
        matches!(self, Self::VerificationTimeout { .. })
    }
}

pub fn classify_port_error(err: PortError) -> WalletError {
    match err {
        PortError::UserRejected(_) => WalletError::UserRejected,
        PortError::Rpc { code, message } => classify_rpc_error(code, &message),
        PortError::Transport(msg) | PortError::Policy(msg) => WalletError::ProviderUnavailable(msg),
        PortError::NotImplemented(what) => {
            WalletError::ProviderUnavailable(format!("{what} not available"))
        }
        PortError::Validation(msg) => WalletError::InvalidParams(msg),
        PortError::NotFound(msg) => WalletError::Submission(msg),
    }
}

fn classify_rpc_error(code: i64, message: &str) -> WalletError {
    let lower = message.to_ascii_lowercase();
    if code == 4001 || lower.contains("user rejected") || lower.contains("user denied") {
        return WalletError::UserRejected;
    }
    if matches!(code, 4100 | 4900 | 4901) || lower.contains("disconnected") {
        return WalletError::ProviderUnavailable(message.to_owned());
    }
    if lower.contains("insufficient funds") || lower.contains("exceeds balance") {
        return WalletError::InsufficientFunds;
    }
    if lower.contains("insufficient allowance") || lower.contains("exceeds allowance") {
        return WalletError::InsufficientAllowance;
    }
    if code == -32602 || lower.contains("invalid address") || lower.contains("invalid amount") {
        return WalletError::InvalidParams(message.to_owned());
    }
    WalletError::Submission(message.to_owned())
}
