use alloy::primitives::{B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStep {
    Idle,
    CheckingAllowance,
    AwaitingApprovalSignature,
    ApprovalSubmitted,
    AwaitingSubmitSignature,
    SubmitSubmitted,
    VerifyingOnChain,
    Completed,
    Failed,
}

impl SubmissionStep {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: SubmissionStep,
    pub to: SubmissionStep,
    pub reason: &'static str,
}

pub fn submission_transition(
    from: SubmissionStep,
    to: SubmissionStep,
) -> Result<StateTransition, WalletError> {
    use SubmissionStep::*;

    let reason = match (from, to) {
        (Idle, CheckingAllowance) => "check_allowance",
        (CheckingAllowance, AwaitingApprovalSignature) => "allowance_insufficient",
        (CheckingAllowance, AwaitingSubmitSignature) => "allowance_sufficient",
        (AwaitingApprovalSignature, ApprovalSubmitted) => "approval_broadcast",
        (AwaitingApprovalSignature, AwaitingSubmitSignature) => "allowance_recheck_sufficient",
        (ApprovalSubmitted, AwaitingSubmitSignature) => "approval_pending",
        (AwaitingSubmitSignature, SubmitSubmitted) => "submit_broadcast",
        (SubmitSubmitted, VerifyingOnChain) => "verify",
        (VerifyingOnChain, Completed) => "verified",
        (from, Failed) if !from.is_terminal() => "failed",
        _ => {
            return Err(WalletError::IllegalTransition {
                from: format!("{from:?}"),
                to: format!("{to:?}"),
            })
        }
    };
    Ok(StateTransition { from, to, reason })
}

/// Step-level report sent back to the foreground while a plan executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Step {
        context_id: String,
        step: SubmissionStep,
        tx_hash: Option<B256>,
        detail: Option<String>,
    },
    /// Informational: the approval transaction's allowance became visible on-chain.
    AllowanceConfirmed {
        context_id: String,
        approval_tx_hash: B256,
        allowance: U256,
    },
}

impl SubmissionStatus {
    pub fn context_id(&self) -> &str {
        match self {
            Self::Step { context_id, .. } | Self::AllowanceConfirmed { context_id, .. } => {
                context_id
            }
        }
    }

    pub fn step(&self) -> Option<SubmissionStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            Self::AllowanceConfirmed { .. } => None,
        }
    }
}
