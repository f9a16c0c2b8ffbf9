//! Messages exchanged between foreground contexts and the background actor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::action_queue::ActionResult;
use crate::domain::{
    ActionId, ActionMeta, BatchProgress, BatchRequest, QueueSummary, SubmissionOutcome, SurfaceId,
    TransactionPlan,
};
use crate::error::WalletError;
use crate::state_machine::SubmissionStatus;

/// What the user is asked to approve. `detail` is passed through to the surface untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub meta: ActionMeta,
    #[serde(default)]
    pub detail: Value,
}

/// Request half of the inter-context channel. Variants with a `reply` are request/response.
#[derive(Debug)]
pub enum ForegroundRequest {
    RequestApproval {
        context_id: String,
        payload: ApprovalPayload,
        reply: oneshot::Sender<Result<ActionId, WalletError>>,
    },
    CancelApproval {
        context_id: String,
        reason: String,
    },
    /// Queue-gated single operation: the approved action itself signs and submits `plan`.
    Execute {
        meta: ActionMeta,
        plan: TransactionPlan,
        reply: oneshot::Sender<ActionResult>,
    },
    /// Submits `plan` under the previously granted context `plan.context_id`.
    Submit {
        plan: TransactionPlan,
        reply: oneshot::Sender<Result<SubmissionOutcome, WalletError>>,
    },
    StartBatch {
        request: BatchRequest,
        reply: oneshot::Sender<Result<(), WalletError>>,
    },
    Respond {
        id: ActionId,
        approved: bool,
        reply: oneshot::Sender<Result<(), WalletError>>,
    },
    CancelById {
        id: ActionId,
        reason: String,
        reply: oneshot::Sender<Result<bool, WalletError>>,
    },
    RejectActive {
        reason: String,
        reply: oneshot::Sender<bool>,
    },
    GetSummary {
        reply: oneshot::Sender<QueueSummary>,
    },
    SurfaceClosed {
        id: SurfaceId,
    },
}

/// Context-independent broadcast from the background actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BackgroundEvent {
    QueueChanged { summary: QueueSummary },
    ApprovalGranted { context_id: String },
    ApprovalDenied { context_id: String, reason: String },
    Submission { status: SubmissionStatus },
    BatchProgress { progress: BatchProgress },
}

impl BackgroundEvent {
    pub fn context_id(&self) -> Option<&str> {
        match self {
            Self::ApprovalGranted { context_id } | Self::ApprovalDenied { context_id, .. } => {
                Some(context_id)
            }
            Self::Submission { status } => Some(status.context_id()),
            Self::BatchProgress { progress } => Some(&progress.context_id),
            Self::QueueChanged { .. } => None,
        }
    }
}
