pub mod action_queue;
pub mod actor;
pub mod approval;
pub mod batch;
pub mod confirmation;
pub mod contracts;
pub mod domain;
pub mod engine;
pub mod error;
pub mod foreground;
pub mod nonce;
pub mod ports;
pub mod protocol;
pub mod state_machine;
pub mod surface;

pub use action_queue::{ActionResult, ActionTicket, WalletActionQueue};
pub use actor::{ActorConfig, BackgroundActor, BackgroundHandle, BroadcastSink};
pub use approval::{ApprovalRegistry, DEFAULT_APPROVAL_TIMEOUT};
pub use batch::{BatchCoordinator, BatchProgressTracker, BatchSession};
pub use confirmation::{confirm_submission, Confirmation};
pub use domain::{
    ActionId, ActionMeta, ActionStatus, BatchProgress, BatchRequest, BatchStatus,
    ConfirmationSource, PlanCall, QueueSummary, Recipient, SubmissionOutcome, SurfaceId,
    TransactionPlan,
};
pub use engine::{EngineConfig, SubmissionEngine};
pub use error::{classify_port_error, WalletError};
pub use foreground::{BatchSubscription, ForegroundClient};
pub use nonce::NonceTracker;
pub use ports::{ApprovalSurface, ChainReader, EventSink, NoopSink, PortError, TransactionSigner};
pub use protocol::{ApprovalPayload, BackgroundEvent, ForegroundRequest};
pub use state_machine::{submission_transition, StateTransition, SubmissionStatus, SubmissionStep};
pub use surface::{place_surface, SurfaceConfig};
