use std::future::Future;

use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::domain::{
    BatchProgress, ChainLog, LogFilter, QueueSummary, ScreenBounds, SurfaceId, SurfacePlacement,
    TxReceipt, TxRequest, WindowBounds,
};
use crate::state_machine::SubmissionStatus;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("port not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("user rejected: {0}")]
    UserRejected(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("policy error: {0}")]
    Policy(String),
}

/// Signing authority. Returns a broadcast hash and lets callers await its receipt.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    fn send_transaction(
        &self,
        request: TxRequest,
    ) -> impl Future<Output = Result<B256, PortError>> + Send;

    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<TxReceipt, PortError>> + Send;
}

/// Signer-independent chain reads.
pub trait ChainReader: Send + Sync {
    fn token_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, PortError>> + Send;

    fn token_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, PortError>> + Send;

    /// Nonce including transactions still in the mempool.
    fn pending_nonce(&self, address: Address)
        -> impl Future<Output = Result<u64, PortError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, PortError>> + Send;

    fn logs(
        &self,
        filter: &LogFilter,
    ) -> impl Future<Output = Result<Vec<ChainLog>, PortError>> + Send;
}

/// Owner of the modal approval window.
///
/// Implementations must not call back into the action queue from inside these methods;
/// out-of-band closes are reported later through `WalletActionQueue::on_surface_closed`.
pub trait ApprovalSurface: Send + Sync {
    fn focused_window(&self) -> Option<WindowBounds>;
    fn screen(&self) -> ScreenBounds;
    fn open(&self, placement: SurfacePlacement) -> Result<SurfaceId, PortError>;
    /// Returns `false` when the surface no longer exists.
    fn focus(&self, id: SurfaceId) -> Result<bool, PortError>;
    fn close(&self, id: SurfaceId) -> Result<(), PortError>;
}

/// Context-independent broadcast of pipeline notifications.
pub trait EventSink: Send + Sync {
    fn submission_status(&self, status: SubmissionStatus);

    fn batch_progress(&self, _progress: BatchProgress) {}

    fn queue_changed(&self, _summary: QueueSummary) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn submission_status(&self, _status: SubmissionStatus) {}
}
