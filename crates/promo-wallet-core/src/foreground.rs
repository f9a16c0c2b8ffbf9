//! Foreground side of the approval protocol.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::action_queue::ActionResult;
use crate::actor::{actor_unavailable, BackgroundHandle};
use crate::approval::{ApprovalRegistry, DEFAULT_APPROVAL_TIMEOUT};
use crate::batch::BatchProgressTracker;
use crate::domain::{ActionMeta, BatchProgress, BatchRequest, BatchStatus, SubmissionOutcome, TransactionPlan};
use crate::error::WalletError;
use crate::protocol::{ApprovalPayload, BackgroundEvent, ForegroundRequest};

/// One foreground context connected to the background actor.
///
/// Owns an [`ApprovalRegistry`] fed by a listener on the actor's broadcast channel.
pub struct ForegroundClient {
    handle: BackgroundHandle,
    registry: ApprovalRegistry,
    approval_timeout: Duration,
    listener: JoinHandle<()>,
}

impl ForegroundClient {
    pub fn connect(handle: BackgroundHandle) -> Self {
        Self::with_timeout(handle, DEFAULT_APPROVAL_TIMEOUT)
    }

    pub fn with_timeout(handle: BackgroundHandle, approval_timeout: Duration) -> Self {
        let registry = ApprovalRegistry::new();
        let listener = tokio::spawn(listen(handle.subscribe(), registry.clone()));
        Self {
            handle,
            registry,
            approval_timeout,
            listener,
        }
    }

    pub fn registry(&self) -> &ApprovalRegistry {
        &self.registry
    }

    pub fn handle(&self) -> &BackgroundHandle {
        &self.handle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackgroundEvent> {
        self.handle.subscribe()
    }

    /// Whether the actor accepted the request for consideration; says nothing about the
    /// user's decision.
    pub async fn request_approval(&self, context_id: &str, payload: ApprovalPayload) -> bool {
        let accepted = self
            .handle
            .call(|reply| ForegroundRequest::RequestApproval {
                context_id: context_id.to_owned(),
                payload,
                reply,
            })
            .await;
        match accepted {
            Ok(Ok(id)) => {
                debug!(context_id, action_id = %id, "approval request accepted");
                true
            }
            Ok(Err(e)) | Err(e) => {
                warn!(context_id, error = %e, "approval request not accepted");
                false
            }
        }
    }

    /// Registers the waiter now; see [`ApprovalRegistry::wait_for_approval`].
    pub fn wait_for_approval(
        &self,
        context_id: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = Result<(), WalletError>> + Send + 'static {
        self.registry
            .wait_for_approval(context_id, timeout.unwrap_or(self.approval_timeout))
    }

    /// Registers the waiter before sending the request so a fast decision cannot be missed.
    pub async fn request_and_wait(
        &self,
        context_id: &str,
        payload: ApprovalPayload,
    ) -> Result<(), WalletError> {
        let wait = self.wait_for_approval(context_id, None);
        if !self.request_approval(context_id, payload).await {
            self.registry.deny(context_id, actor_unavailable().to_string());
            // Consume the registration resolved by the deny above.
            let _ = wait.await;
            return Err(actor_unavailable());
        }
        wait.await
    }

    /// Fire-and-forget. Never fails, even when the actor is gone.
    pub fn cancel_approval(&self, context_id: &str, reason: &str) {
        let sent = self
            .handle
            .requests()
            .try_send(ForegroundRequest::CancelApproval {
                context_id: context_id.to_owned(),
                reason: reason.to_owned(),
            });
        if let Err(e) = sent {
            debug!(context_id, error = %e, "cancel approval not delivered");
        }
    }

    /// Queues `plan` for the user's decision and signs it once approved.
    pub async fn execute(&self, meta: ActionMeta, plan: TransactionPlan) -> ActionResult {
        self.handle
            .call(|reply| ForegroundRequest::Execute { meta, plan, reply })
            .await?
    }

    /// Submits under a context the user already granted.
    pub async fn submit(&self, plan: TransactionPlan) -> Result<SubmissionOutcome, WalletError> {
        self.handle
            .call(|reply| ForegroundRequest::Submit { plan, reply })
            .await?
    }

    pub async fn start_batch(&self, request: BatchRequest) -> Result<BatchSubscription, WalletError> {
        let events = self.handle.subscribe();
        let context_id = request.context_id.clone();
        let total = request.recipients.len();
        self.handle
            .call(|reply| ForegroundRequest::StartBatch { request, reply })
            .await??;
        Ok(BatchSubscription {
            context_id,
            events,
            tracker: BatchProgressTracker::new(total),
            finished: false,
        })
    }
}

impl Drop for ForegroundClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(mut events: broadcast::Receiver<BackgroundEvent>, registry: ApprovalRegistry) {
    loop {
        match events.recv().await {
            Ok(BackgroundEvent::ApprovalGranted { context_id }) => {
                registry.grant(&context_id);
            }
            Ok(BackgroundEvent::ApprovalDenied { context_id, reason }) => {
                registry.deny(&context_id, reason);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "foreground listener lagged behind background events");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Progress of one batch as seen from the foreground.
#[derive(Debug)]
pub struct BatchSubscription {
    context_id: String,
    events: broadcast::Receiver<BackgroundEvent>,
    tracker: BatchProgressTracker,
    finished: bool,
}

impl BatchSubscription {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn tracker(&self) -> &BatchProgressTracker {
        &self.tracker
    }

    /// Waits for the next progress signal of this batch, applying `mark` to every newly
    /// delivered recipient index in order. Returns `None` after the terminal signal.
    pub async fn next(&mut self, mut mark: impl FnMut(usize)) -> Option<BatchProgress> {
        if self.finished {
            return None;
        }
        loop {
            match self.events.recv().await {
                Ok(BackgroundEvent::BatchProgress { progress })
                    if progress.context_id == self.context_id =>
                {
                    self.tracker.apply(&progress, &mut mark);
                    if progress.status != BatchStatus::Processing {
                        self.finished = true;
                    }
                    return Some(progress);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(context_id = %self.context_id, skipped, "batch progress lagged");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Drives the subscription to its terminal signal.
    pub async fn finish(mut self, mut mark: impl FnMut(usize)) -> Option<BatchProgress> {
        let mut last = None;
        while let Some(progress) = self.next(&mut mark).await {
            last = Some(progress);
        }
        last
    }
}
