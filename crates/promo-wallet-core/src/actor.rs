//! Background actor: owns the action queue, the submission engine and the ledger of
//! approval contexts, and serves foreground requests from a mailbox.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use alloy::primitives::Address;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action_queue::{ActionResult, WalletActionQueue};
use crate::approval::DEFAULT_APPROVAL_TIMEOUT;
use crate::batch::BatchCoordinator;
use crate::domain::{
    ActionId, ActionMeta, BatchProgress, BatchRequest, QueueSummary, SubmissionOutcome, SurfaceId,
    TransactionPlan,
};
use crate::engine::SubmissionEngine;
use crate::error::WalletError;
use crate::ports::{ApprovalSurface, ChainReader, EventSink, TransactionSigner};
use crate::protocol::{ApprovalPayload, BackgroundEvent, ForegroundRequest};
use crate::state_machine::SubmissionStatus;
use crate::surface::SurfaceConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorConfig {
    /// Promotion vault: spender of allowances and target of every plan built by the actor.
    pub contract: Address,
    pub surface: SurfaceConfig,
    pub mailbox: usize,
    pub event_buffer: usize,
    /// How long a granted context stays usable by `Submit` or `StartBatch`.
    pub grant_ttl: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            contract: Address::ZERO,
            surface: SurfaceConfig::default(),
            mailbox: 64,
            event_buffer: 256,
            grant_ttl: DEFAULT_APPROVAL_TIMEOUT,
        }
    }
}

/// Forwards pipeline notifications onto the broadcast channel.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<BackgroundEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<BackgroundEvent>) -> Self {
        Self { tx }
    }

    fn publish(&self, event: BackgroundEvent) {
        // No subscribers is not an error; foreground contexts come and go.
        let _ = self.tx.send(event);
    }
}

impl EventSink for BroadcastSink {
    fn submission_status(&self, status: SubmissionStatus) {
        self.publish(BackgroundEvent::Submission { status });
    }

    fn batch_progress(&self, progress: BatchProgress) {
        self.publish(BackgroundEvent::BatchProgress { progress });
    }

    fn queue_changed(&self, summary: QueueSummary) {
        self.publish(BackgroundEvent::QueueChanged { summary });
    }
}

/// Where each approval context stands on the background side.
#[derive(Default)]
struct ContextLedger {
    /// Awaiting the user's decision in the action queue.
    pending: HashMap<String, ActionId>,
    /// Cancelled by the foreground after the decision was already on its way.
    cancelled: HashMap<String, String>,
    /// Approved and not yet used.
    granted: HashMap<String, Grant>,
    /// Used by a running submission or batch.
    in_flight: HashMap<String, CancellationToken>,
}

struct Grant {
    token: CancellationToken,
    expires_at: Instant,
}

impl ContextLedger {
    fn grant(&mut self, context_id: String, ttl: Duration) {
        let now = Instant::now();
        self.granted.retain(|_, g| g.expires_at > now);
        self.granted.insert(
            context_id,
            Grant {
                token: CancellationToken::new(),
                expires_at: now + ttl,
            },
        );
    }

    /// Removes the grant for `context_id`; an expired one is discarded.
    fn take_grant(&mut self, context_id: &str) -> Option<CancellationToken> {
        let grant = self.granted.remove(context_id)?;
        if grant.expires_at <= Instant::now() {
            debug!(context_id, "approval grant expired");
            return None;
        }
        Some(grant.token)
    }
}

pub struct BackgroundActor<S, C> {
    engine: Arc<SubmissionEngine<S, C>>,
    batches: Arc<BatchCoordinator<S, C>>,
    queue: WalletActionQueue,
    events: broadcast::Sender<BackgroundEvent>,
    sink: Arc<dyn EventSink>,
    ledger: Arc<Mutex<ContextLedger>>,
    mailbox: usize,
    grant_ttl: Duration,
}

impl<S, C> BackgroundActor<S, C>
where
    S: TransactionSigner + 'static,
    C: ChainReader + 'static,
{
    pub fn new(
        engine: Arc<SubmissionEngine<S, C>>,
        surface: Arc<dyn ApprovalSurface>,
        config: ActorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let sink: Arc<dyn EventSink> = Arc::new(BroadcastSink::new(events.clone()));
        let queue = WalletActionQueue::new(surface, config.surface, Arc::clone(&sink));
        let batches = Arc::new(BatchCoordinator::new(Arc::clone(&engine), config.contract));
        Self {
            engine,
            batches,
            queue,
            events,
            sink,
            ledger: Arc::new(Mutex::new(ContextLedger::default())),
            mailbox: config.mailbox.max(1),
            grant_ttl: config.grant_ttl,
        }
    }

    pub fn queue(&self) -> &WalletActionQueue {
        &self.queue
    }

    /// Starts serving the mailbox. The actor stops once every request sender is dropped.
    pub fn spawn(self) -> (BackgroundHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.mailbox);
        let handle = BackgroundHandle {
            requests: tx,
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(self, mut rx: mpsc::Receiver<ForegroundRequest>) {
        info!("background actor started");
        while let Some(request) = rx.recv().await {
            self.handle(request);
        }
        info!("background actor stopped");
    }

    fn handle(&self, request: ForegroundRequest) {
        match request {
            ForegroundRequest::RequestApproval {
                context_id,
                payload,
                reply,
            } => {
                let _ = reply.send(Ok(self.request_approval(context_id, payload)));
            }
            ForegroundRequest::CancelApproval { context_id, reason } => {
                self.cancel_approval(&context_id, &reason);
            }
            ForegroundRequest::Execute { meta, plan, reply } => self.execute(meta, plan, reply),
            ForegroundRequest::Submit { plan, reply } => self.submit(plan, reply),
            ForegroundRequest::StartBatch { request, reply } => {
                let started = self.start_batch(request);
                let _ = reply.send(started);
            }
            ForegroundRequest::Respond {
                id,
                approved,
                reply,
            } => {
                let _ = reply.send(self.queue.respond(id, approved));
            }
            ForegroundRequest::CancelById { id, reason, reply } => {
                let _ = reply.send(self.queue.cancel_by_id(id, &reason));
            }
            ForegroundRequest::RejectActive { reason, reply } => {
                let _ = reply.send(self.queue.reject_active(&reason));
            }
            ForegroundRequest::GetSummary { reply } => {
                let _ = reply.send(self.queue.summary());
            }
            ForegroundRequest::SurfaceClosed { id } => self.queue.on_surface_closed(id),
        }
    }

    fn request_approval(&self, context_id: String, payload: ApprovalPayload) -> ActionId {
        if let Some(id) = lock_ledger(&self.ledger).pending.get(&context_id) {
            debug!(context_id = %context_id, action_id = %id, "approval already pending");
            return *id;
        }

        let granted = json!({ "granted": true, "context_id": context_id });
        let ticket = self
            .queue
            .enqueue(payload.meta, move || async move { Ok(granted) });
        let id = ticket.id();
        {
            let mut ledger = lock_ledger(&self.ledger);
            ledger.pending.insert(context_id.clone(), id);
            ledger.cancelled.remove(&context_id);
        }
        info!(context_id = %context_id, action_id = %id, "approval requested");
        debug!(context_id = %context_id, detail = %payload.detail, "approval payload");

        let ledger = Arc::clone(&self.ledger);
        let events = self.events.clone();
        let grant_ttl = self.grant_ttl;
        tokio::spawn(async move {
            let decision = ticket.await;
            let event = {
                let mut ledger = lock_ledger(&ledger);
                if ledger.pending.get(&context_id) == Some(&id) {
                    ledger.pending.remove(&context_id);
                }
                match (decision, ledger.cancelled.remove(&context_id)) {
                    (Ok(_), None) => {
                        ledger.grant(context_id.clone(), grant_ttl);
                        BackgroundEvent::ApprovalGranted { context_id }
                    }
                    (Ok(_), Some(reason)) => BackgroundEvent::ApprovalDenied {
                        reason: WalletError::Cancelled(reason).to_string(),
                        context_id,
                    },
                    (Err(e), _) => BackgroundEvent::ApprovalDenied {
                        reason: e.to_string(),
                        context_id,
                    },
                }
            };
            debug!(context_id = ?event.context_id(), "approval decided");
            let _ = events.send(event);
        });
        id
    }

    /// Advisory: stops what has not been submitted yet, never an in-flight transaction.
    fn cancel_approval(&self, context_id: &str, reason: &str) {
        let pending = {
            let mut ledger = lock_ledger(&self.ledger);
            if let Some(grant) = ledger.granted.remove(context_id) {
                grant.token.cancel();
                info!(context_id, reason, "unused approval revoked");
                return;
            }
            if let Some(token) = ledger.in_flight.get(context_id) {
                token.cancel();
                info!(context_id, reason, "in-flight operation asked to stop");
                return;
            }
            ledger.pending.get(context_id).copied()
        };

        let Some(id) = pending else {
            debug!(context_id, "cancel for unknown approval context ignored");
            return;
        };
        match self.queue.cancel_by_id(id, reason) {
            Ok(true) => info!(context_id, action_id = %id, reason, "pending approval cancelled"),
            Ok(false) | Err(_) => {
                // Decision already made; the settling task reports it as cancelled.
                lock_ledger(&self.ledger)
                    .cancelled
                    .insert(context_id.to_owned(), reason.to_owned());
            }
        }
    }

    fn execute(&self, meta: ActionMeta, plan: TransactionPlan, reply: oneshot::Sender<ActionResult>) {
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let ticket = self.queue.enqueue(meta, move || async move {
            let outcome = engine.execute(&plan, sink).await?;
            serde_json::to_value(outcome)
                .map_err(|e| WalletError::Submission(format!("encode outcome: {e}")))
        });
        tokio::spawn(async move {
            let _ = reply.send(ticket.await);
        });
    }

    fn submit(
        &self,
        plan: TransactionPlan,
        reply: oneshot::Sender<Result<SubmissionOutcome, WalletError>>,
    ) {
        let token = match self.claim_grant(&plan.context_id) {
            Ok(token) => token,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            let result = if token.is_cancelled() {
                Err(WalletError::Cancelled(plan.context_id.clone()))
            } else {
                engine.execute(&plan, sink).await
            };
            lock_ledger(&ledger).in_flight.remove(&plan.context_id);
            let _ = reply.send(result);
        });
    }

    fn start_batch(&self, request: BatchRequest) -> Result<(), WalletError> {
        if request.recipients.is_empty() {
            return Err(WalletError::InvalidParams("batch has no recipients".to_owned()));
        }
        if request.amount_each.is_zero() {
            return Err(WalletError::InvalidParams("amount must be positive".to_owned()));
        }
        let token = self.claim_grant(&request.context_id)?;
        info!(
            context_id = %request.context_id,
            recipients = request.recipients.len(),
            "batch started"
        );
        let batches = Arc::clone(&self.batches);
        let sink = Arc::clone(&self.sink);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            let context_id = request.context_id.clone();
            let session = batches.run(request, token, sink).await;
            lock_ledger(&ledger).in_flight.remove(&context_id);
            debug!(context_id = %context_id, status = ?session.status, processed = session.processed, "batch finished");
        });
        Ok(())
    }

    /// Consumes a granted context. One approval covers exactly one submission or batch,
    /// and only within `grant_ttl` of the decision.
    fn claim_grant(&self, context_id: &str) -> Result<CancellationToken, WalletError> {
        let mut ledger = lock_ledger(&self.ledger);
        let token = ledger.take_grant(context_id).ok_or_else(|| {
            warn!(context_id, "no granted approval for context");
            WalletError::NotFound(context_id.to_owned())
        })?;
        ledger.in_flight.insert(context_id.to_owned(), token.clone());
        Ok(token)
    }
}

// Ledger updates are single map operations; a poisoned guard is still consistent.
fn lock_ledger(m: &Mutex<ContextLedger>) -> MutexGuard<'_, ContextLedger> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Cloneable entry point to a running background actor.
#[derive(Clone)]
pub struct BackgroundHandle {
    requests: mpsc::Sender<ForegroundRequest>,
    events: broadcast::Sender<BackgroundEvent>,
}

impl BackgroundHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<BackgroundEvent> {
        self.events.subscribe()
    }

    pub fn requests(&self) -> &mpsc::Sender<ForegroundRequest> {
        &self.requests
    }

    pub async fn respond(&self, id: ActionId, approved: bool) -> Result<(), WalletError> {
        self.call(|reply| ForegroundRequest::Respond {
            id,
            approved,
            reply,
        })
        .await?
    }

    pub async fn cancel_by_id(&self, id: ActionId, reason: &str) -> Result<bool, WalletError> {
        let reason = reason.to_owned();
        self.call(|reply| ForegroundRequest::CancelById { id, reason, reply })
            .await?
    }

    pub async fn reject_active(&self, reason: &str) -> Result<bool, WalletError> {
        let reason = reason.to_owned();
        self.call(|reply| ForegroundRequest::RejectActive { reason, reply })
            .await
    }

    pub async fn summary(&self) -> Result<QueueSummary, WalletError> {
        self.call(|reply| ForegroundRequest::GetSummary { reply }).await
    }

    pub async fn surface_closed(&self, id: SurfaceId) -> Result<(), WalletError> {
        self.requests
            .send(ForegroundRequest::SurfaceClosed { id })
            .await
            .map_err(|_| actor_unavailable())
    }

    pub(crate) async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ForegroundRequest,
    ) -> Result<T, WalletError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(build(tx))
            .await
            .map_err(|_| actor_unavailable())?;
        rx.await.map_err(|_| actor_unavailable())
    }
}

pub(crate) fn actor_unavailable() -> WalletError {
    WalletError::ProviderUnavailable("background actor unavailable".to_owned())
}
