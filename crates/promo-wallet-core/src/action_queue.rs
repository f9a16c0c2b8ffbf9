//! Single-flight queue of signing requests awaiting a user decision.
//!
//! Only the head of the queue is ever shown to the user (`AwaitingUser`) or executing
//! (`Processing`). Every enqueued action resolves its [`ActionTicket`] exactly once.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::{ActionId, ActionMeta, ActionStatus, QueueItemSummary, QueueSummary, SurfaceId};
use crate::error::WalletError;
use crate::ports::{ApprovalSurface, EventSink};
use crate::surface::{place_surface, SurfaceConfig};

pub type ActionResult = Result<Value, WalletError>;
pub type PerformFuture = Pin<Box<dyn Future<Output = ActionResult> + Send + 'static>>;
pub type Perform = Box<dyn FnOnce() -> PerformFuture + Send + 'static>;

/// Consumed-once handle to the final result of an enqueued action.
#[derive(Debug)]
pub struct ActionTicket {
    id: ActionId,
    rx: oneshot::Receiver<ActionResult>,
}

impl ActionTicket {
    pub fn id(&self) -> ActionId {
        self.id
    }
}

impl Future for ActionTicket {
    type Output = ActionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| Err(WalletError::Cancelled("wallet action queue shut down".to_owned())))
        })
    }
}

struct Responder(oneshot::Sender<ActionResult>);

impl Responder {
    fn deliver(self, result: ActionResult) {
        // Requester may have stopped listening.
        let _ = self.0.send(result);
    }
}

struct PendingAction {
    id: ActionId,
    meta: ActionMeta,
    status: ActionStatus,
    perform: Option<Perform>,
    responder: Responder,
}

#[derive(Default)]
struct QueueState {
    actions: VecDeque<PendingAction>,
    next_id: u64,
}

impl QueueState {
    fn summary(&self) -> QueueSummary {
        QueueSummary {
            active_id: self
                .actions
                .front()
                .filter(|a| a.status != ActionStatus::Queued)
                .map(|a| a.id),
            items: self
                .actions
                .iter()
                .enumerate()
                .map(|(position, a)| QueueItemSummary {
                    id: a.id,
                    status: a.status,
                    position,
                    meta: a.meta.clone(),
                })
                .collect(),
        }
    }

    /// Promotes the head to `AwaitingUser` when nothing is active.
    fn promote_head(&mut self) -> Option<ActionId> {
        let head = self.actions.front_mut()?;
        if head.status == ActionStatus::Queued {
            head.status = ActionStatus::AwaitingUser;
            return Some(head.id);
        }
        None
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    surface_slot: Mutex<Option<SurfaceId>>,
    surface: Arc<dyn ApprovalSurface>,
    surface_config: SurfaceConfig,
    events: Arc<dyn EventSink>,
}

#[derive(Clone)]
pub struct WalletActionQueue {
    inner: Arc<QueueInner>,
}

impl WalletActionQueue {
    pub fn new(
        surface: Arc<dyn ApprovalSurface>,
        surface_config: SurfaceConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                surface_slot: Mutex::new(None),
                surface,
                surface_config,
                events,
            }),
        }
    }

    pub fn enqueue<F, Fut>(&self, meta: ActionMeta, perform: F) -> ActionTicket
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        self.enqueue_boxed(meta, Box::new(move || Box::pin(perform()) as PerformFuture))
    }

    pub fn enqueue_boxed(&self, meta: ActionMeta, perform: Perform) -> ActionTicket {
        let (tx, rx) = oneshot::channel();
        let (id, summary) = {
            let mut state = lock_state(&self.inner.state);
            state.next_id += 1;
            let id = ActionId(state.next_id);
            let status = if state.actions.is_empty() {
                ActionStatus::AwaitingUser
            } else {
                ActionStatus::Queued
            };
            state.actions.push_back(PendingAction {
                id,
                meta,
                status,
                perform: Some(perform),
                responder: Responder(tx),
            });
            (id, state.summary())
        };
        info!(action_id = %id, queued = summary.items.len(), "wallet action enqueued");
        self.inner.events.queue_changed(summary);
        self.ensure_surface();
        ActionTicket { id, rx }
    }

    /// User decision for the action currently shown on the approval surface.
    ///
    /// Approval runs `perform` on a background task; its settlement answers the requester
    /// and advances the queue.
    pub fn respond(&self, id: ActionId, approved: bool) -> Result<(), WalletError> {
        let mut state = lock_state(&self.inner.state);
        let pos = state
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        if pos != 0 || state.actions[pos].status != ActionStatus::AwaitingUser {
            debug!(action_id = %id, position = pos, "respond for inactive action refused");
            return Err(WalletError::NotActive(id));
        }

        if !approved {
            let action = state.actions.pop_front();
            drop(state);
            if let Some(action) = action {
                info!(action_id = %id, "wallet action rejected by user");
                action.responder.deliver(Err(WalletError::UserRejected));
            }
            self.advance();
            return Ok(());
        }

        let head = &mut state.actions[0];
        let perform = head.perform.take().ok_or(WalletError::NotActive(id))?;
        head.status = ActionStatus::Processing;
        let summary = state.summary();
        drop(state);

        info!(action_id = %id, "wallet action approved, processing");
        self.inner.events.queue_changed(summary);

        let queue = self.clone();
        tokio::spawn(async move {
            let outcome = match tokio::spawn(async move { perform().await }).await {
                Ok(outcome) => outcome,
                Err(e) => Err(WalletError::Submission(format!("wallet action aborted: {e}"))),
            };
            queue.settle(id, outcome);
        });
        Ok(())
    }

    /// Removes a queued or awaiting action and answers it with `Cancelled`.
    ///
    /// An action already `Processing` cannot be recalled: it settles with its own outcome
    /// and `Ok(false)` is returned.
    pub fn cancel_by_id(&self, id: ActionId, reason: &str) -> Result<bool, WalletError> {
        let mut state = lock_state(&self.inner.state);
        let pos = state
            .actions
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| WalletError::NotFound(id.to_string()))?;
        if state.actions[pos].status == ActionStatus::Processing {
            debug!(action_id = %id, "cancel ignored for processing action");
            return Ok(false);
        }
        let action = state.actions.remove(pos);
        drop(state);
        if let Some(action) = action {
            info!(action_id = %id, reason, "wallet action cancelled");
            action
                .responder
                .deliver(Err(WalletError::Cancelled(reason.to_owned())));
        }
        self.advance();
        Ok(true)
    }

    /// Cancels whatever is awaiting the user. Returns whether an action was removed.
    pub fn reject_active(&self, reason: &str) -> bool {
        let active = {
            let state = lock_state(&self.inner.state);
            state
                .actions
                .front()
                .filter(|a| a.status == ActionStatus::AwaitingUser)
                .map(|a| a.id)
        };
        match active {
            Some(id) => self.cancel_by_id(id, reason).unwrap_or(false),
            None => false,
        }
    }

    /// The user closed the approval surface outside of the queue's control.
    pub fn on_surface_closed(&self, id: SurfaceId) {
        {
            let mut slot = lock_slot(&self.inner.surface_slot);
            if *slot != Some(id) {
                debug!(surface_id = id.0, "ignoring close of stale approval surface");
                return;
            }
            *slot = None;
        }
        if self.reject_active("Approval window closed") {
            info!(surface_id = id.0, "approval surface closed, active request rejected");
        }
    }

    pub fn summary(&self) -> QueueSummary {
        lock_state(&self.inner.state).summary()
    }

    pub fn len(&self) -> usize {
        lock_state(&self.inner.state).actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        *lock_slot(&self.inner.surface_slot)
    }

    fn settle(&self, id: ActionId, outcome: ActionResult) {
        let action = {
            let mut state = lock_state(&self.inner.state);
            let pos = state.actions.iter().position(|a| a.id == id);
            pos.and_then(|p| state.actions.remove(p))
        };
        match action {
            Some(action) => {
                match &outcome {
                    Ok(_) => info!(action_id = %id, "wallet action completed"),
                    Err(e) => warn!(action_id = %id, error = %e, "wallet action failed"),
                }
                action.responder.deliver(outcome);
            }
            None => warn!(action_id = %id, "settled action was no longer queued"),
        }
        self.advance();
    }

    fn advance(&self) {
        let (summary, promoted) = {
            let mut state = lock_state(&self.inner.state);
            let promoted = state.promote_head();
            (state.summary(), promoted)
        };
        if let Some(id) = promoted {
            debug!(action_id = %id, "next wallet action awaiting user");
        }
        let empty = summary.is_empty();
        self.inner.events.queue_changed(summary);
        if empty {
            self.close_surface();
        } else {
            self.ensure_surface();
        }
    }

    /// Reuses and refocuses an open surface, or opens a new one.
    fn ensure_surface(&self) {
        let mut slot = lock_slot(&self.inner.surface_slot);
        if let Some(id) = *slot {
            match self.inner.surface.focus(id) {
                Ok(true) => return,
                Ok(false) => debug!(surface_id = id.0, "approval surface gone, reopening"),
                Err(e) => warn!(surface_id = id.0, error = %e, "failed to focus approval surface"),
            }
            *slot = None;
        }
        let placement = place_surface(
            self.inner.surface.focused_window(),
            self.inner.surface.screen(),
            &self.inner.surface_config,
        );
        match self.inner.surface.open(placement) {
            Ok(id) => {
                debug!(surface_id = id.0, left = placement.left, top = placement.top, "approval surface opened");
                *slot = Some(id);
            }
            Err(e) => warn!(error = %e, "failed to open approval surface"),
        }
    }

    fn close_surface(&self) {
        let id = lock_slot(&self.inner.surface_slot).take();
        if let Some(id) = id {
            if let Err(e) = self.inner.surface.close(id) {
                warn!(surface_id = id.0, error = %e, "failed to close approval surface");
            }
        }
    }
}

// Every mutation under these locks is a single push/remove/write, so a poisoned guard
// still holds a consistent queue.
fn lock_state(m: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn lock_slot(m: &Mutex<Option<SurfaceId>>) -> MutexGuard<'_, Option<SurfaceId>> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
