#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use promo_wallet_core::domain::{ScreenBounds, SurfacePlacement, WindowBounds};
use promo_wallet_core::{
    ActionMeta, ActionStatus, ApprovalSurface, BatchProgress, EventSink, PortError, QueueSummary,
    SubmissionStatus, SurfaceConfig, SurfaceId, WalletActionQueue,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCall {
    Open(SurfacePlacement),
    Focus(SurfaceId),
    Close(SurfaceId),
}

#[derive(Default)]
struct SurfaceState {
    next_id: u64,
    live: HashSet<SurfaceId>,
    calls: Vec<SurfaceCall>,
}

/// In-memory approval surface that records every call.
#[derive(Default)]
pub struct RecordingSurface {
    focused: Mutex<Option<WindowBounds>>,
    state: Mutex<SurfaceState>,
}

impl RecordingSurface {
    pub fn with_focused(window: WindowBounds) -> Self {
        let s = Self::default();
        *s.focused.lock().expect("focused lock") = Some(window);
        s
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state.lock().expect("surface lock").calls.clone()
    }

    pub fn live(&self) -> usize {
        self.state.lock().expect("surface lock").live.len()
    }

    pub fn opens(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, SurfaceCall::Open(_)))
            .count()
    }

    /// Simulates the user closing the window without going through the queue.
    pub fn user_close(&self, id: SurfaceId) {
        self.state.lock().expect("surface lock").live.remove(&id);
    }
}

impl ApprovalSurface for RecordingSurface {
    fn focused_window(&self) -> Option<WindowBounds> {
        *self.focused.lock().expect("focused lock")
    }

    fn screen(&self) -> ScreenBounds {
        ScreenBounds {
            width: 1920,
            height: 1080,
        }
    }

    fn open(&self, placement: SurfacePlacement) -> Result<SurfaceId, PortError> {
        let mut g = self.state.lock().expect("surface lock");
        g.next_id += 1;
        let id = SurfaceId(g.next_id);
        g.live.insert(id);
        g.calls.push(SurfaceCall::Open(placement));
        Ok(id)
    }

    fn focus(&self, id: SurfaceId) -> Result<bool, PortError> {
        let mut g = self.state.lock().expect("surface lock");
        g.calls.push(SurfaceCall::Focus(id));
        Ok(g.live.contains(&id))
    }

    fn close(&self, id: SurfaceId) -> Result<(), PortError> {
        let mut g = self.state.lock().expect("surface lock");
        g.live.remove(&id);
        g.calls.push(SurfaceCall::Close(id));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub statuses: Mutex<Vec<SubmissionStatus>>,
    pub progress: Mutex<Vec<BatchProgress>>,
    pub summaries: Mutex<Vec<QueueSummary>>,
}

impl RecordingSink {
    pub fn summaries(&self) -> Vec<QueueSummary> {
        self.summaries.lock().expect("sink lock").clone()
    }
}

impl EventSink for RecordingSink {
    fn submission_status(&self, status: SubmissionStatus) {
        self.statuses.lock().expect("sink lock").push(status);
    }

    fn batch_progress(&self, progress: BatchProgress) {
        self.progress.lock().expect("sink lock").push(progress);
    }

    fn queue_changed(&self, summary: QueueSummary) {
        // Single-flight must hold in every observable state.
        let active = summary
            .items
            .iter()
            .filter(|i| i.status != ActionStatus::Queued)
            .count();
        assert!(active <= 1, "more than one active action: {summary:?}");
        self.summaries.lock().expect("sink lock").push(summary);
    }
}

pub struct QueueFixture {
    pub queue: WalletActionQueue,
    pub surface: Arc<RecordingSurface>,
    pub sink: Arc<RecordingSink>,
}

pub fn new_queue() -> QueueFixture {
    let surface = Arc::new(RecordingSurface::default());
    let sink = Arc::new(RecordingSink::default());
    let queue = WalletActionQueue::new(
        surface.clone(),
        SurfaceConfig::default(),
        sink.clone(),
    );
    QueueFixture {
        queue,
        surface,
        sink,
    }
}

pub fn meta(title: &str) -> ActionMeta {
    ActionMeta {
        title: title.to_owned(),
        description: None,
        amount: Some("10".to_owned()),
        token_symbol: Some("X".to_owned()),
    }
}

/// Lets spawned tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}
