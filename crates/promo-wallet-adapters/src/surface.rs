use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use promo_wallet_core::domain::{ScreenBounds, SurfacePlacement, WindowBounds};
use promo_wallet_core::{ApprovalSurface, PortError, SurfaceId};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "surface", rename_all = "snake_case")]
pub enum SurfaceEvent {
    Opened {
        id: SurfaceId,
        placement: SurfacePlacement,
    },
    Focused {
        id: SurfaceId,
    },
    Closed {
        id: SurfaceId,
    },
}

pub type SurfaceListener = Arc<dyn Fn(SurfaceEvent) + Send + Sync>;

#[derive(Debug, Default)]
struct SurfaceState {
    next_id: u64,
    live: HashSet<SurfaceId>,
    focused_window: Option<WindowBounds>,
    history: Vec<SurfaceEvent>,
}

/// Approval surface without a window system. Tracks which surfaces are open and reports
/// every open/focus/close to an optional listener.
#[derive(Clone)]
pub struct HeadlessSurface {
    screen: ScreenBounds,
    state: Arc<Mutex<SurfaceState>>,
    listener: Option<SurfaceListener>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new(ScreenBounds {
            width: 1920,
            height: 1080,
        })
    }
}

impl HeadlessSurface {
    pub fn new(screen: ScreenBounds) -> Self {
        Self {
            screen,
            state: Arc::new(Mutex::new(SurfaceState::default())),
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: SurfaceListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_focused_window(&self, window: Option<WindowBounds>) {
        self.lock().focused_window = window;
    }

    pub fn is_open(&self, id: SurfaceId) -> bool {
        self.lock().live.contains(&id)
    }

    pub fn open_count(&self) -> usize {
        self.lock().live.len()
    }

    pub fn history(&self) -> Vec<SurfaceEvent> {
        self.lock().history.clone()
    }

    /// The user dismissed the window. Returns whether it was open; the caller forwards the
    /// close to the action queue.
    pub fn user_close(&self, id: SurfaceId) -> bool {
        let removed = self.lock().live.remove(&id);
        if removed {
            self.record(SurfaceEvent::Closed { id });
        }
        removed
    }

    fn record(&self, event: SurfaceEvent) {
        debug!(?event, "approval surface");
        self.lock().history.push(event.clone());
        if let Some(listener) = &self.listener {
            listener(event);
        }
    }

    // Each update is a single set/vec operation; a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ApprovalSurface for HeadlessSurface {
    fn focused_window(&self) -> Option<WindowBounds> {
        self.lock().focused_window
    }

    fn screen(&self) -> ScreenBounds {
        self.screen
    }

    fn open(&self, placement: SurfacePlacement) -> Result<SurfaceId, PortError> {
        let id = {
            let mut g = self.lock();
            g.next_id += 1;
            let id = SurfaceId(g.next_id);
            g.live.insert(id);
            id
        };
        self.record(SurfaceEvent::Opened { id, placement });
        Ok(id)
    }

    fn focus(&self, id: SurfaceId) -> Result<bool, PortError> {
        if !self.is_open(id) {
            return Ok(false);
        }
        self.record(SurfaceEvent::Focused { id });
        Ok(true)
    }

    fn close(&self, id: SurfaceId) -> Result<(), PortError> {
        let removed = self.lock().live.remove(&id);
        if removed {
            self.record(SurfaceEvent::Closed { id });
        }
        Ok(())
    }
}
