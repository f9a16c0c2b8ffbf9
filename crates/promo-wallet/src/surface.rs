use std::sync::Arc;

use promo_wallet_adapters::HeadlessSurface;
use promo_wallet_core::domain::ScreenBounds;

use crate::bridge::{HostMessage, Outbox};

/// Approval surface whose open/focus/close calls are relayed to the host, which owns the
/// real window.
pub fn relayed_surface(screen: ScreenBounds, out: Outbox) -> HeadlessSurface {
    HeadlessSurface::new(screen).with_listener(Arc::new(move |event| {
        // Host gone means the process is shutting down.
        let _ = out.send(HostMessage::Surface(event));
    }))
}
