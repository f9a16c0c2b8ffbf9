use crate::domain::{ScreenBounds, SurfacePlacement, WindowBounds};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub top_offset: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 380,
            height: 640,
            margin: 20,
            top_offset: 80,
        }
    }
}

/// Right-aligns the approval window inside the focused browser window, or on the screen
/// when no window reference is available.
pub fn place_surface(
    focused: Option<WindowBounds>,
    screen: ScreenBounds,
    config: &SurfaceConfig,
) -> SurfacePlacement {
    let inset = (config.width + config.margin) as i64;
    let (left, top) = match focused {
        Some(window) => (
            window.left as i64 + window.width as i64 - inset,
            window.top as i64 + config.top_offset as i64,
        ),
        None => (screen.width as i64 - inset, config.top_offset as i64),
    };
    SurfacePlacement {
        left: clamp_coord(left),
        top: clamp_coord(top),
        width: config.width,
        height: config.height,
    }
}

fn clamp_coord(v: i64) -> i32 {
    v.clamp(0, i32::MAX as i64) as i32
}
