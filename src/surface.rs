//! Capture surface binding
//!
//! Tracks the one live rendering surface of the hosting UI and keeps it
//! connected to whichever camera the session currently has open. The binding
//! never opens or releases a camera itself; it only binds, starts and stops
//! the preview stream on the device it is handed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::device::CameraDevice;
use crate::profile::Size;

/// Distance between the rendering area's bottom edge and the controls
pub const CONTROL_MARGIN: u32 = 80;

/// Opaque token identifying a platform rendering surface
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceHandle(Uuid);

impl SurfaceHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for SurfaceHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// On-screen placement of the preview and the controls anchored below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewLayout {
    /// Area the camera frames are rendered into, centred in the viewport
    pub render: Rect,
    /// Bottom margin for the record/stop/cancel/switch controls
    pub controls_bottom_margin: u32,
}

/// Fit `preview` into `viewport` without distortion.
///
/// `rotation` is the display rotation applied to camera frames; at 90° or
/// 270° the frame's width and height swap before the ratio is computed.
pub fn compute_layout(viewport: Size, preview: Size, rotation: u32) -> PreviewLayout {
    let oriented = if rotation % 180 == 90 {
        preview.transposed()
    } else {
        preview
    };

    let (width, height) = if viewport.width == 0 || viewport.height == 0 || oriented.height == 0 {
        (viewport.width, viewport.height)
    } else {
        let (pw, ph) = (oriented.width as u64, oriented.height as u64);
        let (vw, vh) = (viewport.width as u64, viewport.height as u64);
        if pw * vh > vw * ph {
            // Preview is wider: fill the width
            let height = (vw * ph / pw) as u32;
            (viewport.width, height.min(viewport.height))
        } else {
            // Preview is taller: fill the height
            let width = (vh * pw / ph) as u32;
            (width.min(viewport.width), viewport.height)
        }
    };

    let vertical_gap = (viewport.height - height) / 2;

    PreviewLayout {
        render: Rect {
            x: (viewport.width - width) / 2,
            y: vertical_gap,
            width,
            height,
        },
        controls_bottom_margin: CONTROL_MARGIN.max(vertical_gap + CONTROL_MARGIN),
    }
}

/// Live connection between the UI's rendering surface and the camera
#[derive(Debug, Default)]
pub struct SurfaceBinding {
    surface: Option<SurfaceHandle>,
    viewport: Option<Size>,
    layout: Option<PreviewLayout>,
}

impl SurfaceBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface(&self) -> Option<&SurfaceHandle> {
        self.surface.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.surface.is_some()
    }

    pub fn layout(&self) -> Option<PreviewLayout> {
        self.layout
    }

    /// Surface became available; bind it to `camera` if one is open
    pub fn surface_ready(
        &mut self,
        surface: SurfaceHandle,
        camera: Option<&mut dyn CameraDevice>,
    ) -> Result<()> {
        info!("Preview surface ready: {}", surface.id());
        self.surface = Some(surface);

        match camera {
            Some(camera) => {
                self.bind(camera)?;
            }
            None => debug!("No camera open yet, surface binding is inert"),
        }

        Ok(())
    }

    /// Bind the tracked surface to `camera` and start the preview stream.
    ///
    /// Returns `false` when there is no surface yet.
    pub fn bind(&self, camera: &mut dyn CameraDevice) -> Result<bool> {
        let Some(surface) = &self.surface else {
            return Ok(false);
        };

        camera
            .set_preview_surface(surface)
            .context("Failed to attach preview surface")?;
        camera.start_preview().context("Failed to start preview")?;

        debug!("Preview bound to {:?} camera", camera.facing());
        Ok(true)
    }

    /// Surface changed size; recompute the placement for `preview`
    pub fn surface_resized(
        &mut self,
        width: u32,
        height: u32,
        preview: Option<Size>,
        rotation: u32,
    ) -> Option<PreviewLayout> {
        self.viewport = Some(Size::new(width, height));
        self.relayout(preview, rotation)
    }

    /// Recompute the placement after the preview size changed
    pub fn relayout(&mut self, preview: Option<Size>, rotation: u32) -> Option<PreviewLayout> {
        self.layout = match (self.viewport, preview) {
            (Some(viewport), Some(preview)) => Some(compute_layout(viewport, preview, rotation)),
            _ => None,
        };
        self.layout
    }

    /// Surface went away: stop the preview stream but keep the camera
    pub fn surface_destroyed(&mut self, camera: Option<&mut dyn CameraDevice>) {
        if let Some(camera) = camera {
            camera.stop_preview();
        }

        info!("Preview surface destroyed");
        self.surface = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_portrait_layout_swaps_preview_dimensions() {
        // 1920x1080 sensor frames rotated into a 1080x2400 portrait screen
        let layout = compute_layout(Size::new(1080, 2400), Size::new(1920, 1080), 90);

        assert_eq!(layout.render.width, 1080);
        assert_eq!(layout.render.height, 1080 * 1920 / 1080);
        assert_eq!(layout.render.x, 0);
        assert_eq!(layout.render.y, (2400 - 1920) / 2);
        assert_eq!(layout.controls_bottom_margin, 240 + CONTROL_MARGIN);
    }

    #[test]
    fn test_landscape_layout_fills_height() {
        let layout = compute_layout(Size::new(2400, 1080), Size::new(1440, 1080), 0);

        assert_eq!(layout.render.height, 1080);
        assert_eq!(layout.render.width, 1440);
        assert_eq!(layout.render.x, (2400 - 1440) / 2);
        assert_eq!(layout.controls_bottom_margin, CONTROL_MARGIN);
    }

    #[test]
    fn test_degenerate_viewport_uses_whole_surface() {
        let layout = compute_layout(Size::new(0, 0), Size::new(1920, 1080), 90);
        assert_eq!(layout.render.width, 0);
        assert_eq!(layout.controls_bottom_margin, CONTROL_MARGIN);
    }

    #[test]
    fn test_relayout_needs_viewport_and_preview() {
        let mut binding = SurfaceBinding::new();
        assert!(binding.relayout(Some(Size::new(1280, 720)), 90).is_none());

        assert!(binding.surface_resized(720, 1280, None, 90).is_none());
        let layout = binding.relayout(Some(Size::new(1280, 720)), 90).unwrap();
        assert_eq!(layout.render.width, 720);
        assert_eq!(layout.render.height, 1280);
    }
}
