use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;
use xcap::Monitor;

/// Absolute screen rectangle in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl ScreenRegion {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.top as i64 + self.height as i64
    }

    /// True when `other` is non-empty and lies completely inside `self`.
    pub fn contains_region(&self, other: &ScreenRegion) -> bool {
        other.width > 0
            && other.height > 0
            && other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// Screen coordinate to click at, before any configured offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickTarget {
    pub x: i32,
    pub y: i32,
}

impl ClickTarget {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shift by `(dx, dy)`. `None` if either axis overflows `i32`.
    pub fn translate(self, dx: i32, dy: i32) -> Option<Self> {
        Some(Self {
            x: self.x.checked_add(dx)?,
            y: self.y.checked_add(dy)?,
        })
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no monitor available for capture")]
    NoMonitor,
    #[error("region {0:?} lies outside every monitor")]
    OutsideMonitors(ScreenRegion),
    #[error("screen capture failed: {0}")]
    Backend(#[from] xcap::XCapError),
}

/// Source of fresh screen pixels. Every call re-captures; nothing is cached.
pub trait ScreenSource {
    fn capture(&self, region: Option<&ScreenRegion>) -> Result<RgbaImage, CaptureError>;
}

/// Geometry of one monitor, in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorBounds {
    pub bounds: ScreenRegion,
    pub primary: bool,
}

/// Pick the monitor to capture from and the rectangle to keep, relative to
/// that monitor's origin.
///
/// Without a region the primary monitor (or the first one, if none reports
/// itself as primary) is used in full. A region must fit entirely inside a
/// single monitor.
pub fn resolve_region(
    monitors: &[MonitorBounds],
    region: Option<&ScreenRegion>,
) -> Result<(usize, ScreenRegion), CaptureError> {
    if monitors.is_empty() {
        return Err(CaptureError::NoMonitor);
    }

    match region {
        None => {
            let idx = monitors.iter().position(|m| m.primary).unwrap_or(0);
            let b = monitors[idx].bounds;
            Ok((idx, ScreenRegion::new(0, 0, b.width, b.height)))
        }
        Some(r) => {
            let idx = monitors
                .iter()
                .position(|m| m.bounds.contains_region(r))
                .ok_or(CaptureError::OutsideMonitors(*r))?;
            let b = monitors[idx].bounds;
            Ok((
                idx,
                ScreenRegion::new(r.left - b.left, r.top - b.top, r.width, r.height),
            ))
        }
    }
}

/// Crop a pixel rectangle from a captured frame, clamped to the frame bounds.
pub fn crop_region(frame: &RgbaImage, region: &ScreenRegion) -> RgbaImage {
    let (w, h) = (frame.width(), frame.height());
    let x = (region.left.max(0) as u32).min(w.saturating_sub(1));
    let y = (region.top.max(0) as u32).min(h.saturating_sub(1));
    let rw = region.width.min(w - x);
    let rh = region.height.min(h - y);

    image::imageops::crop_imm(frame, x, y, rw, rh).to_image()
}

/// Captures monitors through `xcap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

fn monitor_bounds(monitor: &Monitor) -> Result<MonitorBounds, xcap::XCapError> {
    Ok(MonitorBounds {
        bounds: ScreenRegion::new(
            monitor.x()?,
            monitor.y()?,
            monitor.width()?,
            monitor.height()?,
        ),
        primary: monitor.is_primary()?,
    })
}

impl ScreenSource for XcapScreen {
    fn capture(&self, region: Option<&ScreenRegion>) -> Result<RgbaImage, CaptureError> {
        let started = Instant::now();
        let monitors = Monitor::all()?;
        let bounds = monitors
            .iter()
            .map(monitor_bounds)
            .collect::<Result<Vec<_>, _>>()?;

        let (idx, relative) = resolve_region(&bounds, region)?;
        let frame = monitors[idx].capture_image()?;

        let frame = match region {
            Some(_) => crop_region(&frame, &relative),
            None => frame,
        };

        debug!(
            "Captured {}x{} from monitor {} in {:?}",
            frame.width(),
            frame.height(),
            idx,
            started.elapsed()
        );
        Ok(frame)
    }
}
