use anyhow::{anyhow, Result};

use crate::bus::SurfaceInfo;

use super::{CapturedImage, ScreenCapturer};

/// Grabs the window whose title matches the active surface, falling back to
/// the primary monitor.
pub struct XcapCapturer;

impl ScreenCapturer for XcapCapturer {
    fn capture(&self, surface: &SurfaceInfo) -> Result<CapturedImage> {
        if !surface.title.is_empty() {
            let windows = xcap::Window::all().map_err(|e| anyhow!("window list: {e}"))?;
            if let Some(window) = windows
                .into_iter()
                .find(|w| !w.is_minimized() && w.title().contains(&surface.title))
            {
                let img = window
                    .capture_image()
                    .map_err(|e| anyhow!("window capture: {e}"))?;
                let (width, height) = (img.width(), img.height());
                return CapturedImage::from_rgba(width, height, img.into_raw());
            }
        }

        let (width, height, raw) = capture_primary_monitor_raw()?;
        CapturedImage::from_rgba(width, height, raw)
    }
}

fn capture_primary_monitor_raw() -> Result<(u32, u32, Vec<u8>)> {
    let monitors = xcap::Monitor::all().map_err(|e| anyhow!("monitor list: {e}"))?;
    let mut monitors = monitors.into_iter();
    let first = monitors.next().ok_or_else(|| anyhow!("no monitor found"))?;
    let primary = if first.is_primary() {
        first
    } else {
        monitors.find(|m| m.is_primary()).unwrap_or(first)
    };

    let img = primary
        .capture_image()
        .map_err(|e| anyhow!("monitor capture: {e}"))?;
    Ok((img.width(), img.height(), img.into_raw()))
}
