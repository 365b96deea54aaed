use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::bus::SurfaceInfo;

use super::{CapturedImage, ScreenCapturer};

/// Reads the "screen" from an image file on every capture, so a file that is
/// rewritten between triggers yields a fresh capture each time.
pub struct FileCapturer {
    path: PathBuf,
}

impl FileCapturer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScreenCapturer for FileCapturer {
    fn capture(&self, surface: &SurfaceInfo) -> Result<CapturedImage> {
        log::debug!(
            "capturing surface '{}' from {}",
            surface.title,
            self.path.display()
        );
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        CapturedImage::from_encoded(&bytes)
    }
}
