//! Producing a PNG of whatever the active surface is showing.

mod file;
#[cfg(feature = "xcap-capture")]
mod screen;

use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat};

use crate::bus::SurfaceInfo;

pub use file::FileCapturer;
#[cfg(feature = "xcap-capture")]
pub use screen::XcapCapturer;

/// Larger captures are scaled down before upload.
const MAX_WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 1080;

/// Platform screenshot primitive. Implementations may block; the
/// orchestrator calls them from a blocking task.
pub trait ScreenCapturer: Send + Sync + 'static {
    fn capture(&self, surface: &SurfaceInfo) -> Result<CapturedImage>;
}

#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CapturedImage {
    /// Decode any supported raster, downscale if needed, and normalise to PNG.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes).context("unrecognised image data")?;
        let decoded = image::load_from_memory_with_format(bytes, format)
            .context("failed to decode captured image")?;

        let (width, height) = decoded.dimensions();
        if format == ImageFormat::Png && width <= MAX_WIDTH && height <= MAX_HEIGHT {
            return Ok(Self {
                png: bytes.to_vec(),
                width,
                height,
            });
        }

        Self::from_image(decoded)
    }

    pub fn from_rgba(width: u32, height: u32, raw: Vec<u8>) -> Result<Self> {
        let buffer = image::RgbaImage::from_raw(width, height, raw)
            .ok_or_else(|| anyhow!("raw buffer does not match {width}x{height} RGBA"))?;
        Self::from_image(DynamicImage::ImageRgba8(buffer))
    }

    fn from_image(image: DynamicImage) -> Result<Self> {
        let image = downscale(image);
        let (width, height) = image.dimensions();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode PNG")?;

        Ok(Self { png, width, height })
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:image/png;base64,{}", BASE64.encode(&self.png))
    }
}

fn downscale(image: DynamicImage) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= MAX_WIDTH && height <= MAX_HEIGHT {
        return image;
    }

    let scale = (MAX_WIDTH as f64 / width as f64).min(MAX_HEIGHT as f64 / height as f64);
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Stand-in when no capture backend was compiled in.
pub struct NoCaptureBackend;

impl ScreenCapturer for NoCaptureBackend {
    fn capture(&self, _surface: &SurfaceInfo) -> Result<CapturedImage> {
        Err(anyhow!(
            "no screen capture backend available; pass --image or build with the xcap-capture feature"
        ))
    }
}

/// The best capturer for this build.
pub fn default_capturer() -> Box<dyn ScreenCapturer> {
    #[cfg(feature = "xcap-capture")]
    {
        Box::new(XcapCapturer)
    }

    #[cfg(not(feature = "xcap-capture"))]
    {
        Box::new(NoCaptureBackend)
    }
}

#[cfg(test)]
pub(crate) fn solid_png(width: u32, height: u32) -> Vec<u8> {
    let buffer = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 90, 200, 255]));
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(buffer)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}
