use crate::error::SignatureError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageBuffer, ImageFormat, Rgba, RgbaImage};
use std::fs;
use std::path::Path;

pub const CANVAS_WIDTH: u32 = 700;
pub const CANVAS_HEIGHT: u32 = 180;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// A captured drawing surface: a fixed 700x180 RGBA buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    pixels: RgbaImage,
}

impl SignatureImage {
    pub fn blank() -> Self {
        SignatureImage {
            pixels: ImageBuffer::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, TRANSPARENT),
        }
    }

    pub fn from_rgba(pixels: RgbaImage) -> Result<Self, SignatureError> {
        let (width, height) = pixels.dimensions();
        if (width, height) != (CANVAS_WIDTH, CANVAS_HEIGHT) {
            return Err(SignatureError::Dimensions {
                width,
                height,
                expected_width: CANVAS_WIDTH,
                expected_height: CANVAS_HEIGHT,
            });
        }
        Ok(SignatureImage { pixels })
    }

    pub fn from_png_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
        Self::from_rgba(decoded.to_rgba8())
    }

    /// Sum of every channel of every pixel, alpha included.
    pub fn pixel_sum(&self) -> u64 {
        self.pixels.as_raw().iter().map(|&channel| u64::from(channel)).sum()
    }

    /// A stray single pixel is enough to count as signed.
    pub fn is_blank(&self) -> bool {
        self.pixel_sum() == 0
    }

    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Anything that can hand over the current contents of a drawing surface.
pub trait SignatureSource {
    fn capture(&self) -> Result<SignatureImage, SignatureError>;
}

/// A canvas export as sent by the browser (`canvas.toDataURL("image/png")`).
/// An empty string means the surface was never touched.
#[derive(Debug, Clone, Copy)]
pub struct DataUrl<'a>(pub &'a str);

impl SignatureSource for DataUrl<'_> {
    fn capture(&self) -> Result<SignatureImage, SignatureError> {
        let url = self.0.trim();
        if url.is_empty() {
            return Ok(SignatureImage::blank());
        }
        let encoded = url
            .strip_prefix(PNG_DATA_URL_PREFIX)
            .ok_or(SignatureError::NotDataUrl)?;
        let bytes = STANDARD.decode(encoded)?;
        SignatureImage::from_png_bytes(&bytes)
    }
}

/// A PNG exported from a drawing surface and saved to disk.
#[derive(Debug, Clone, Copy)]
pub struct PngFile<'a>(pub &'a Path);

impl SignatureSource for PngFile<'_> {
    fn capture(&self) -> Result<SignatureImage, SignatureError> {
        let bytes = fs::read(self.0)?;
        SignatureImage::from_png_bytes(&bytes)
    }
}

impl SignatureSource for SignatureImage {
    fn capture(&self) -> Result<SignatureImage, SignatureError> {
        Ok(self.clone())
    }
}
