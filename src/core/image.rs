//! Decoded thumbnail payload and the pluggable decode step.
//!
//! `RasterDecoder` is the default backend (`image` crate, format sniffed from
//! content). Tests and embedders can inject their own `ImageDecoder`.

use log::trace;

use super::error::FetchError;

/// Decoded RGBA8 image kept in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    /// Wrap an RGBA8 buffer. Returns None if the buffer size doesn't match.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self { width, height, pixels })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Memory footprint in bytes (pixel buffer only)
    pub fn mem(&self) -> usize {
        self.pixels.len()
    }
}

/// Raw bytes → decoded image.
///
/// Runs on the transport's thread, never on the delivery context.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, FetchError>;
}

/// Decoder backed by the `image` crate (PNG, JPEG, GIF, WebP, BMP)
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, FetchError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| FetchError::DecodeFailed(format!("Image decode error: {}", e)))?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        trace!("Decoded {}x{} image from {} bytes", width, height, bytes.len());

        DecodedImage::from_rgba8(width, height, rgba.into_raw())
            .ok_or_else(|| FetchError::DecodeFailed("RGBA buffer size mismatch".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let decoded = RasterDecoder.decode(&png_bytes(4, 3)).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.mem(), 4 * 3 * 4);
        assert_eq!(&decoded.pixels()[0..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = RasterDecoder.decode(b"definitely not an image").unwrap_err();
        assert_eq!(err.kind(), "decode");
    }

    #[test]
    fn test_from_rgba8_rejects_bad_size() {
        assert!(DecodedImage::from_rgba8(2, 2, vec![0; 15]).is_none());
        assert!(DecodedImage::from_rgba8(2, 2, vec![0; 16]).is_some());
    }
}
