//! Frame buffers and the frame source boundary.
//!
//! - `Frame`: a mutable pixel buffer that is allocated once and reused for every grab.
//! - `FrameSource`: anything that can fill a `Frame` on demand (camera, synthetic, test fake).
//!
//! A `Frame` is only meaningful between a successful grab and the next grab call.
//! Sources overwrite the buffer in place and keep its allocation when the
//! dimensions do not change.

use anyhow::{anyhow, Result};

/// Channel layout of a frame buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit blue, green, red (OpenCV layout, camera default).
    #[default]
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Reusable 2-D pixel buffer.
///
/// Owned by exactly one loop context. Nothing in this type is synchronized;
/// sharing a `Frame` between concurrently running cycles is not supported.
#[derive(Debug, Default)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl Frame {
    /// An empty frame. Storage is allocated by the first grab.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-allocate storage for the given dimensions.
    pub fn with_dimensions(width: u32, height: u32, format: PixelFormat) -> Self {
        let mut frame = Self::new();
        frame.resize(width, height, format);
        frame
    }

    /// Wrap existing pixel data, validating its length.
    pub fn from_pixels(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        let expected = byte_len(width, height, format)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
        })
    }

    /// Set the frame geometry, reusing the existing allocation when possible.
    ///
    /// Pixel contents are unspecified after a resize; sources overwrite them.
    pub fn resize(&mut self, width: u32, height: u32, format: PixelFormat) {
        let len = byte_len(width, height, format).unwrap_or(0);
        self.data.resize(len, 0);
        self.width = width;
        self.height = height;
        self.format = format;
    }

    /// Mark the frame as holding no image (zero-length frame).
    pub fn clear(&mut self) {
        self.data.clear();
        self.width = 0;
        self.height = 0;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Allocated capacity in bytes (used to check buffer reuse).
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Move the pixel storage out, leaving the frame empty-bodied until `restore_data`.
    pub(crate) fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    pub(crate) fn restore_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Pixel bytes at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.format.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        self.data.get(offset..offset + channels)
    }
}

fn byte_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(format.channels()))
}

/// Source of frames.
///
/// `grab` blocks until a frame is available or fails fast. On failure the
/// buffer contents are unspecified and `last_error` describes why.
/// Sources must tolerate being polled indefinitely.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Fill `frame` with the next image. Returns false when no frame could be produced.
    fn grab(&mut self, frame: &mut Frame) -> bool;

    /// Description of the most recent grab failure.
    fn last_error(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn grab(&mut self, frame: &mut Frame) -> bool {
        (**self).grab(frame)
    }

    fn last_error(&self) -> String {
        (**self).last_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_reuses_allocation() {
        let mut frame = Frame::with_dimensions(64, 48, PixelFormat::Bgr8);
        let capacity = frame.capacity();
        assert_eq!(frame.data().len(), 64 * 48 * 3);

        frame.resize(64, 48, PixelFormat::Bgr8);
        assert_eq!(frame.capacity(), capacity);

        frame.resize(32, 24, PixelFormat::Bgr8);
        assert_eq!(frame.capacity(), capacity);
        assert_eq!(frame.data().len(), 32 * 24 * 3);
    }

    #[test]
    fn from_pixels_validates_length() {
        assert!(Frame::from_pixels(vec![0u8; 12], 2, 2, PixelFormat::Rgb8).is_ok());
        assert!(Frame::from_pixels(vec![0u8; 11], 2, 2, PixelFormat::Rgb8).is_err());
        assert!(Frame::from_pixels(vec![0u8; 4], 2, 2, PixelFormat::Gray8).is_ok());
    }

    #[test]
    fn cleared_frame_is_empty() {
        let mut frame = Frame::with_dimensions(4, 4, PixelFormat::Gray8);
        assert!(!frame.is_empty());
        frame.clear();
        assert!(frame.is_empty());
        assert_eq!(frame.width(), 0);
        assert!(frame.pixel(0, 0).is_none());
    }

    #[test]
    fn pixel_lookup_is_bounds_checked() {
        let data: Vec<u8> = (0..12).collect();
        let frame = Frame::from_pixels(data, 2, 2, PixelFormat::Bgr8).unwrap();
        assert_eq!(frame.pixel(1, 1), Some(&[9u8, 10, 11][..]));
        assert!(frame.pixel(2, 0).is_none());
    }
}
