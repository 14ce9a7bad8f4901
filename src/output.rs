//! Output video sinks.
//!
//! The annotator forwards every drawn frame to a `VideoSink`. The bundled
//! `LatestFrameSink` keeps only the most recent frame, JPEG-encoded, for the
//! stream server to hand out to dashboards.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use crate::frame::{Frame, PixelFormat};

/// Destination for annotated frames.
///
/// `put_frame` must not block for long; the consumer loop calls it inline.
pub trait VideoSink: Send {
    fn put_frame(&mut self, frame: &Frame) -> Result<()>;
}

impl<S: VideoSink + ?Sized> VideoSink for Box<S> {
    fn put_frame(&mut self, frame: &Frame) -> Result<()> {
        (**self).put_frame(frame)
    }
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink;

impl VideoSink for NullSink {
    fn put_frame(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

pub const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Default)]
struct LatestState {
    jpeg: Option<Arc<Vec<u8>>>,
    sequence: u64,
}

/// Shared slot holding the most recent encoded frame.
///
/// Clones share the slot: the annotator writes through one clone while the
/// stream server reads through another.
#[derive(Clone)]
pub struct LatestFrameSink {
    shared: Arc<(Mutex<LatestState>, Condvar)>,
    quality: u8,
    scratch: Vec<u8>,
}

impl LatestFrameSink {
    pub fn new(quality: u8) -> Self {
        Self {
            shared: Arc::new((Mutex::new(LatestState::default()), Condvar::new())),
            quality: quality.clamp(1, 100),
            scratch: Vec::new(),
        }
    }

    /// Most recent frame and its sequence number.
    pub fn latest(&self) -> Option<(u64, Arc<Vec<u8>>)> {
        let state = self.shared.0.lock().ok()?;
        state.jpeg.clone().map(|jpeg| (state.sequence, jpeg))
    }

    /// Number of frames received so far.
    pub fn sequence(&self) -> u64 {
        self.shared.0.lock().map(|s| s.sequence).unwrap_or(0)
    }

    /// Wait until a frame newer than `after` arrives or the timeout elapses.
    pub fn wait_newer(&self, after: u64, timeout: Duration) -> Option<(u64, Arc<Vec<u8>>)> {
        let (lock, cvar) = &*self.shared;
        let guard = lock.lock().ok()?;
        let (state, _timeout) = cvar
            .wait_timeout_while(guard, timeout, |state| state.sequence <= after)
            .ok()?;
        if state.sequence <= after {
            return None;
        }
        state.jpeg.clone().map(|jpeg| (state.sequence, jpeg))
    }

    fn encode(&mut self, frame: &Frame) -> Result<Vec<u8>> {
        let (pixels, color) = match frame.format() {
            PixelFormat::Rgb8 => (frame.data(), ExtendedColorType::Rgb8),
            PixelFormat::Gray8 => (frame.data(), ExtendedColorType::L8),
            PixelFormat::Bgr8 => {
                self.scratch.clear();
                for px in frame.data().chunks_exact(3) {
                    self.scratch.extend_from_slice(&[px[2], px[1], px[0]]);
                }
                (&self.scratch[..], ExtendedColorType::Rgb8)
            }
        };
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(pixels, frame.width(), frame.height(), color)
            .context("encode frame as jpeg")?;
        Ok(out)
    }
}

impl Default for LatestFrameSink {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl VideoSink for LatestFrameSink {
    fn put_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.is_empty() {
            return Err(anyhow!("refusing to publish an empty frame"));
        }
        let jpeg = Arc::new(self.encode(frame)?);
        let (lock, cvar) = &*self.shared;
        let mut state = lock
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        state.jpeg = Some(jpeg);
        state.sequence += 1;
        cvar.notify_all();
        Ok(())
    }
}
