//! Synthetic frame source (`stub://` URLs).
//!
//! Renders a dark background with one filled magenta square sweeping
//! horizontally across the frame. Used for demos without a camera and for
//! tests. Optionally fails every Nth grab to exercise frame-miss handling.

use std::time::{Duration, Instant};

use crate::frame::{Frame, FrameSource, PixelFormat};

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Source URL, kept for logs (e.g. "stub://front_camera").
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Pace grabs to this rate. Zero means grab returns immediately.
    pub target_fps: u32,
    /// Side length of the rendered target.
    pub target_size: u32,
    /// Horizontal movement per frame.
    pub step: u32,
    /// Fail every Nth grab. Zero disables failures.
    pub fail_every: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 320,
            height: 240,
            target_fps: 0,
            target_size: 40,
            step: 4,
            fail_every: 0,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
    last_grab_at: Option<Instant>,
    last_error: String,
}

const BACKGROUND: [u8; 3] = [40, 30, 20];
const TARGET: [u8; 3] = [255, 0, 255];

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            config.url,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
            last_grab_at: None,
            last_error: String::new(),
        }
    }

    /// Left edge of the target for a given frame number.
    pub fn target_x(&self, frame_number: u64) -> u32 {
        let span = self
            .config
            .width
            .saturating_sub(self.config.target_size)
            .max(1) as u64;
        ((frame_number * self.config.step as u64) % span) as u32
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let interval = Duration::from_millis(1000 / self.config.target_fps as u64);
        if let Some(last) = self.last_grab_at {
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_grab_at = Some(Instant::now());
    }

    fn render(&self, frame: &mut Frame) {
        let (w, h) = (self.config.width, self.config.height);
        frame.resize(w, h, PixelFormat::Bgr8);
        for px in frame.data_mut().chunks_exact_mut(3) {
            px.copy_from_slice(&BACKGROUND);
        }

        let size = self.config.target_size.min(w).min(h);
        let left = self.target_x(self.frame_count);
        let top = (h - size) / 2;
        let data = frame.data_mut();
        for y in top..top + size {
            for x in left..(left + size).min(w) {
                let i = ((y * w + x) * 3) as usize;
                data[i..i + 3].copy_from_slice(&TARGET);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn grab(&mut self, frame: &mut Frame) -> bool {
        self.pace();
        self.frame_count += 1;
        if self.config.fail_every > 0 && self.frame_count % self.config.fail_every == 0 {
            self.last_error = "synthetic timeout".to_string();
            return false;
        }
        self.render(frame);
        true
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyntheticConfig {
        SyntheticConfig {
            url: "stub://test".to_string(),
            width: 64,
            height: 48,
            target_size: 8,
            step: 2,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn renders_target_into_reused_buffer() {
        let mut source = SyntheticSource::new(config());
        let mut frame = Frame::new();

        assert!(source.grab(&mut frame));
        assert_eq!((frame.width(), frame.height()), (64, 48));
        let capacity = frame.capacity();
        let left = source.target_x(1);
        assert_eq!(frame.pixel(left, 24), Some(&TARGET[..]));
        assert_eq!(frame.pixel(63, 0), Some(&BACKGROUND[..]));

        assert!(source.grab(&mut frame));
        assert_eq!(frame.capacity(), capacity);
    }

    #[test]
    fn target_moves_between_frames() {
        let source = SyntheticSource::new(config());
        assert_ne!(source.target_x(1), source.target_x(2));
    }

    #[test]
    fn fails_every_nth_grab() {
        let mut source = SyntheticSource::new(SyntheticConfig {
            fail_every: 3,
            ..config()
        });
        let mut frame = Frame::new();
        let results: Vec<bool> = (0..6).map(|_| source.grab(&mut frame)).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
        assert_eq!(source.last_error(), "synthetic timeout");
    }
}
