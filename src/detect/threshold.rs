use anyhow::Result;
use serde::Deserialize;

use crate::detect::pipeline::VisionPipeline;
use crate::detect::result::DetectionResult;
use crate::frame::{Frame, PixelFormat};
use crate::geometry::{Contour, Point};

/// Inclusive per-channel color range, channels in blue, green, red order.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    fn contains(&self, bgr: [u8; 3]) -> bool {
        (0..3).all(|c| bgr[c] >= self.lower[c] && bgr[c] <= self.upper[c])
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdSettings {
    pub range: ColorRange,
    /// Components smaller than this many pixels are discarded.
    pub min_area: usize,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        // Saturated magenta-ish targets; tuned for the synthetic source.
        Self {
            range: ColorRange {
                lower: [200, 0, 200],
                upper: [255, 80, 255],
            },
            min_area: 16,
        }
    }
}

/// Reference pipeline: color threshold followed by 4-connected component labelling.
///
/// Candidates are ordered by their first pixel in raster order (top to bottom,
/// left to right). Each candidate is the full set of pixels in the component.
pub struct ColorThresholdPipeline {
    settings: ThresholdSettings,
    mask: Vec<bool>,
    visited: Vec<bool>,
    stack: Vec<(u32, u32)>,
}

impl ColorThresholdPipeline {
    pub fn new(settings: ThresholdSettings) -> Self {
        Self {
            settings,
            mask: Vec::new(),
            visited: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn settings(&self) -> &ThresholdSettings {
        &self.settings
    }

    fn build_mask(&mut self, frame: &Frame) {
        let pixels = (frame.width() as usize) * (frame.height() as usize);
        let channels = frame.format().channels();
        self.mask.clear();
        self.mask.reserve(pixels);
        for px in frame.data().chunks_exact(channels).take(pixels) {
            let bgr = match frame.format() {
                PixelFormat::Bgr8 => [px[0], px[1], px[2]],
                PixelFormat::Rgb8 => [px[2], px[1], px[0]],
                PixelFormat::Gray8 => [px[0], px[0], px[0]],
            };
            self.mask.push(self.settings.range.contains(bgr));
        }
        self.visited.clear();
        self.visited.resize(self.mask.len(), false);
    }

    fn flood(&mut self, start: (u32, u32), width: u32, height: u32) -> Contour {
        let mut component = Vec::new();
        self.stack.clear();
        self.stack.push(start);
        self.visited[(start.1 * width + start.0) as usize] = true;

        while let Some((x, y)) = self.stack.pop() {
            component.push(Point::new(x as i32, y as i32));
            let neighbours = [
                (x.wrapping_sub(1), y),
                (x + 1, y),
                (x, y.wrapping_sub(1)),
                (x, y + 1),
            ];
            for (nx, ny) in neighbours {
                if nx >= width || ny >= height {
                    continue;
                }
                let idx = (ny * width + nx) as usize;
                if self.mask[idx] && !self.visited[idx] {
                    self.visited[idx] = true;
                    self.stack.push((nx, ny));
                }
            }
        }
        component
    }
}

impl Default for ColorThresholdPipeline {
    fn default() -> Self {
        Self::new(ThresholdSettings::default())
    }
}

impl VisionPipeline for ColorThresholdPipeline {
    fn name(&self) -> &'static str {
        "color-threshold"
    }

    fn process(&mut self, frame: &Frame) -> Result<DetectionResult> {
        if frame.is_empty() {
            return Ok(DetectionResult::default());
        }
        self.build_mask(frame);

        let (width, height) = (frame.width(), frame.height());
        let mut candidates = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let idx = (y * width + x) as usize;
                if !self.mask[idx] || self.visited[idx] {
                    continue;
                }
                let component = self.flood((x, y), width, height);
                if component.len() >= self.settings.min_area {
                    candidates.push(component);
                }
            }
        }
        Ok(DetectionResult::new(candidates))
    }
}
