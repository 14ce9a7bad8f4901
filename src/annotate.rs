//! Target annotation.
//!
//! For every detection the annotator grabs its own frame, reports the
//! rectangle (log line + telemetry), draws the outline and forwards the frame
//! to the output sink. A failed grab aborts the cycle before any side effect
//! other than the error log line.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Luma, Pixel, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::frame::{Frame, FrameSource, PixelFormat};
use crate::geometry::BoundingBox;
use crate::output::VideoSink;
use crate::telemetry::{TelemetryPublisher, TelemetryStore};

/// Outline color (blue, green, red order) and border thickness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RectStyle {
    pub color: [u8; 3],
    pub thickness: u32,
}

impl Default for RectStyle {
    fn default() -> Self {
        Self {
            color: [255, 0, 255],
            thickness: 4,
        }
    }
}

/// Outcome of one annotation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Annotation {
    Drawn,
    FrameUnavailable,
}

pub struct Annotator<S, O, T> {
    input: S,
    output: O,
    publisher: TelemetryPublisher<T>,
    style: RectStyle,
    frame: Frame,
}

impl<S, O, T> Annotator<S, O, T>
where
    S: FrameSource,
    O: VideoSink,
    T: TelemetryStore,
{
    pub fn new(input: S, output: O, publisher: TelemetryPublisher<T>, style: RectStyle) -> Self {
        Self {
            input,
            output,
            publisher,
            style,
            frame: Frame::new(),
        }
    }

    /// Grab a frame, publish `rect`, draw it and forward the frame.
    pub fn draw_rect_on_object(&mut self, rect: &BoundingBox) -> Annotation {
        if !self.input.grab(&mut self.frame) || self.frame.is_empty() {
            log::warn!("error grabbing frame '{}'", self.input.last_error());
            return Annotation::FrameUnavailable;
        }

        let top_left = rect.tl();
        let bottom_right = rect.br();
        let width = (i64::from(bottom_right.x) - i64::from(top_left.x)) as f64;
        let height = (i64::from(bottom_right.y) - i64::from(top_left.y)) as f64;

        log::info!(
            "draw rect at ({}, {}) with dimensions ({:.6}, {:.6})",
            top_left.x,
            top_left.y,
            width,
            height
        );

        self.publisher.publish(rect);

        if let Err(err) = draw_rect(&mut self.frame, rect, &self.style) {
            log::warn!("failed to draw target outline: {}", err);
        }

        if let Err(err) = self.output.put_frame(&self.frame) {
            log::warn!("failed to forward annotated frame: {}", err);
        }
        Annotation::Drawn
    }
}

/// Draw a hollow rectangle through the corner pixels `tl()` and `br()`.
///
/// The border is `style.thickness` pixels wide and centered on the outline;
/// anything outside the frame is clipped.
pub fn draw_rect(frame: &mut Frame, rect: &BoundingBox, style: &RectStyle) -> Result<()> {
    if frame.is_empty() || style.thickness == 0 {
        return Ok(());
    }
    let (w, h) = (frame.width(), frame.height());
    let [b, g, r] = style.color;
    let data = frame.take_data();
    let drawn = match frame.format() {
        PixelFormat::Bgr8 => draw_on(data, w, h, rect, style.thickness, Rgb([b, g, r])),
        PixelFormat::Rgb8 => draw_on(data, w, h, rect, style.thickness, Rgb([r, g, b])),
        PixelFormat::Gray8 => draw_on(data, w, h, rect, style.thickness, Luma([b])),
    };
    match drawn {
        Some(data) => {
            frame.restore_data(data);
            Ok(())
        }
        None => {
            frame.clear();
            Err(anyhow!("frame buffer does not match its {}x{} geometry", w, h))
        }
    }
}

fn draw_on<P>(
    data: Vec<u8>,
    width: u32,
    height: u32,
    rect: &BoundingBox,
    thickness: u32,
    color: P,
) -> Option<Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let mut image: ImageBuffer<P, Vec<u8>> = ImageBuffer::from_raw(width, height, data)?;
    let (frame_w, frame_h) = (i64::from(width), i64::from(height));
    let thickness = i64::from(thickness);
    let outer = thickness / 2;
    let (x, y) = (i64::from(rect.x), i64::from(rect.y));
    let (right, bottom) = (x + i64::from(rect.width), y + i64::from(rect.height));
    for ring in -outer..thickness - outer {
        let (left, top) = (x + ring, y + ring);
        let (ring_right, ring_bottom) = (right - ring, bottom - ring);
        if ring_right < left || ring_bottom < top {
            continue;
        }
        // Edges beyond the frame are pulled to just outside it, where nothing is drawn.
        let left = left.clamp(-1, frame_w);
        let top = top.clamp(-1, frame_h);
        let ring_right = ring_right.clamp(-1, frame_w);
        let ring_bottom = ring_bottom.clamp(-1, frame_h);
        let outline = Rect::at(left as i32, top as i32)
            .of_size((ring_right - left + 1) as u32, (ring_bottom - top + 1) as u32);
        draw_hollow_rect_mut(&mut image, outline, color);
    }
    Some(image.into_raw())
}
