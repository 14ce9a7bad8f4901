//! V4L2 frame source.
//!
//! Captures RGB24 frames from a local device node (e.g. /dev/video0) into the
//! caller's reusable `Frame`. Capture errors are recorded and reported through
//! `last_error`; the device is reopened on the next grab after a failure.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use crate::frame::{Frame, FrameSource, PixelFormat};

/// Configuration for a V4L2 source.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for V4l2Config {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 30,
            width: 320,
            height: 240,
        }
    }
}

pub struct V4l2Source {
    config: V4l2Config,
    state: Option<DeviceState>,
    last_error: String,
    active_width: u32,
    active_height: u32,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            last_error: String::new(),
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            return Err(anyhow!(
                "v4l2 device {} does not support RGB3 capture",
                self.config.device
            ));
        }

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn capture_into(&mut self, frame: &mut Frame) -> Result<()> {
        use v4l::io::traits::CaptureStream;

        if self.state.is_none() {
            self.connect()?;
        }
        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .context("capture v4l2 frame")?;

        frame.resize(self.active_width, self.active_height, PixelFormat::Rgb8);
        if buf.len() < frame.data().len() {
            return Err(anyhow!(
                "short v4l2 frame: expected {} bytes, got {}",
                frame.data().len(),
                buf.len()
            ));
        }
        let len = frame.data().len();
        frame.data_mut().copy_from_slice(&buf[..len]);
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn grab(&mut self, frame: &mut Frame) -> bool {
        match self.capture_into(frame) {
            Ok(()) => true,
            Err(err) => {
                self.last_error = format!("{:#}", err);
                self.state = None;
                frame.clear();
                false
            }
        }
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}
