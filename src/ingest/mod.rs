//! Frame sources.
//!
//! - `stub://...` URLs: synthetic frames (tests, demos without hardware)
//! - `/dev/video*` paths: USB/V4L2 devices (feature: ingest-v4l2)
//!
//! The camera is opened once. The detection pipeline and the annotator grab
//! through clones of one `SharedSource`, so their two grabs per cycle are
//! consecutive frames of the same stream.

pub mod shared;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::FrameSource;

pub use shared::SharedSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Open a frame source for the configured camera URL.
pub fn open_source(settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            url: settings.url.clone(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
            fail_every: settings.fail_every,
            ..SyntheticConfig::default()
        })));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let device = settings
            .url
            .strip_prefix("v4l2://")
            .unwrap_or(&settings.url)
            .to_string();
        let mut source = V4l2Source::new(V4l2Config {
            device,
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        });
        source.connect()?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!(
            "camera {} requires the ingest-v4l2 feature (only stub:// is built in)",
            settings.url
        )
    }
}
