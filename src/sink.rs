//! Presentation sinks for finished rasters.
//!
//! A sink is configured once per output geometry and then receives one
//! planar 4:2:0 frame per `present` call as a single atomic write. The
//! virtual-camera implementation is feature-gated; `NullSink` stands in for
//! tests and dry runs.

use crate::error::{RelayError, Result};
use crate::raster::Geometry;

pub trait FrameSink: Send {
    /// Configures the sink for a new output geometry. Called once per
    /// geometry, and again only if the geometry changes mid-session.
    fn configure(&mut self, geometry: Geometry) -> Result<()>;

    /// Writes one planar 4:2:0 frame. `data` must be exactly
    /// `geometry.frame_len()` bytes for the configured geometry.
    fn present(&mut self, data: &[u8]) -> Result<()>;
}

/// Counting sink that validates frame sizes and discards the bytes.
pub struct NullSink {
    geometry: Option<Geometry>,
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            geometry: None,
            frames: 0,
        }
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSink for NullSink {
    fn configure(&mut self, geometry: Geometry) -> Result<()> {
        self.geometry = Some(geometry);
        Ok(())
    }

    fn present(&mut self, data: &[u8]) -> Result<()> {
        let geometry = self
            .geometry
            .ok_or_else(|| RelayError::sink("sink not configured", None))?;
        if data.len() != geometry.frame_len() {
            return Err(RelayError::sink(
                format!(
                    "frame is {} bytes, expected {} for {}",
                    data.len(),
                    geometry.frame_len(),
                    geometry
                ),
                None,
            ));
        }
        self.frames += 1;
        Ok(())
    }
}

#[cfg(feature = "sink-v4l2")]
pub mod v4l2 {
    //! Virtual-camera sink backed by a v4l2loopback output device.

    use std::io::Write;

    use v4l::video::Output;
    use v4l::{Device, Format, FourCC};

    use super::FrameSink;
    use crate::error::{RelayError, Result};
    use crate::raster::Geometry;

    /// Planar YUV 4:2:0 fourcc.
    const YUV420: &[u8; 4] = b"YU12";

    pub struct V4l2Sink {
        device: Device,
        path: String,
        geometry: Option<Geometry>,
    }

    impl V4l2Sink {
        pub fn open(path: &str) -> Result<Self> {
            let device = Device::with_path(path).map_err(|e| {
                RelayError::sink(format!("open output device {}", path), Some(e))
            })?;
            log::info!("opened output device {}", path);
            Ok(Self {
                device,
                path: path.to_string(),
                geometry: None,
            })
        }
    }

    impl FrameSink for V4l2Sink {
        fn configure(&mut self, geometry: Geometry) -> Result<()> {
            let format = Format::new(geometry.width(), geometry.height(), FourCC::new(YUV420));
            let applied = self.device.set_format(&format).map_err(|e| {
                RelayError::sink(format!("set format on {}", self.path), Some(e))
            })?;
            if applied.width != geometry.width()
                || applied.height != geometry.height()
                || applied.fourcc != FourCC::new(YUV420)
            {
                return Err(RelayError::sink(
                    format!(
                        "device {} refused {} yuv420 (got {}x{} {})",
                        self.path, geometry, applied.width, applied.height, applied.fourcc
                    ),
                    None,
                ));
            }
            log::info!("output device {} configured for {}", self.path, geometry);
            self.geometry = Some(geometry);
            Ok(())
        }

        fn present(&mut self, data: &[u8]) -> Result<()> {
            let geometry = self
                .geometry
                .ok_or_else(|| RelayError::sink("sink not configured", None))?;
            if data.len() != geometry.frame_len() {
                return Err(RelayError::sink(
                    format!(
                        "frame is {} bytes, expected {} for {}",
                        data.len(),
                        geometry.frame_len(),
                        geometry
                    ),
                    None,
                ));
            }
            self.device
                .write_all(data)
                .map_err(|e| RelayError::sink(format!("write frame to {}", self.path), Some(e)))
        }
    }
}
