use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;

use crate::raster::Geometry;
use crate::ring::RING_SLOTS;
use crate::transform::Rotation;

const DEFAULT_SOURCE: &str = "tcp://127.0.0.1:4747";
const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_DEPTH: usize = 1;
const DEFAULT_FPS: u32 = 30;
const DEFAULT_ROTATION: u32 = 0;

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    source: Option<String>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    depth: Option<usize>,
    fps: Option<u32>,
    rotation: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Camera source URL: `tcp://host:port`, `tcp-listen://port`, or
    /// `http(s)://host:port/path`.
    pub source: String,
    /// Output device path, or `stub://` to discard frames.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Ring target depth (frames of buffering latency).
    pub depth: usize,
    /// Presentation cadence in frames per second.
    pub fps: u32,
    /// Initial rotation in degrees.
    pub rotation: u32,
}

impl RelayConfig {
    /// Loads the config: optional JSON file named by `CAMRELAY_CONFIG`,
    /// then environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMRELAY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => RelayConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Self {
        Self {
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            device: file.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: file.width.unwrap_or(DEFAULT_WIDTH),
            height: file.height.unwrap_or(DEFAULT_HEIGHT),
            depth: file.depth.unwrap_or(DEFAULT_DEPTH),
            fps: file.fps.unwrap_or(DEFAULT_FPS),
            rotation: file.rotation.unwrap_or(DEFAULT_ROTATION),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("CAMRELAY_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(device) = std::env::var("CAMRELAY_DEVICE") {
            if !device.trim().is_empty() {
                self.device = device;
            }
        }
        if let Ok(width) = std::env::var("CAMRELAY_WIDTH") {
            self.width = width
                .parse()
                .map_err(|_| anyhow!("CAMRELAY_WIDTH must be an integer pixel count"))?;
        }
        if let Ok(height) = std::env::var("CAMRELAY_HEIGHT") {
            self.height = height
                .parse()
                .map_err(|_| anyhow!("CAMRELAY_HEIGHT must be an integer pixel count"))?;
        }
        if let Ok(depth) = std::env::var("CAMRELAY_DEPTH") {
            self.depth = depth
                .parse()
                .map_err(|_| anyhow!("CAMRELAY_DEPTH must be an integer frame count"))?;
        }
        if let Ok(fps) = std::env::var("CAMRELAY_FPS") {
            self.fps = fps
                .parse()
                .map_err(|_| anyhow!("CAMRELAY_FPS must be an integer rate"))?;
        }
        if let Ok(rotation) = std::env::var("CAMRELAY_ROTATION") {
            self.rotation = rotation
                .parse()
                .map_err(|_| anyhow!("CAMRELAY_ROTATION must be a degree value"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "output geometry {}x{} must be positive on both axes",
                self.width,
                self.height
            ));
        }
        if self.depth == 0 || self.depth > RING_SLOTS {
            return Err(anyhow!("depth must be between 1 and {}", RING_SLOTS));
        }
        if self.fps == 0 {
            return Err(anyhow!("fps must be greater than zero"));
        }
        if Rotation::from_degrees(self.rotation).is_none() {
            return Err(anyhow!("rotation must be one of 0, 90, 180, 270"));
        }
        Ok(())
    }

    pub fn output_geometry(&self) -> Result<Geometry> {
        Geometry::new(self.width, self.height)
            .map_err(|e| anyhow!("invalid output geometry: {}", e))
    }

    pub fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.rotation).unwrap_or_default()
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.source, DEFAULT_SOURCE);
        assert_eq!(cfg.depth, 1);
        assert_eq!(cfg.rotation(), Rotation::Deg0);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"source": "http://cam.local:8080/video", "width": 1280, "height": 720, "depth": 3, "rotation": 90}}"#
        )
        .unwrap();
        let parsed = read_config_file(file.path()).unwrap();
        let cfg = RelayConfig::from_file(parsed);
        cfg.validate().unwrap();
        assert_eq!(cfg.source, "http://cam.local:8080/video");
        assert_eq!(cfg.width, 1280);
        assert_eq!(cfg.depth, 3);
        assert_eq!(cfg.rotation(), Rotation::Deg90);
        // unset fields keep their defaults
        assert_eq!(cfg.device, DEFAULT_DEVICE);
        assert_eq!(cfg.fps, DEFAULT_FPS);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.depth = RING_SLOTS + 1;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.rotation = 45;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.width = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default());
        cfg.fps = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(read_config_file(file.path()).is_err());
    }
}
