//! HTTP frame source consuming a multipart MJPEG stream.
//!
//! Connects with a plain GET, validates the `multipart/x-mixed-replace`
//! content type, extracts the boundary token from it, and pumps the response
//! body through the multipart demuxer into the session's ring. The source
//! geometry is not carried by this framing; the session negotiates it from
//! the first frame's JPEG header.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

use crate::demux::{boundary_from_content_type, MultipartDemuxer};
use crate::error::{RelayError, Result};
use crate::ingest::READ_CHUNK;
use crate::session::RelaySession;

pub struct HttpSource {
    reader: Box<dyn Read + Send>,
    boundary: String,
    url: String,
    frames: u64,
}

impl HttpSource {
    /// Connects to an MJPEG stream URL (http or https).
    pub fn connect(url: &str) -> Result<Self> {
        let parsed =
            Url::parse(url).map_err(|e| RelayError::protocol(format!("parse url {}: {}", url, e)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(RelayError::protocol(format!(
                    "unsupported stream scheme '{}'; expected http(s)",
                    other
                )))
            }
        }
        let response = ureq::get(url)
            .call()
            .map_err(|e| RelayError::transport(format!("connect to {}: {}", url, e), None))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_string();
        let boundary = boundary_from_content_type(&content_type)?;
        log::info!("multipart stream from {} (boundary '{}')", url, boundary);
        Ok(Self {
            reader: response.into_reader(),
            boundary,
            url: url.to_string(),
            frames: 0,
        })
    }

    /// Pumps the response body into the session until disconnect, a fatal
    /// error, or `running` clears.
    pub fn run(&mut self, session: &RelaySession, running: &AtomicBool) -> Result<()> {
        let mut demuxer = MultipartDemuxer::new(&self.boundary);
        let mut chunk = vec![0u8; READ_CHUNK];
        while running.load(Ordering::Relaxed) {
            let read = self
                .reader
                .read(&mut chunk)
                .map_err(|e| RelayError::transport(format!("read from {}", self.url), Some(e)))?;
            if read == 0 {
                return Err(RelayError::transport("camera closed the stream", None));
            }
            self.frames += demuxer.feed(&chunk[..read], |frame| session.store_frame(frame))? as u64;
        }
        log::info!("{} frames received from {}", self.frames, self.url);
        Ok(())
    }

    pub fn frames_received(&self) -> u64 {
        self.frames
    }
}
