//! camrelay — software video relay between a network JPEG camera source and
//! a steady-cadence virtual-camera output.
//!
//! A camera peer pushes JPEG frames over one of two wire framings (a raw
//! length-prefixed stream or HTTP multipart MJPEG). Arrival is bursty and
//! unreliable; the output device consumes at a fixed cadence. The relay
//! decouples the two with a bounded frame ring that drops backlog instead of
//! letting latency grow, and decodes only the frames that will actually be
//! shown.
//!
//! # Module structure
//!
//! - `demux`: incremental wire parsers (length-prefixed, multipart)
//! - `ring`: bounded compressed-frame ring with drop-to-catch-up pacing
//! - `decode`, `scale`, `transform`: JPEG -> planar YUV 4:2:0 -> output
//!   geometry -> optional rotation
//! - `session`: explicit owner of geometry, rotation state, ring, and
//!   pipeline buffers
//! - `ingest`: transport pumps (TCP, HTTP) feeding a session
//! - `sink`: presentation sinks (v4l2loopback virtual camera, null)
//!
//! # Roles
//!
//! One producer context receives network bytes and stores demuxed frames
//! (`ingest` -> `RelaySession::store_frame`); one consumer context presents
//! on its own cadence (`RelaySession::present_next`). The session serializes
//! ring access internally, so the two roles may live on separate threads.

pub mod config;
pub mod decode;
pub mod demux;
pub mod error;
pub mod ingest;
pub mod raster;
pub mod ring;
pub mod scale;
pub mod session;
pub mod sink;
pub mod transform;

pub use config::RelayConfig;
pub use decode::JpegDecoder;
pub use demux::{
    boundary_from_content_type, parse_handshake, LengthPrefixedDemuxer, MultipartDemuxer,
    ParserState, HANDSHAKE_LEN, MAX_FRAME_BYTES,
};
pub use error::{RelayError, Result};
#[cfg(feature = "ingest-http")]
pub use ingest::HttpSource;
pub use ingest::TcpSource;
pub use raster::{test_pattern, Geometry, PlaneRaster, CHROMA_MID};
pub use ring::{CompressedFrame, FrameRing, Paced, RING_SLOTS};
pub use scale::PlaneScaler;
pub use session::RelaySession;
pub use sink::{FrameSink, NullSink};
#[cfg(feature = "sink-v4l2")]
pub use sink::v4l2::V4l2Sink;
pub use transform::{Rotation, Transformer};
