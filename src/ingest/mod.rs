//! Network frame sources.
//!
//! This module provides the transport pumps that feed a relay session:
//! - TCP streams speaking the length-prefixed framing (`tcp`)
//! - HTTP multipart MJPEG streams (`http`, feature: ingest-http)
//!
//! Sources own the connection establishment detail (connect, accept, the
//! stream request, the handshake); the demuxers own the framing. A source's
//! `run` loop reads bounded chunks and pushes every extracted frame into the
//! session's ring until disconnect, a fatal error, or a shutdown request.

#[cfg(feature = "ingest-http")]
pub mod http;
pub mod tcp;

#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use tcp::TcpSource;

/// Transport read chunk size. An I/O detail only; the demuxers accept
/// arbitrary chunk boundaries.
pub(crate) const READ_CHUNK: usize = 4096;
