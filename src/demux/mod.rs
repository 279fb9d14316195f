//! Incremental stream demultiplexers.
//!
//! Two wire framings deliver compressed frames from the camera peer:
//! - `length_prefixed`: a short geometry handshake followed by
//!   `[length][payload]` records over a raw byte stream.
//! - `multipart`: `multipart/x-mixed-replace` boundary-delimited parts over
//!   an HTTP-style byte stream.
//!
//! Both variants accept transport bytes in arbitrary-sized chunks with no
//! assumption of message-aligned reads: partial data is retained across
//! `feed` calls and complete frames are pushed to a sink closure (the frame
//! ring) as soon as they materialize.

pub mod length_prefixed;
pub mod multipart;

pub use length_prefixed::{parse_handshake, LengthPrefixedDemuxer, HANDSHAKE_LEN};
pub use multipart::{boundary_from_content_type, MultipartDemuxer, ParserState};

/// Upper bound on a single compressed frame. A declared or accumulated
/// frame beyond this is a protocol error, not an allocation request.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
