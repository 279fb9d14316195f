//! Length-prefixed stream framing.
//!
//! Wire format: a 5-byte handshake carrying the negotiated geometry, then an
//! unbounded sequence of frames, each a 4-byte length field followed by
//! exactly that many payload bytes.
//!
//! Byte-order convention (fixed here, validated against the peer): the
//! handshake geometry fields are big-endian u16 (first received byte most
//! significant, fifth byte reserved), while the frame length field is
//! little-endian u32 (first received byte least significant). The asymmetry
//! is the peer's, not ours.

use crate::demux::MAX_FRAME_BYTES;
use crate::error::{RelayError, Result};
use crate::raster::Geometry;

/// Length of the session handshake in bytes.
pub const HANDSHAKE_LEN: usize = 5;

const LEN_PREFIX: usize = 4;

/// Decodes the 5-byte session handshake into the stream geometry.
///
/// Layout: `[width_hi, width_lo, height_hi, height_lo, reserved]`.
pub fn parse_handshake(header: &[u8; HANDSHAKE_LEN]) -> Result<Geometry> {
    let width = u16::from_be_bytes([header[0], header[1]]) as u32;
    let height = u16::from_be_bytes([header[2], header[3]]) as u32;
    Geometry::new(width, height)
}

/// Decodes a frame length prefix. Layout: `[len_b0, len_b1, len_b2, len_b3]`
/// with `len_b0` least significant.
pub fn parse_frame_len(prefix: [u8; LEN_PREFIX]) -> u32 {
    u32::from_le_bytes(prefix)
}

/// Incremental parser for the post-handshake frame sequence.
///
/// No state enum is needed: the parser alternates between "read a length
/// prefix" and "read that many payload bytes", tracked by `pending_len`.
pub struct LengthPrefixedDemuxer {
    scratch: Vec<u8>,
    offset: usize,
    pending_len: Option<usize>,
}

impl LengthPrefixedDemuxer {
    pub fn new() -> Self {
        Self {
            scratch: Vec::new(),
            offset: 0,
            pending_len: None,
        }
    }

    /// Feeds one chunk of transport bytes. Every frame that completes is
    /// handed to `sink`; partial data is retained for the next call. Returns
    /// the number of frames emitted.
    pub fn feed<F>(&mut self, chunk: &[u8], mut sink: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        self.scratch.extend_from_slice(chunk);
        let mut emitted = 0;
        loop {
            let available = self.scratch.len() - self.offset;
            match self.pending_len {
                None => {
                    if available < LEN_PREFIX {
                        break;
                    }
                    let prefix = [
                        self.scratch[self.offset],
                        self.scratch[self.offset + 1],
                        self.scratch[self.offset + 2],
                        self.scratch[self.offset + 3],
                    ];
                    let len = parse_frame_len(prefix) as usize;
                    if len > MAX_FRAME_BYTES {
                        return Err(RelayError::protocol(format!(
                            "declared frame length {} exceeds the {} byte limit",
                            len, MAX_FRAME_BYTES
                        )));
                    }
                    self.offset += LEN_PREFIX;
                    self.pending_len = Some(len);
                }
                Some(len) => {
                    if available < len {
                        break;
                    }
                    sink(&self.scratch[self.offset..self.offset + len])?;
                    self.offset += len;
                    self.pending_len = None;
                    emitted += 1;
                }
            }
        }
        self.compact();
        Ok(emitted)
    }

    /// Drops the consumed prefix so long sessions do not grow the buffer.
    fn compact(&mut self) {
        if self.offset > 0 {
            self.scratch.drain(..self.offset);
            self.offset = 0;
        }
    }
}

impl Default for LengthPrefixedDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_record(payload: &[u8]) -> Vec<u8> {
        let mut record = (payload.len() as u32).to_le_bytes().to_vec();
        record.extend_from_slice(payload);
        record
    }

    fn collect_feed(demuxer: &mut LengthPrefixedDemuxer, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        demuxer
            .feed(bytes, |frame| {
                frames.push(frame.to_vec());
                Ok(())
            })
            .unwrap();
        frames
    }

    #[test]
    fn handshake_decodes_big_endian_geometry() {
        // 640x480 with the first byte most significant
        let header = [0x02, 0x80, 0x01, 0xE0, 0x00];
        let geometry = parse_handshake(&header).unwrap();
        assert_eq!(geometry.width(), 640);
        assert_eq!(geometry.height(), 480);
    }

    #[test]
    fn handshake_rejects_zero_geometry() {
        let header = [0x00, 0x00, 0x01, 0xE0, 0x00];
        assert!(parse_handshake(&header).is_err());
    }

    #[test]
    fn frame_length_decodes_little_endian() {
        assert_eq!(parse_frame_len([0x00, 0x10, 0x00, 0x00]), 4096);
        assert_eq!(parse_frame_len([0x0A, 0x00, 0x00, 0x00]), 10);
    }

    #[test]
    fn extracts_frames_including_zero_length() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_record(&[1u8; 10]));
        stream.extend_from_slice(&frame_record(&[]));
        stream.extend_from_slice(&frame_record(&[2u8; 4096]));

        let mut demuxer = LengthPrefixedDemuxer::new();
        let frames = collect_feed(&mut demuxer, &stream);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 10);
        assert_eq!(frames[1].len(), 0);
        assert_eq!(frames[2].len(), 4096);
    }

    #[test]
    fn byte_at_a_time_feeding_matches_single_call() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_record(b"hello"));
        stream.extend_from_slice(&frame_record(b""));
        stream.extend_from_slice(&frame_record(&[7u8; 300]));

        let mut whole = LengthPrefixedDemuxer::new();
        let expected = collect_feed(&mut whole, &stream);

        let mut trickled = LengthPrefixedDemuxer::new();
        let mut frames = Vec::new();
        for byte in &stream {
            trickled
                .feed(std::slice::from_ref(byte), |frame| {
                    frames.push(frame.to_vec());
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn oversized_declared_length_is_a_protocol_error() {
        let mut demuxer = LengthPrefixedDemuxer::new();
        let prefix = (MAX_FRAME_BYTES as u32 + 1).to_le_bytes();
        let err = demuxer.feed(&prefix, |_| Ok(())).unwrap_err();
        assert!(matches!(err, RelayError::Protocol { .. }));
    }

    #[test]
    fn partial_prefix_is_retained() {
        let record = frame_record(b"abcd");
        let mut demuxer = LengthPrefixedDemuxer::new();
        assert!(collect_feed(&mut demuxer, &record[..2]).is_empty());
        let frames = collect_feed(&mut demuxer, &record[2..]);
        assert_eq!(frames, vec![b"abcd".to_vec()]);
    }
}
