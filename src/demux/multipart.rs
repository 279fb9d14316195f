//! Multipart boundary-delimited framing (`multipart/x-mixed-replace`).
//!
//! The boundary token comes from the transport's Content-Type metadata. Each
//! part carries CRLF-terminated headers, of which only `Content-Length` is
//! semantically required, then exactly that many body bytes. The parser is a
//! state machine fed arbitrary byte chunks; a part header without a usable
//! length skips ahead to the next boundary instead of failing the session.

use crate::demux::MAX_FRAME_BYTES;
use crate::error::{RelayError, Result};

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;
const CONTENT_LENGTH_PREFIX: &str = "Content-Length:";
const MIN_SCRATCH_CAPACITY: usize = 1024;

/// Scratch growth bound. Hitting it means the stream never produced a usable
/// boundary; the parser goes terminal rather than growing without limit.
const MAX_SCRATCH_BYTES: usize = MAX_FRAME_BYTES * 2;

/// Parser position within the multipart stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserState {
    /// Fresh instance; moves to `SeekBoundary` on the first feed.
    Init,
    /// Scanning for `--<token>`, tolerating it spanning feed calls.
    SeekBoundary,
    /// Consuming CRLF-terminated header lines until a blank line.
    ReadHeaders,
    /// Waiting for `Content-Length` body bytes to accumulate.
    ReadBody,
    /// Terminal. The session must be torn down and a fresh parser created.
    Error,
}

/// Extracts the boundary token from a Content-Type header value of the form
/// `multipart/x-mixed-replace; boundary=<token>`. Whitespace around the `=`
/// and the token is tolerated, as are surrounding quotes.
pub fn boundary_from_content_type(content_type: &str) -> Result<String> {
    if !content_type.to_ascii_lowercase().contains("multipart") {
        return Err(RelayError::protocol(format!(
            "unexpected content type '{}'",
            content_type
        )));
    }
    let after = content_type
        .find("boundary")
        .map(|idx| &content_type[idx + "boundary".len()..])
        .ok_or_else(|| RelayError::protocol("content type is missing a boundary parameter"))?;
    let after = after.trim_start();
    let after = after
        .strip_prefix('=')
        .ok_or_else(|| RelayError::protocol("boundary parameter is missing '='"))?;
    let token = after
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"');
    if token.is_empty() {
        return Err(RelayError::protocol("empty boundary token"));
    }
    Ok(token.to_string())
}

/// Incremental multipart part extractor.
pub struct MultipartDemuxer {
    boundary: Vec<u8>,
    state: ParserState,
    scratch: Vec<u8>,
    offset: usize,
    body_len: usize,
}

impl MultipartDemuxer {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.as_bytes().to_vec(),
            state: ParserState::Init,
            scratch: Vec::new(),
            offset: 0,
            body_len: 0,
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Feeds one chunk of transport bytes. Every body that completes is
    /// handed to `sink`; partial parts are retained for the next call.
    /// Returns the number of frames emitted. A parser in the terminal state
    /// consumes nothing and always fails.
    pub fn feed<F>(&mut self, chunk: &[u8], mut sink: F) -> Result<usize>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if self.state == ParserState::Error {
            return Err(RelayError::protocol("multipart parser is in a terminal state"));
        }
        self.compact();
        self.grow_for(chunk.len())?;
        self.scratch.extend_from_slice(chunk);
        if self.state == ParserState::Init {
            self.state = ParserState::SeekBoundary;
        }

        let mut emitted = 0;
        loop {
            let progressed = match self.state {
                ParserState::SeekBoundary => self.seek_boundary(),
                ParserState::ReadHeaders => self.read_headers()?,
                ParserState::ReadBody => self.read_body(&mut sink, &mut emitted)?,
                ParserState::Init | ParserState::Error => false,
            };
            if !progressed {
                break;
            }
        }
        self.compact();
        Ok(emitted)
    }

    /// Scans the buffered bytes for `--<token>`. On a match, consumes the
    /// boundary and any trailing CRLF. No match is "need more data", not an
    /// error; the unconsumed bytes stay buffered so a boundary spanning two
    /// feeds is still found.
    fn seek_boundary(&mut self) -> bool {
        let needle_len = 2 + self.boundary.len();
        let haystack = &self.scratch[self.offset..];
        if haystack.len() < needle_len {
            return false;
        }
        let mut found = None;
        for i in 0..=haystack.len() - needle_len {
            if haystack[i] == b'-'
                && haystack[i + 1] == b'-'
                && haystack[i + 2..i + needle_len] == self.boundary[..]
            {
                found = Some(i);
                break;
            }
        }
        let Some(at) = found else {
            return false;
        };
        self.offset += at + needle_len;
        if self.scratch.get(self.offset) == Some(&CR) {
            self.offset += 1;
        }
        if self.scratch.get(self.offset) == Some(&LF) {
            self.offset += 1;
        }
        self.state = ParserState::ReadHeaders;
        true
    }

    /// Consumes the whole header block once its terminating blank line is
    /// buffered. A block without a parseable, non-zero Content-Length skips
    /// back to boundary seeking.
    fn read_headers(&mut self) -> Result<bool> {
        let haystack = &self.scratch[self.offset..];
        let Some(block_len) = find_blank_line(haystack) else {
            return Ok(false);
        };
        let block = &haystack[..block_len];
        let mut content_length: Option<usize> = None;
        for line in block.split(|&b| b == LF) {
            let line = trim_cr(line);
            if let Ok(text) = std::str::from_utf8(line) {
                if let Some(value) = text.strip_prefix(CONTENT_LENGTH_PREFIX) {
                    content_length = value.trim().parse::<usize>().ok();
                }
            }
        }
        self.offset += block_len + 2; // past the blank line's CRLF

        match content_length {
            Some(len) if len > 0 => {
                if len > MAX_FRAME_BYTES {
                    self.state = ParserState::Error;
                    return Err(RelayError::protocol(format!(
                        "declared part length {} exceeds the {} byte limit",
                        len, MAX_FRAME_BYTES
                    )));
                }
                self.body_len = len;
                self.state = ParserState::ReadBody;
            }
            // no usable length: skip to the next boundary
            _ => self.state = ParserState::SeekBoundary,
        }
        Ok(true)
    }

    fn read_body<F>(&mut self, sink: &mut F, emitted: &mut usize) -> Result<bool>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let available = self.scratch.len() - self.offset;
        if available < self.body_len {
            return Ok(false);
        }
        sink(&self.scratch[self.offset..self.offset + self.body_len])?;
        self.offset += self.body_len;
        self.body_len = 0;
        self.state = ParserState::SeekBoundary;
        *emitted += 1;
        Ok(true)
    }

    /// Drops the consumed prefix (done on every feed) so steady-state memory
    /// use stays proportional to one in-flight part.
    fn compact(&mut self) {
        if self.offset > 0 {
            self.scratch.drain(..self.offset);
            self.offset = 0;
        }
    }

    /// Grows the scratch buffer geometrically (double until it fits), going
    /// terminal at the growth bound.
    fn grow_for(&mut self, additional: usize) -> Result<()> {
        let needed = self.scratch.len() + additional;
        if needed > MAX_SCRATCH_BYTES {
            self.state = ParserState::Error;
            return Err(RelayError::protocol(format!(
                "scratch buffer would exceed {} bytes without finding a boundary",
                MAX_SCRATCH_BYTES
            )));
        }
        if needed > self.scratch.capacity() {
            let mut capacity = self.scratch.capacity().max(MIN_SCRATCH_CAPACITY);
            while capacity < needed {
                capacity <<= 1;
            }
            self.scratch
                .reserve_exact(capacity - self.scratch.len());
        }
        Ok(())
    }
}

/// Index just past the last header line, i.e. the length of the block before
/// its terminating blank line. `None` while the blank line is not buffered.
fn find_blank_line(bytes: &[u8]) -> Option<usize> {
    if bytes.starts_with(&[CR, LF]) {
        return Some(0);
    }
    bytes
        .windows(4)
        .position(|w| w == [CR, LF, CR, LF])
        .map(|i| i + 2)
}

fn trim_cr(line: &[u8]) -> &[u8] {
    match line.last() {
        Some(&CR) => &line[..line.len() - 1],
        _ => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(boundary: &str, parts: &[&[u8]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for part in parts {
            bytes.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            bytes.extend_from_slice(
                format!("Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n", part.len())
                    .as_bytes(),
            );
            bytes.extend_from_slice(part);
            bytes.extend_from_slice(b"\r\n");
        }
        bytes
    }

    fn collect_feed(demuxer: &mut MultipartDemuxer, bytes: &[u8]) -> Vec<Vec<u8>> {
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
    fn boundary_token_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace;boundary=frame").unwrap(),
            "frame"
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary = abc ").unwrap(),
            "abc"
        );
        assert_eq!(
            boundary_from_content_type("multipart/x-mixed-replace; boundary=\"b1\"; charset=x")
                .unwrap(),
            "b1"
        );
        assert!(boundary_from_content_type("text/html").is_err());
        assert!(boundary_from_content_type("multipart/x-mixed-replace").is_err());
        assert!(boundary_from_content_type("multipart/x-mixed-replace; boundary=").is_err());
    }

    #[test]
    fn extracts_parts_in_order() {
        let stream = stream_with("frame", &[b"0123456789", b"abcd"]);
        let mut demuxer = MultipartDemuxer::new("frame");
        let frames = collect_feed(&mut demuxer, &stream);
        assert_eq!(frames, vec![b"0123456789".to_vec(), b"abcd".to_vec()]);
        assert_eq!(demuxer.state(), ParserState::SeekBoundary);
    }

    #[test]
    fn byte_at_a_time_feeding_matches_single_call() {
        let stream = stream_with("frame", &[b"0123456789", b"abcd", &[0xFFu8; 200]]);

        let mut whole = MultipartDemuxer::new("frame");
        let expected = collect_feed(&mut whole, &stream);
        assert_eq!(expected.len(), 3);

        let mut trickled = MultipartDemuxer::new("frame");
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
    fn zero_length_part_is_skipped() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"--frame\r\nContent-Length: 0\r\n\r\n");
        stream.extend_from_slice(&stream_with("frame", &[b"real"]));
        let mut demuxer = MultipartDemuxer::new("frame");
        let frames = collect_feed(&mut demuxer, &stream);
        assert_eq!(frames, vec![b"real".to_vec()]);
    }

    #[test]
    fn missing_content_length_skips_to_next_boundary() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\njunkjunk");
        stream.extend_from_slice(&stream_with("frame", &[b"good"]));
        let mut demuxer = MultipartDemuxer::new("frame");
        let frames = collect_feed(&mut demuxer, &stream);
        assert_eq!(frames, vec![b"good".to_vec()]);
    }

    #[test]
    fn preamble_before_first_boundary_is_ignored() {
        let mut stream = b"HTTP noise that is not a boundary".to_vec();
        stream.extend_from_slice(&stream_with("frame", &[b"payload"]));
        let mut demuxer = MultipartDemuxer::new("frame");
        let frames = collect_feed(&mut demuxer, &stream);
        assert_eq!(frames, vec![b"payload".to_vec()]);
    }

    #[test]
    fn boundaryless_garbage_goes_terminal_and_stays_there() {
        let mut demuxer = MultipartDemuxer::new("frame");
        let garbage = vec![b'x'; 1024 * 1024];
        let mut total_fed = 0usize;
        let mut saw_error = false;
        while total_fed <= MAX_SCRATCH_BYTES + garbage.len() {
            match demuxer.feed(&garbage, |_| Ok(())) {
                Ok(count) => assert_eq!(count, 0),
                Err(err) => {
                    assert!(matches!(err, RelayError::Protocol { .. }));
                    saw_error = true;
                    break;
                }
            }
            total_fed += garbage.len();
        }
        assert!(saw_error);
        assert_eq!(demuxer.state(), ParserState::Error);
        // terminal: further feeds fail and emit nothing
        assert!(demuxer.feed(b"--frame\r\n", |_| Ok(())).is_err());
    }

    #[test]
    fn oversized_part_length_goes_terminal() {
        let header =
            format!("--frame\r\nContent-Length: {}\r\n\r\n", MAX_FRAME_BYTES + 1);
        let mut demuxer = MultipartDemuxer::new("frame");
        let err = demuxer.feed(header.as_bytes(), |_| Ok(())).unwrap_err();
        assert!(matches!(err, RelayError::Protocol { .. }));
        assert_eq!(demuxer.state(), ParserState::Error);
    }

    #[test]
    fn headers_spanning_feeds_are_parsed_whole() {
        let stream = stream_with("frame", &[b"payload"]);
        let split = stream.len() / 2;
        let mut demuxer = MultipartDemuxer::new("frame");
        let first = collect_feed(&mut demuxer, &stream[..split]);
        let mut frames = first;
        frames.extend(collect_feed(&mut demuxer, &stream[split..]));
        assert_eq!(frames, vec![b"payload".to_vec()]);
    }
}
