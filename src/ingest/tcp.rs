//! TCP frame source speaking the length-prefixed stream framing.
//!
//! The source connects out to the camera (or, in listener mode, waits for
//! the camera to connect in), sends the stream request naming the desired
//! output geometry, reads the 5-byte handshake, and then pumps the socket
//! through the length-prefixed demuxer into the session's ring.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::demux::{parse_handshake, LengthPrefixedDemuxer, HANDSHAKE_LEN};
use crate::error::{RelayError, Result};
use crate::ingest::READ_CHUNK;
use crate::raster::Geometry;
use crate::session::RelaySession;

const READ_TIMEOUT: Duration = Duration::from_millis(500);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub struct TcpSource {
    stream: TcpStream,
    peer: String,
    frames: u64,
}

impl TcpSource {
    /// Connects out to a camera at `host:port` and requests the stream.
    pub fn connect(host: &str, port: u16, output: Geometry) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)
            .map_err(|e| RelayError::transport(format!("connect to {}", addr), Some(e)))?;
        log::info!("connected to camera at {}", addr);
        Self::start_stream(stream, addr, output)
    }

    /// Waits for a camera to connect in on `port` (listener mode). The wait
    /// polls `running` so a shutdown request interrupts it.
    pub fn accept(port: u16, output: Geometry, running: &AtomicBool) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .map_err(|e| RelayError::transport(format!("listen on port {}", port), Some(e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| RelayError::transport("set listener non-blocking", Some(e)))?;
        log::info!("waiting for a camera on port {}", port);
        loop {
            if !running.load(Ordering::Relaxed) {
                return Err(RelayError::transport(
                    "shutdown requested before a camera connected",
                    None,
                ));
            }
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream
                        .set_nonblocking(false)
                        .map_err(|e| RelayError::transport("set stream blocking", Some(e)))?;
                    log::info!("camera connected from {}", peer);
                    return Self::start_stream(stream, peer.to_string(), output);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    return Err(RelayError::transport("accept camera connection", Some(e)));
                }
            }
        }
    }

    fn start_stream(mut stream: TcpStream, peer: String, output: Geometry) -> Result<Self> {
        let request = format!("CMD /v2/video?{}x{}", output.width(), output.height());
        stream
            .write_all(request.as_bytes())
            .map_err(|e| RelayError::transport("send stream request", Some(e)))?;
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(|e| RelayError::transport("set read timeout", Some(e)))?;
        Ok(Self {
            stream,
            peer,
            frames: 0,
        })
    }

    /// Reads the 5-byte handshake and returns the negotiated source
    /// geometry.
    pub fn handshake(&mut self) -> Result<Geometry> {
        let mut header = [0u8; HANDSHAKE_LEN];
        self.stream.read_exact(&mut header).map_err(|e| {
            RelayError::transport(
                "read stream handshake (camera may be busy with another client)",
                Some(e),
            )
        })?;
        parse_handshake(&header)
    }

    /// Pumps the socket into the session until disconnect, a fatal error, or
    /// `running` clears. Transport EOF is an error: the session is over.
    pub fn run(&mut self, session: &RelaySession, running: &AtomicBool) -> Result<()> {
        self.stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|e| RelayError::transport("set read timeout", Some(e)))?;
        let mut demuxer = LengthPrefixedDemuxer::new();
        let mut chunk = [0u8; READ_CHUNK];
        while running.load(Ordering::Relaxed) {
            let read = match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(RelayError::transport("camera closed the stream", None));
                }
                Ok(read) => read,
                // timeout: re-check the shutdown flag and keep reading
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    continue;
                }
                Err(e) => {
                    return Err(RelayError::transport(
                        format!("read from {}", self.peer),
                        Some(e),
                    ));
                }
            };
            self.frames += demuxer.feed(&chunk[..read], |frame| session.store_frame(frame))? as u64;
        }
        log::info!("{} frames received from {}", self.frames, self.peer);
        Ok(())
    }

    pub fn frames_received(&self) -> u64 {
        self.frames
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{FrameSink, NullSink};
    use crate::transform::Rotation;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;

    /// Serves one canned byte stream to the first client, then disconnects.
    fn serve_once(payload: Vec<u8>) -> (u16, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // drain the client's stream request line
            let mut request = [0u8; 64];
            let n = stream.read(&mut request).unwrap();
            stream.write_all(&payload).unwrap();
            request[..n].to_vec()
        });
        (port, handle)
    }

    #[test]
    fn connect_requests_and_reads_the_handshake() {
        // 320x240 big-endian geometry plus a reserved byte
        let payload = vec![0x01, 0x40, 0x00, 0xF0, 0x00];
        let (port, server) = serve_once(payload);

        let output = Geometry::new(640, 480).unwrap();
        let mut source = TcpSource::connect("127.0.0.1", port, output).unwrap();
        let negotiated = source.handshake().unwrap();
        assert_eq!(negotiated.width(), 320);
        assert_eq!(negotiated.height(), 240);

        let request = server.join().unwrap();
        assert_eq!(request, b"CMD /v2/video?640x480");
    }

    #[test]
    fn run_pumps_frames_into_the_session_until_disconnect() {
        let mut payload = vec![0x00, 0x40, 0x00, 0x30, 0x00]; // 64x48 handshake
        for tag in [0xAAu8, 0xBB] {
            payload.extend_from_slice(&8u32.to_le_bytes());
            payload.extend_from_slice(&[tag; 8]);
        }
        let (port, server) = serve_once(payload);

        let output = Geometry::new(64, 48).unwrap();
        let session = RelaySession::new(output, 1, Rotation::Deg0).unwrap();
        let mut source = TcpSource::connect("127.0.0.1", port, output).unwrap();
        let negotiated = source.handshake().unwrap();
        session.negotiate_source(negotiated).unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let err = source.run(&session, &running).unwrap_err();
        assert!(matches!(err, RelayError::Transport { .. }));
        assert_eq!(source.frames_received(), 2);

        // the stored bytes are not decodable JPEG; the session drops them
        // but stays on cadence
        let mut sink = NullSink::new();
        sink.configure(output).unwrap();
        assert!(!session.present_next(&mut sink).unwrap());
        assert_eq!(sink.frames_presented(), 1);
        server.join().unwrap();
    }
}
