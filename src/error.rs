//! Error taxonomy for the relay core.
//!
//! Errors are classified where they are detected; only session-fatal classes
//! propagate to the caller, which performs a wholesale teardown (drop the
//! session, close the transport) and may open a fresh session to retry.
//! "Need more data" from a demuxer is a normal return value, never an error.

use thiserror::Error;

use crate::raster::Geometry;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    /// Malformed wire data: boundary, header line, or length field.
    /// Terminal for the demuxer instance that raised it.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Transport read failure or end-of-stream.
    #[error("transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The codec rejected a frame. Non-fatal decode errors drop the frame
    /// and the session continues; `fatal` marks a broken codec state.
    #[error("decode error: {reason}")]
    Decode { reason: String, fatal: bool },

    /// A decoded frame disagrees with the negotiated stream geometry.
    /// Fatal: the ring's fixed slot layout assumes one geometry per session.
    #[error("geometry mismatch: expected {expected}, got {actual}")]
    GeometryMismatch { expected: Geometry, actual: Geometry },

    /// Buffer growth could not satisfy a required size.
    #[error("allocation failure: {reason}")]
    Allocation { reason: String },

    /// The presentation sink rejected a frame or a configuration.
    #[error("sink error: {reason}")]
    Sink {
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl RelayError {
    /// Helper constructor for protocol errors.
    pub fn protocol(reason: impl Into<String>) -> Self {
        RelayError::Protocol {
            reason: reason.into(),
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>, source: Option<std::io::Error>) -> Self {
        RelayError::Transport {
            reason: reason.into(),
            source,
        }
    }

    /// Helper constructor for per-frame decode errors.
    pub fn decode(reason: impl Into<String>) -> Self {
        RelayError::Decode {
            reason: reason.into(),
            fatal: false,
        }
    }

    /// Helper constructor for decode errors that leave the codec unusable.
    pub fn decode_fatal(reason: impl Into<String>) -> Self {
        RelayError::Decode {
            reason: reason.into(),
            fatal: true,
        }
    }

    /// Helper constructor for allocation failures.
    pub fn allocation(reason: impl Into<String>) -> Self {
        RelayError::Allocation {
            reason: reason.into(),
        }
    }

    /// Helper constructor for sink errors.
    pub fn sink(reason: impl Into<String>, source: Option<std::io::Error>) -> Self {
        RelayError::Sink {
            reason: reason.into(),
            source,
        }
    }

    /// Returns whether this error requires full session teardown.
    ///
    /// Non-fatal decode errors drop the offending frame only; everything else
    /// invalidates the session (parser, ring, transport) as a whole.
    pub fn is_session_fatal(&self) -> bool {
        match self {
            RelayError::Protocol { .. } => true,
            RelayError::Transport { .. } => true,
            RelayError::Decode { fatal, .. } => *fatal,
            RelayError::GeometryMismatch { .. } => true,
            RelayError::Allocation { .. } => true,
            RelayError::Sink { .. } => true,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Transport {
            reason: "i/o failure".to_string(),
            source: Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(RelayError::protocol("bad boundary").is_session_fatal());
        assert!(RelayError::transport("eof", None).is_session_fatal());
        assert!(!RelayError::decode("truncated frame").is_session_fatal());
        assert!(RelayError::decode_fatal("bad subsampling").is_session_fatal());
        assert!(RelayError::allocation("too big").is_session_fatal());
        assert!(RelayError::sink("short write", None).is_session_fatal());
    }

    #[test]
    fn error_traits() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<RelayError>();

        let err = RelayError::decode("x");
        let _: &dyn std::error::Error = &err;
    }

    #[test]
    fn io_error_converts_to_transport() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Transport { .. }));
    }
}
