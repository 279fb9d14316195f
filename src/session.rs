//! Relay session: the explicit owner of geometry, rotation, ring, and
//! pipeline buffers.
//!
//! Two roles drive a session from distinct execution contexts. The producer
//! feeds demuxed frames through `store_frame`; the consumer calls
//! `present_next` on its own cadence. The ring lives behind a mutex so
//! cursor/count transitions are serialized; the consumer copies the winning
//! compressed frame into its own staging buffer under that lock and decodes
//! after releasing it, so a slot is never read while mid-write.
//!
//! There is no per-frame cancellation: teardown is wholesale (drop the
//! session, close the transport) and a fresh session is built to retry.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::decode::JpegDecoder;
use crate::error::{RelayError, Result};
use crate::raster::{test_pattern, Geometry, PlaneRaster};
use crate::ring::{CompressedFrame, FrameRing, Paced};
use crate::scale::PlaneScaler;
use crate::sink::FrameSink;
use crate::transform::{Rotation, Transformer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer/consumer shared state, serialized by one mutex.
struct Shared {
    ring: FrameRing,
    source: Option<Geometry>,
}

/// Consumer-side decode state. Behind its own mutex, touched only by the
/// display role; uncontended in normal operation.
struct Pipeline {
    decoder: JpegDecoder,
    scaler: PlaneScaler,
    transformer: Transformer,
    /// Consumer-owned copy of the frame handed out by the ring.
    staging: CompressedFrame,
    /// Most recently decoded/scaled/transformed raster; re-presented while
    /// the ring is below its target depth.
    current: PlaneRaster,
}

pub struct RelaySession {
    output: Geometry,
    shared: Mutex<Shared>,
    pipeline: Mutex<Pipeline>,
}

impl RelaySession {
    pub fn new(output: Geometry, target_depth: usize, rotation: Rotation) -> Result<Self> {
        let mut transformer = Transformer::new();
        transformer.set_angle(rotation);
        Ok(Self {
            output,
            shared: Mutex::new(Shared {
                ring: FrameRing::new(target_depth),
                source: None,
            }),
            pipeline: Mutex::new(Pipeline {
                decoder: JpegDecoder::new()?,
                scaler: PlaneScaler::new()?,
                transformer,
                staging: CompressedFrame::new(),
                current: test_pattern(output),
            }),
        })
    }

    pub fn output_geometry(&self) -> Geometry {
        self.output
    }

    pub fn source_geometry(&self) -> Option<Geometry> {
        lock(&self.shared).source
    }

    /// Records the negotiated source geometry (from the stream handshake).
    /// Sessions negotiate once; a differing second negotiation is a
    /// `GeometryMismatch`, since the ring's slot layout is already committed.
    pub fn negotiate_source(&self, geometry: Geometry) -> Result<()> {
        let mut shared = lock(&self.shared);
        match shared.source {
            None => {
                log::info!("source geometry {} negotiated", geometry);
                shared.source = Some(geometry);
                Ok(())
            }
            Some(existing) if existing == geometry => Ok(()),
            Some(existing) => Err(RelayError::GeometryMismatch {
                expected: existing,
                actual: geometry,
            }),
        }
    }

    /// Producer side: stores one demuxed compressed frame.
    pub fn store_frame(&self, bytes: &[u8]) -> Result<()> {
        lock(&self.shared).ring.store_next_frame(bytes);
        Ok(())
    }

    /// Sets the ring's latency/smoothness trade-off.
    pub fn set_target_depth(&self, depth: usize) {
        lock(&self.shared).ring.set_target_depth(depth);
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        lock(&self.pipeline).transformer.set_angle(rotation);
    }

    /// Advances the rotation by one 90-degree step.
    pub fn rotate_step(&self) {
        lock(&self.pipeline).transformer.step();
    }

    pub fn rotation(&self) -> Rotation {
        lock(&self.pipeline).transformer.angle()
    }

    /// Frames discarded by the pacing catch-up policy so far.
    pub fn frames_dropped(&self) -> u64 {
        lock(&self.shared).ring.frames_dropped()
    }

    /// Consumer side: runs the pacing step and presents a raster.
    ///
    /// When the ring yields a frame it is decoded, scaled to the output
    /// geometry, rotated, and becomes the current raster; otherwise the
    /// previous raster is re-presented so the sink's cadence never breaks.
    /// Returns `true` when a freshly decoded frame was presented.
    ///
    /// A non-fatal decode failure drops that frame and keeps the session
    /// alive; every session-fatal error propagates to the caller for
    /// teardown, with nothing presented for the offending frame.
    pub fn present_next(&self, sink: &mut dyn FrameSink) -> Result<bool> {
        let mut pipeline = lock(&self.pipeline);

        let staged = {
            let mut shared = lock(&self.shared);
            let negotiated = shared.source;
            match shared.ring.next_display_frame() {
                Paced::Frame(frame) => {
                    pipeline.staging.copy_from(frame.bytes());
                    Some(negotiated)
                }
                Paced::Starved => None,
            }
        };

        let mut fresh = false;
        if let Some(negotiated) = staged {
            match self.render(&mut pipeline, negotiated) {
                Ok(()) => fresh = true,
                Err(err) if !err.is_session_fatal() => {
                    log::warn!("dropping undecodable frame: {}", err);
                }
                Err(err) => return Err(err),
            }
        }

        sink.present(pipeline.current.data())?;
        Ok(fresh)
    }

    /// Decodes, scales, and rotates the staged frame into the current raster.
    fn render(&self, pipeline: &mut Pipeline, negotiated: Option<Geometry>) -> Result<()> {
        let source = match negotiated {
            Some(geometry) => geometry,
            None => {
                // streams without a handshake negotiate from the first frame
                let geometry = pipeline.decoder.read_header(pipeline.staging.bytes())?;
                lock(&self.shared).source = Some(geometry);
                log::info!("source geometry {} negotiated from first frame", geometry);
                geometry
            }
        };
        let raster = pipeline.decoder.decode(pipeline.staging.bytes(), source)?;
        let scaled = pipeline.scaler.scale(raster, self.output)?;
        pipeline.current.copy_from(scaled);
        pipeline.transformer.apply(&mut pipeline.current);
        Ok(())
    }
}
