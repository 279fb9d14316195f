//! Bounded compressed-frame ring with depth-bounded pacing.
//!
//! The ring holds incoming compressed frames in fixed slots and decides, on
//! the display side, which single frame becomes displayable per call. When
//! arrival outpaces the configured target depth, the *oldest* undisplayed
//! frames are discarded without ever being decoded, keeping end-to-end
//! latency bounded at the target depth instead of growing without limit.
//!
//! Cursor and count transitions must be serialized across the producer and
//! consumer roles; `RelaySession` wraps the ring in a mutex for that.

/// Build-time slot count.
pub const RING_SLOTS: usize = 10;

/// One ring slot: an owned byte buffer plus a valid-length field.
///
/// The buffer is overwritten in place on each new frame and grows only when
/// its capacity is insufficient. It is never shared outside its slot.
pub struct CompressedFrame {
    data: Vec<u8>,
    len: usize,
}

impl CompressedFrame {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            len: 0,
        }
    }

    /// Overwrites the slot content, growing the buffer only if needed.
    pub fn copy_from(&mut self, bytes: &[u8]) {
        if self.data.len() < bytes.len() {
            self.data.resize(bytes.len(), 0);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
    }

    /// The valid content of the slot.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for CompressedFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one display-side pacing step.
pub enum Paced<'a> {
    /// The one frame that becomes displayable this call.
    Frame(&'a CompressedFrame),
    /// Fewer than `target_depth` frames are buffered; nothing to decode yet.
    Starved,
}

/// Fixed-capacity ring of compressed-frame slots with independent store and
/// display cursors.
pub struct FrameRing {
    slots: [CompressedFrame; RING_SLOTS],
    store_cursor: usize,
    display_cursor: usize,
    buffered: usize,
    target_depth: usize,
    stored: u64,
    dropped: u64,
}

impl FrameRing {
    pub fn new(target_depth: usize) -> Self {
        Self {
            slots: std::array::from_fn(|_| CompressedFrame::new()),
            store_cursor: 0,
            display_cursor: 0,
            buffered: 0,
            target_depth: target_depth.clamp(1, RING_SLOTS),
            stored: 0,
            dropped: 0,
        }
    }

    /// Sets the latency/smoothness trade-off, clamped to [1, RING_SLOTS].
    pub fn set_target_depth(&mut self, depth: usize) {
        self.target_depth = depth.clamp(1, RING_SLOTS);
        log::debug!("buffering {} frames", self.target_depth);
    }

    pub fn target_depth(&self) -> usize {
        self.target_depth
    }

    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Frames discarded by the catch-up policy (and producer overruns).
    pub fn frames_dropped(&self) -> u64 {
        self.dropped
    }

    pub fn frames_stored(&self) -> u64 {
        self.stored
    }

    fn advance(cursor: usize) -> usize {
        (cursor + 1) % RING_SLOTS
    }

    fn drop_oldest(&mut self) {
        self.display_cursor = Self::advance(self.display_cursor);
        self.buffered -= 1;
        self.dropped += 1;
    }

    /// Copies `bytes` into the slot at the store cursor. No decode happens
    /// here. If the producer has lapped the consumer entirely, the oldest
    /// undisplayed frame is discarded first so the count never exceeds the
    /// slot capacity.
    pub fn store_next_frame(&mut self, bytes: &[u8]) {
        if self.buffered == RING_SLOTS {
            self.drop_oldest();
        }
        self.slots[self.store_cursor].copy_from(bytes);
        self.store_cursor = Self::advance(self.store_cursor);
        self.buffered += 1;
        self.stored += 1;
    }

    /// Runs the pacing algorithm: discard oldest frames down to the target
    /// depth, then hand out exactly one frame when the depth is reached.
    pub fn next_display_frame(&mut self) -> Paced<'_> {
        while self.buffered > self.target_depth {
            self.drop_oldest();
        }
        if self.buffered == self.target_depth {
            let index = self.display_cursor;
            self.display_cursor = Self::advance(self.display_cursor);
            self.buffered -= 1;
            Paced::Frame(&self.slots[index])
        } else {
            Paced::Starved
        }
    }

    /// Empties the ring (session teardown / restart).
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.clear();
        }
        self.store_cursor = 0;
        self.display_cursor = 0;
        self.buffered = 0;
    }
}
