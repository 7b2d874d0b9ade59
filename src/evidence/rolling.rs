//! Fixed-capacity circular byte buffer holding the most recent audio of one
//! participant.

use super::format::FrameFormat;
use super::wav;
use std::io;
use std::time::Duration;

/// Overwrite-oldest ring of raw PCM bytes.
///
/// Until the first wrap only `storage[..cursor]` is live. Once full, the whole
/// region is live and the oldest byte sits at `cursor`.
#[derive(Debug)]
pub struct RollingBuffer {
    storage: Box<[u8]>,
    cursor: usize,
    full: bool,
    format: FrameFormat,
}

impl RollingBuffer {
    pub fn new(capacity: usize, format: FrameFormat) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            full: false,
            format,
        }
    }

    /// Buffer sized to hold `window` of audio in `format`.
    pub fn for_window(window: Duration, format: FrameFormat) -> Self {
        Self::new(format.capacity_for(window), format)
    }

    /// Appends `payload`, overwriting the oldest bytes once full.
    ///
    /// Returns `false` and leaves the buffer untouched when the payload is
    /// larger than the whole buffer.
    pub fn push(&mut self, payload: &[u8]) -> bool {
        let capacity = self.storage.len();
        if payload.len() > capacity {
            return false;
        }
        if payload.is_empty() {
            return true;
        }

        let tail = payload.len().min(capacity - self.cursor);
        self.storage[self.cursor..self.cursor + tail].copy_from_slice(&payload[..tail]);
        let head = payload.len() - tail;
        self.storage[..head].copy_from_slice(&payload[tail..]);

        if self.cursor + payload.len() >= capacity {
            self.full = true;
        }
        self.cursor = (self.cursor + payload.len()) % capacity;
        true
    }

    /// Live contents, oldest byte first. Does not modify the buffer.
    pub fn snapshot(&self) -> Vec<u8> {
        if !self.full {
            return self.storage[..self.cursor].to_vec();
        }

        let mut ordered = Vec::with_capacity(self.storage.len());
        ordered.extend_from_slice(&self.storage[self.cursor..]);
        ordered.extend_from_slice(&self.storage[..self.cursor]);
        ordered
    }

    /// Snapshot wrapped in a PCM WAV container.
    pub fn to_wav(&self) -> io::Result<Vec<u8>> {
        wav::encode(self.format, &self.snapshot())
    }

    /// Number of live bytes.
    pub fn len(&self) -> usize {
        if self.full { self.storage.len() } else { self.cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    /// Audio duration currently held.
    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.len())
    }
}
