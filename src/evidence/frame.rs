//! Frame types and the seams to the voice transport.

use super::format::FrameFormat;
use std::fmt;
use std::sync::Arc;

/// Whose audio a frame or buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Participant {
    /// A remote participant, keyed by their numeric user id.
    Remote(u64),
    /// The locally captured microphone stream.
    Local,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Participant::Remote(id) => write!(f, "participant {}", id),
            Participant::Local => write!(f, "local participant"),
        }
    }
}

/// A decoded PCM frame as delivered by the transport.
///
/// The payload is only borrowed for the duration of the callback; anything
/// that outlives it must be copied.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub format: FrameFormat,
    /// Samples per channel
    pub sample_count: usize,
    pub payload: &'a [u8],
}

impl<'a> AudioFrame<'a> {
    pub fn new(format: FrameFormat, sample_count: usize, payload: &'a [u8]) -> Self {
        Self {
            format,
            sample_count,
            payload,
        }
    }

    /// True when the payload holds a whole number of sample blocks.
    pub fn is_aligned(&self) -> bool {
        let block = self.format.block_align();
        block != 0 && self.payload.len() % block == 0
    }
}

/// Receives frames from the transport.
///
/// Both callbacks may be invoked concurrently from real-time threads and must
/// not block. The return value is forwarded back to the transport as its
/// continuation flag.
pub trait FrameObserver: Send + Sync {
    /// A frame captured from the local microphone.
    fn on_local_frame(&self, frame: &AudioFrame<'_>) -> bool;

    /// A frame from one remote participant, before mixing.
    fn on_remote_frame(&self, user_id: u64, frame: &AudioFrame<'_>) -> bool;
}

/// The voice transport, injected as a capability.
pub trait Transport: Send + Sync {
    /// Installs the frame observer, or detaches it when `None`.
    fn set_frame_observer(&self, observer: Option<Arc<dyn FrameObserver>>);

    /// Asks the transport to deliver captured frames in `format`.
    fn configure_capture(&self, _format: FrameFormat) {}

    /// Asks the transport to deliver remote frames in `format`.
    fn configure_playback(&self, _format: FrameFormat) {}
}
