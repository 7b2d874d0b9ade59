//! Rolling per-participant voice buffers with on-demand WAV evidence export.
//!
//! Audio frames arrive from a voice transport on latency-sensitive threads.
//! They are format-checked, copied and handed to a single worker task that
//! owns every [`RollingBuffer`](evidence::RollingBuffer). Moderators can ask
//! for the last N seconds of any monitored participant at any time without
//! pausing capture.

pub mod config;
pub mod evidence;
pub mod voice;

pub use config::{ConfigError, EvidenceConfig};
pub use evidence::{
    AudioFrame, BufferManager, BufferWorker, EvidenceFile, EvidenceSession, ExportError,
    FrameFormat, FrameObserver, Participant, PendingExport, RollingBuffer, Transport,
};
