//! Discord voice transport built on songbird's receive events.

pub mod audio;
pub mod receiver;

pub use audio::{pcm_bytes, stereo_to_mono};
pub use receiver::{Receiver, VoiceTap};
