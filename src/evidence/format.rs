use std::fmt;
use std::time::Duration;

/// Sample rate of decoded voice audio
pub const SAMPLE_RATE: u32 = 48_000;
pub const CHANNELS: u16 = 1;
pub const BYTES_PER_SAMPLE: u16 = 2;

/// PCM layout of a frame. Samples are always signed little-endian integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
}

impl FrameFormat {
    /// 48 kHz mono 16-bit, the only format buffered by default.
    pub const VOICE: Self = Self {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        bytes_per_sample: BYTES_PER_SAMPLE,
    };

    pub const fn new(sample_rate: u32, channels: u16, bytes_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bytes_per_sample,
        }
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn block_align(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bytes_per_sample * 8
    }

    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align()
    }

    /// Buffer size needed to hold `window` worth of audio, rounded down to
    /// whole sample blocks.
    pub fn capacity_for(&self, window: Duration) -> usize {
        let frames = (self.sample_rate as u128 * window.as_millis()) / 1000;
        frames as usize * self.block_align()
    }

    /// Playback length of `bytes` of PCM in this format.
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }
}

impl Default for FrameFormat {
    fn default() -> Self {
        Self::VOICE
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}-bit",
            self.sample_rate,
            self.channels,
            self.bits_per_sample()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_format() {
        let format = FrameFormat::VOICE;
        assert_eq!(format.block_align(), 2);
        assert_eq!(format.bits_per_sample(), 16);
        assert_eq!(format.bytes_per_second(), 96_000);
    }

    #[test]
    fn test_capacity_for_window() {
        let format = FrameFormat::VOICE;
        assert_eq!(format.capacity_for(Duration::from_secs(30)), 30 * 96_000);
        assert_eq!(format.capacity_for(Duration::from_millis(20)), 1_920);

        let stereo = FrameFormat::new(44_100, 2, 2);
        assert_eq!(stereo.capacity_for(Duration::from_secs(1)), 176_400);
    }

    #[test]
    fn test_duration_of() {
        let format = FrameFormat::VOICE;
        assert_eq!(format.duration_of(96_000), Duration::from_secs(1));
        assert_eq!(format.duration_of(0), Duration::ZERO);
    }
}
