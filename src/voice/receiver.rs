use super::audio::{SAMPLES_PER_TICK, pcm_bytes, stereo_to_mono};
use crate::evidence::{AudioFrame, FrameFormat, FrameObserver, Transport};
use dashmap::DashMap;
use songbird::{
    Event, EventContext, EventHandler, events::context_data::VoiceTick, model::payload::Speaking,
};
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Bridges songbird's per-speaker voice ticks to a [`FrameObserver`].
///
/// Discord identifies audio streams by SSRC; speaking-state updates tell us
/// which user owns each SSRC. Ticks from SSRCs we have not mapped yet are
/// skipped.
pub struct VoiceTap {
    observer: RwLock<Option<Arc<dyn FrameObserver>>>,
    ssrc_map: DashMap<u32, u64>,
}

impl VoiceTap {
    pub fn new() -> Self {
        Self {
            observer: RwLock::new(None),
            ssrc_map: DashMap::new(),
        }
    }

    /// Event handler to register on a songbird call for
    /// `SpeakingStateUpdate` and `VoiceTick`.
    pub fn receiver(self: &Arc<Self>) -> Receiver {
        Receiver {
            tap: Arc::clone(self),
        }
    }

    pub fn map_ssrc(&self, ssrc: u32, user_id: u64) {
        if self.ssrc_map.insert(ssrc, user_id) != Some(user_id) {
            debug!("SSRC {} belongs to user {}", ssrc, user_id);
        }
    }

    pub fn user_for(&self, ssrc: u32) -> Option<u64> {
        self.ssrc_map.get(&ssrc).map(|entry| *entry.value())
    }

    pub fn forget_user(&self, user_id: u64) {
        self.ssrc_map.retain(|_, owner| *owner != user_id);
    }

    /// Downmixes one decoded stereo tick and hands it to the observer as a
    /// 48 kHz mono frame.
    pub fn deliver(&self, ssrc: u32, decoded: &[i16]) -> bool {
        let Some(user_id) = self.user_for(ssrc) else {
            trace!("Skipping voice from unmapped SSRC {}", ssrc);
            return true;
        };
        let Some(observer) = self.observer() else {
            return true;
        };
        if decoded.is_empty() {
            return true;
        }

        let mono = stereo_to_mono(decoded);
        let payload = pcm_bytes(&mono);
        let frame = AudioFrame::new(FrameFormat::VOICE, mono.len(), &payload);
        observer.on_remote_frame(user_id, &frame)
    }

    /// Delivers a zeroed tick for a mapped user who sent nothing this tick,
    /// so buffered audio keeps wall-clock spacing between bursts of speech.
    pub fn deliver_silence(&self, ssrc: u32) -> bool {
        let Some(user_id) = self.user_for(ssrc) else {
            return true;
        };
        let Some(observer) = self.observer() else {
            return true;
        };

        let payload = [0u8; SAMPLES_PER_TICK * 2];
        let frame = AudioFrame::new(FrameFormat::VOICE, SAMPLES_PER_TICK, &payload);
        observer.on_remote_frame(user_id, &frame)
    }

    fn observer(&self) -> Option<Arc<dyn FrameObserver>> {
        self.observer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for VoiceTap {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for VoiceTap {
    fn set_frame_observer(&self, observer: Option<Arc<dyn FrameObserver>>) {
        *self
            .observer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = observer;
    }

    // Songbird has no local capture and its decode format is fixed when the
    // driver is configured, so requests can only be checked.
    fn configure_playback(&self, format: FrameFormat) {
        if format != FrameFormat::VOICE {
            debug!("Voice ticks are always delivered as {}, not {}", FrameFormat::VOICE, format);
        }
    }
}

pub struct Receiver {
    tap: Arc<VoiceTap>,
}

#[async_trait::async_trait]
impl EventHandler for Receiver {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::SpeakingStateUpdate(Speaking { ssrc, user_id, .. }) => {
                if let Some(user_id) = user_id {
                    self.tap.map_ssrc(*ssrc, user_id.0);
                }
            }
            EventContext::VoiceTick(VoiceTick {
                speaking, silent, ..
            }) => {
                for (ssrc, voice_data) in speaking {
                    match &voice_data.decoded_voice {
                        Some(decoded) => self.tap.deliver(*ssrc, decoded),
                        None => self.tap.deliver_silence(*ssrc),
                    };
                }
                for ssrc in silent {
                    self.tap.deliver_silence(*ssrc);
                }
            }
            _ => {}
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<(u64, FrameFormat, usize, Vec<u8>)>>,
    }

    impl FrameObserver for Recorder {
        fn on_local_frame(&self, _frame: &AudioFrame<'_>) -> bool {
            true
        }

        fn on_remote_frame(&self, user_id: u64, frame: &AudioFrame<'_>) -> bool {
            self.frames.lock().unwrap().push((
                user_id,
                frame.format,
                frame.sample_count,
                frame.payload.to_vec(),
            ));
            false
        }
    }

    #[test]
    fn test_unmapped_ssrc_is_skipped() {
        let tap = VoiceTap::new();
        let recorder = Arc::new(Recorder::default());
        tap.set_frame_observer(Some(recorder.clone()));

        assert!(tap.deliver(7, &[1, 1, 2, 2]));
        assert!(recorder.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mapped_ssrc_delivers_mono_frame() {
        let tap = VoiceTap::new();
        let recorder = Arc::new(Recorder::default());
        tap.set_frame_observer(Some(recorder.clone()));
        tap.map_ssrc(7, 1234);

        assert!(!tap.deliver(7, &[100, 300, -4, -2]));

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let (user_id, format, samples, payload) = &frames[0];
        assert_eq!(*user_id, 1234);
        assert_eq!(*format, FrameFormat::VOICE);
        assert_eq!(*samples, 2);
        assert_eq!(payload, &pcm_bytes(&[200, -3]));
    }

    #[test]
    fn test_detached_observer_passes() {
        let tap = VoiceTap::new();
        let recorder = Arc::new(Recorder::default());
        tap.map_ssrc(7, 1);
        tap.set_frame_observer(Some(recorder.clone()));
        tap.set_frame_observer(None);

        assert!(tap.deliver(7, &[1, 1]));
        assert!(recorder.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_silent_tick_delivers_zeroed_frame() {
        let tap = VoiceTap::new();
        let recorder = Arc::new(Recorder::default());
        tap.set_frame_observer(Some(recorder.clone()));
        tap.map_ssrc(7, 1234);

        assert!(tap.deliver_silence(8));
        assert!(recorder.frames.lock().unwrap().is_empty());

        assert!(!tap.deliver_silence(7));
        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let (user_id, format, samples, payload) = &frames[0];
        assert_eq!(*user_id, 1234);
        assert_eq!(*format, FrameFormat::VOICE);
        assert_eq!(*samples, 960);
        assert_eq!(payload.len(), 1_920);
        assert!(payload.iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn test_silence_keeps_gap_between_speech() {
        use crate::config::EvidenceConfig;
        use crate::evidence::{EvidenceSession, Participant};

        let tmp = tempfile::tempdir().unwrap();
        let config = EvidenceConfig {
            export_dir: tmp.path().to_path_buf(),
            ..EvidenceConfig::default()
        };
        let tap = Arc::new(VoiceTap::new());
        let session = EvidenceSession::start(&config, tap.clone(), None);
        session.on_session_started();
        session.on_participant_joined(55, false);
        tap.map_ssrc(9, 55);

        let speech = vec![100i16; SAMPLES_PER_TICK * 2];
        tap.deliver(9, &speech);
        for _ in 0..3 {
            tap.deliver_silence(9);
        }
        tap.deliver(9, &speech);

        let file = session.request_report(Participant::Remote(55)).await.unwrap();
        assert_eq!(file.data_bytes, 5 * 1_920);

        let mut reader = hound::WavReader::open(&file.path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert!(samples[..960].iter().all(|s| *s == 100));
        assert!(samples[960..4 * 960].iter().all(|s| *s == 0));
        assert!(samples[4 * 960..].iter().all(|s| *s == 100));

        session.teardown().await;
    }

    #[test]
    fn test_forget_user_drops_all_ssrcs() {
        let tap = VoiceTap::new();
        tap.map_ssrc(1, 10);
        tap.map_ssrc(2, 10);
        tap.map_ssrc(3, 20);

        tap.forget_user(10);
        assert_eq!(tap.user_for(1), None);
        assert_eq!(tap.user_for(2), None);
        assert_eq!(tap.user_for(3), Some(20));
    }

    #[tokio::test]
    async fn test_frames_reach_buffer_manager() {
        use crate::config::EvidenceConfig;
        use crate::evidence::{EvidenceSession, Participant};

        let tmp = tempfile::tempdir().unwrap();
        let config = EvidenceConfig {
            export_dir: tmp.path().to_path_buf(),
            ..EvidenceConfig::default()
        };
        let tap = Arc::new(VoiceTap::new());
        let session = EvidenceSession::start(&config, tap.clone(), None);
        session.on_session_started();
        session.on_participant_joined(55, false);
        tap.map_ssrc(9, 55);

        let tick: Vec<i16> = (0..1_920).map(|i| (i % 100) as i16).collect();
        tap.deliver(9, &tick);

        let file = session.request_report(Participant::Remote(55)).await.unwrap();
        assert_eq!(file.data_bytes, 1_920);

        let mut reader = hound::WavReader::open(&file.path).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, stereo_to_mono(&tick));

        session.teardown().await;
    }
}
