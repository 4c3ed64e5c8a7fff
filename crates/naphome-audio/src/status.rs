use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use naphome_types::{AudioStatus, PlaybackEndReason};

use crate::arbiter::Arbiter;

/// Shared playback status updated by the player worker.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    /// Asset name currently playing.
    pub now_playing: Option<String>,
    /// `wav` or `mp3`.
    pub asset_kind: Option<String>,
    /// Output device name.
    pub device: Option<String>,
    /// Codec rate while the current asset plays.
    pub sample_rate: Option<u32>,
    /// Channel count of the source before downmix.
    pub source_channels: Option<u16>,
    /// Samples written so far, shared with the playback loop.
    pub played_samples: Option<Arc<AtomicU64>>,
    pub frames_decoded: Option<u64>,
    pub decode_failures: Option<u64>,
    /// Terminal reason of the last request.
    pub end_reason: Option<PlaybackEndReason>,
}

impl PlayerStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Snapshot for the dashboard. Pause and volume come from the live arbiter/codec.
    pub fn snapshot(&self, arbiter: &Arbiter, volume_percent: u8) -> AudioStatus {
        let elapsed_ms = match (self.played_samples.as_ref(), self.sample_rate) {
            (Some(played), Some(sr)) if sr > 0 => {
                Some(played.load(Ordering::Relaxed).saturating_mul(1000) / sr as u64)
            }
            _ => None,
        };
        AudioStatus {
            now_playing: self.now_playing.clone(),
            asset_kind: self.asset_kind.clone(),
            paused: self.now_playing.is_some() && arbiter.should_pause(),
            elapsed_ms,
            sample_rate: self.sample_rate,
            source_channels: self.source_channels,
            device: self.device.clone(),
            volume_percent,
            frames_decoded: self.frames_decoded,
            decode_failures: self.decode_failures,
            end_reason: self.end_reason,
        }
    }

    /// Clear request-specific fields when playback ends.
    pub fn clear_playback(&mut self, reason: PlaybackEndReason) {
        self.now_playing = None;
        self.asset_kind = None;
        self.sample_rate = None;
        self.source_channels = None;
        self.played_samples = None;
        self.frames_decoded = None;
        self.decode_failures = None;
        self.end_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naphome_types::VoiceState;

    #[test]
    fn snapshot_reports_elapsed_and_paused() {
        let arbiter = Arbiter::default();
        let mut state = PlayerStatusState {
            now_playing: Some("welcome.wav".to_string()),
            sample_rate: Some(16_000),
            played_samples: Some(Arc::new(AtomicU64::new(8_000))),
            ..PlayerStatusState::default()
        };
        arbiter.set_voice_state(VoiceState::Listening);

        let snap = state.snapshot(&arbiter, 80);
        assert_eq!(snap.elapsed_ms, Some(500));
        assert!(snap.paused);
        assert_eq!(snap.volume_percent, 80);

        state.clear_playback(PlaybackEndReason::Eof);
        let snap = state.snapshot(&arbiter, 80);
        assert!(snap.now_playing.is_none());
        assert!(!snap.paused);
        assert_eq!(snap.end_reason, Some(PlaybackEndReason::Eof));
    }
}
