//! Arbitration between background playback and the voice pipeline.
//!
//! The voice loop is the only writer of [`VoiceState`]; everything else reads it.
//! State changes bump a generation counter under a mutex and wake waiters, so a
//! stalled playback loop resumes as soon as the voice pipeline returns to idle.
//!
//! [`Codec`] owns the output sink. Every reconfigure-and-write sequence goes through
//! its lock, so a rate change can never interleave with another task's chunk.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use naphome_types::VoiceState;

use crate::error::Result;
use crate::sink::AudioSink;

/// Shared playback flags plus the voice state machine.
pub struct Arbiter {
    voice: AtomicU8,
    user_paused: AtomicBool,
    enabled: AtomicBool,
    holds: AtomicUsize,
    generation: Mutex<u64>,
    changed: Condvar,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self {
            voice: AtomicU8::new(VoiceState::Idle.as_u8()),
            user_paused: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            holds: AtomicUsize::new(0),
            generation: Mutex::new(0),
            changed: Condvar::new(),
        }
    }
}

impl Arbiter {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn voice_state(&self) -> VoiceState {
        VoiceState::from_u8(self.voice.load(Ordering::Acquire))
    }

    pub fn is_voice_active(&self) -> bool {
        self.voice_state() != VoiceState::Idle
    }

    /// Move the voice state machine. Returns the previous state.
    pub fn set_voice_state(&self, state: VoiceState) -> VoiceState {
        let prev = VoiceState::from_u8(self.voice.swap(state.as_u8(), Ordering::AcqRel));
        if prev != state {
            tracing::debug!(from = ?prev, to = ?state, "voice state");
            self.notify();
        }
        prev
    }

    pub fn set_user_paused(&self, paused: bool) {
        self.user_paused.store(paused, Ordering::Release);
        self.notify();
    }

    pub fn is_user_paused(&self) -> bool {
        self.user_paused.load(Ordering::Acquire)
    }

    /// Background audio master switch. Disabling stops the current background request.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        self.notify();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stall background playback until the returned guard drops. Used while a
    /// spoken reply owns the codec outside a voice session.
    pub fn hold_background(self: &Arc<Self>) -> BackgroundHold {
        self.holds.fetch_add(1, Ordering::AcqRel);
        self.notify();
        BackgroundHold {
            arbiter: self.clone(),
        }
    }

    /// Whether background playback must stall before its next chunk.
    pub fn should_pause(&self) -> bool {
        self.is_user_paused()
            || self.is_voice_active()
            || self.holds.load(Ordering::Acquire) > 0
    }

    /// Block until background playback may write its next chunk.
    ///
    /// Returns `false` when `cancel` is raised or background audio is disabled while
    /// waiting. Never drops audio: the caller simply resumes where it stalled.
    pub fn wait_until_playable(&self, cancel: &AtomicBool, poll: Duration) -> bool {
        loop {
            if cancel.load(Ordering::Acquire) || !self.is_enabled() {
                return false;
            }
            if !self.should_pause() {
                return true;
            }
            let seen = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            let start = *seen;
            let (guard, _) = self
                .changed
                .wait_timeout_while(seen, poll, |g| *g == start)
                .unwrap_or_else(PoisonError::into_inner);
            drop(guard);
        }
    }

    fn notify(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        drop(generation);
        self.changed.notify_all();
    }
}

pub struct BackgroundHold {
    arbiter: Arc<Arbiter>,
}

impl Drop for BackgroundHold {
    fn drop(&mut self) {
        self.arbiter.holds.fetch_sub(1, Ordering::AcqRel);
        self.arbiter.notify();
    }
}

/// Mutex-guarded output sink with software gain.
pub struct Codec {
    sink: Mutex<Box<dyn AudioSink>>,
    volume_percent: AtomicU8,
    arbiter: Arc<Arbiter>,
}

/// Exclusive access to the sink for one reconfigure-and-write sequence.
pub struct CodecGuard<'a> {
    sink: MutexGuard<'a, Box<dyn AudioSink>>,
    gain: u8,
}

impl Codec {
    pub fn new(sink: Box<dyn AudioSink>, arbiter: Arc<Arbiter>) -> Self {
        Self {
            sink: Mutex::new(sink),
            volume_percent: AtomicU8::new(100),
            arbiter,
        }
    }

    pub fn arbiter(&self) -> &Arc<Arbiter> {
        &self.arbiter
    }

    pub fn acquire(&self) -> CodecGuard<'_> {
        CodecGuard {
            sink: self.sink.lock().unwrap_or_else(PoisonError::into_inner),
            gain: self.volume(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.acquire().sample_rate()
    }

    pub fn device_name(&self) -> Option<String> {
        self.acquire().sink.device_name()
    }

    /// Reconfigure the output rate unless the voice state is non-idle when checked.
    ///
    /// The check runs under the sink lock but voice state changes do not take it,
    /// so a wake word landing between the check and the reconfigure is not seen.
    /// Returns `true` when the codec runs at `sample_rate` afterwards.
    pub fn reconfigure_unless_voice_active(&self, sample_rate: u32) -> Result<bool> {
        let mut guard = self.acquire();
        if guard.sample_rate() == sample_rate {
            return Ok(true);
        }
        if self.arbiter.is_voice_active() {
            tracing::info!(
                requested_hz = sample_rate,
                codec_hz = guard.sample_rate(),
                "voice pipeline active, keeping codec rate"
            );
            return Ok(false);
        }
        guard.reconfigure(sample_rate)?;
        tracing::info!(rate_hz = sample_rate, "codec reconfigured");
        Ok(true)
    }

    /// Write one chunk under the codec lock.
    pub fn write_chunk(&self, samples: &[i16]) -> Result<()> {
        self.acquire().write(samples)
    }

    pub fn volume(&self) -> u8 {
        self.volume_percent.load(Ordering::Relaxed)
    }

    /// Set the software gain, clamped to 0..=100. Returns the applied value.
    pub fn set_volume(&self, percent: u8) -> u8 {
        let percent = percent.min(100);
        self.volume_percent.store(percent, Ordering::Relaxed);
        percent
    }
}

impl CodecGuard<'_> {
    pub fn sample_rate(&self) -> u32 {
        self.sink.sample_rate()
    }

    pub fn reconfigure(&mut self, sample_rate: u32) -> Result<()> {
        self.sink.reconfigure(sample_rate)
    }

    pub fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.gain >= 100 {
            return self.sink.write(samples);
        }
        let gain = self.gain as i32;
        let scaled: Vec<i16> = samples
            .iter()
            .map(|&s| (s as i32 * gain / 100) as i16)
            .collect();
        self.sink.write(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn voice_activity_pauses_background_audio() {
        let arbiter = Arbiter::default();
        assert!(!arbiter.should_pause());
        assert_eq!(arbiter.set_voice_state(VoiceState::Listening), VoiceState::Idle);
        assert!(arbiter.should_pause());
        arbiter.set_voice_state(VoiceState::Idle);
        arbiter.set_user_paused(true);
        assert!(arbiter.should_pause());
    }

    #[test]
    fn waiter_resumes_when_voice_returns_to_idle() {
        let arbiter = Arbiter::shared();
        arbiter.set_voice_state(VoiceState::Processing);
        let cancel = Arc::new(AtomicBool::new(false));

        let waiter = {
            let arbiter = arbiter.clone();
            let cancel = cancel.clone();
            thread::spawn(move || arbiter.wait_until_playable(&cancel, Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(30));
        let started = Instant::now();
        arbiter.set_voice_state(VoiceState::Idle);
        assert!(waiter.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn background_hold_lasts_until_dropped() {
        let arbiter = Arbiter::shared();
        let first = arbiter.hold_background();
        let second = arbiter.hold_background();
        assert!(arbiter.should_pause());
        drop(first);
        assert!(arbiter.should_pause());
        drop(second);
        assert!(!arbiter.should_pause());
    }

    #[test]
    fn waiter_gives_up_on_cancel_or_disable() {
        let arbiter = Arbiter::default();
        arbiter.set_user_paused(true);
        let cancel = AtomicBool::new(true);
        assert!(!arbiter.wait_until_playable(&cancel, Duration::from_millis(5)));

        let cancel = AtomicBool::new(false);
        arbiter.set_enabled(false);
        assert!(!arbiter.wait_until_playable(&cancel, Duration::from_millis(5)));
    }

    #[test]
    fn reconfigure_is_skipped_while_voice_is_active() {
        let arbiter = Arbiter::shared();
        let sink = MemorySink::new(16_000);
        let codec = Codec::new(Box::new(sink.clone()), arbiter.clone());

        arbiter.set_voice_state(VoiceState::Listening);
        assert!(!codec.reconfigure_unless_voice_active(44_100).unwrap());
        assert_eq!(codec.sample_rate(), 16_000);

        arbiter.set_voice_state(VoiceState::Idle);
        assert!(codec.reconfigure_unless_voice_active(44_100).unwrap());
        assert_eq!(codec.sample_rate(), 44_100);
        assert!(codec.reconfigure_unless_voice_active(44_100).unwrap());
        assert_eq!(sink.log().reconfigures, vec![44_100]);
    }

    #[test]
    fn volume_scales_written_samples() {
        let sink = MemorySink::new(16_000);
        let codec = Codec::new(Box::new(sink.clone()), Arbiter::shared());
        assert_eq!(codec.set_volume(150), 100);
        codec.write_chunk(&[1000, -1000]).unwrap();
        codec.set_volume(50);
        codec.write_chunk(&[1000, -1001]).unwrap();
        assert_eq!(sink.log().samples, vec![1000, -1000, 500, -500]);
    }
}
