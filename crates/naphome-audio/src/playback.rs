//! Chunked playback loop.
//!
//! Mono PCM is written to the codec in fixed-size chunks. Before each chunk a
//! background request checks the arbiter and stalls while playback is paused, so
//! audio is delayed rather than dropped. Voice replies skip the pause check; the
//! voice pipeline is what raised it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::arbiter::Codec;
use crate::error::{AudioError, Result};

/// Who is asking for the codec.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    /// Music, test tones, demo assets. Stalls while the voice pipeline is active.
    #[default]
    Background,
    /// Spoken replies. Never stalls on arbitration.
    Voice,
}

/// Per-request knobs for the playback loop.
#[derive(Clone, Debug)]
pub struct PlaybackSessionOptions {
    pub priority: Priority,
    pub chunk_samples: usize,
    pub pause_poll: Duration,
    /// Raised to stop the request before its next chunk.
    pub cancel: Arc<AtomicBool>,
    /// Incremented by the number of samples written.
    pub played_samples: Option<Arc<AtomicU64>>,
    /// Rate the background request expects. Re-applied after a stall, since a
    /// reply spoken during the stall may have moved the codec.
    pub session_rate: Option<u32>,
}

impl PlaybackSessionOptions {
    pub fn new(priority: Priority, chunk_samples: usize) -> Self {
        Self {
            priority,
            chunk_samples: chunk_samples.max(1),
            pause_poll: Duration::from_millis(10),
            cancel: Arc::new(AtomicBool::new(false)),
            played_samples: None,
            session_rate: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub writes: usize,
    pub samples: usize,
    /// Time spent stalled on arbitration.
    pub stalled: Duration,
}

impl PlaybackReport {
    pub fn absorb(&mut self, other: &PlaybackReport) {
        self.writes += other.writes;
        self.samples += other.samples;
        self.stalled += other.stalled;
    }
}

/// Stream mono `samples` to the codec, one chunk per write.
///
/// Issues `ceil(samples.len() / chunk_samples)` writes when nothing cancels it.
pub fn play_pcm(
    codec: &Codec,
    samples: &[i16],
    opts: &PlaybackSessionOptions,
) -> Result<PlaybackReport> {
    let mut report = PlaybackReport::default();
    let chunk_samples = opts.chunk_samples.max(1);

    for chunk in samples.chunks(chunk_samples) {
        match opts.priority {
            Priority::Background => {
                if codec.arbiter().should_pause() {
                    let stalled_at = Instant::now();
                    tracing::debug!("background playback stalled");
                    let playable = codec
                        .arbiter()
                        .wait_until_playable(&opts.cancel, opts.pause_poll);
                    report.stalled += stalled_at.elapsed();
                    if !playable {
                        return Err(AudioError::Cancelled);
                    }
                    if let Some(rate) = opts.session_rate {
                        codec.reconfigure_unless_voice_active(rate)?;
                    }
                } else if opts.cancel.load(Ordering::Acquire) || !codec.arbiter().is_enabled() {
                    return Err(AudioError::Cancelled);
                }
            }
            Priority::Voice => {
                if opts.cancel.load(Ordering::Acquire) {
                    return Err(AudioError::Cancelled);
                }
            }
        }

        codec.write_chunk(chunk)?;
        report.writes += 1;
        report.samples += chunk.len();
        if let Some(played) = &opts.played_samples {
            played.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        }
    }

    Ok(report)
}
