/// Playback tuning shared by the chunk loop and the device sink.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Samples written to the sink per call.
    pub chunk_samples: usize,
    /// How long a stalled loop waits between pause checks.
    pub pause_poll_ms: u64,
    /// Rate the codec starts at before any WAV reconfigures it.
    pub initial_sample_rate: u32,
    /// Device queue depth in seconds of audio.
    pub buffer_seconds: f32,
}

pub const MIN_CHUNK_SAMPLES: usize = 256;
pub const MAX_CHUNK_SAMPLES: usize = 4096;

impl PlaybackConfig {
    /// Chunk size clamped to the range the codec path is tuned for.
    pub fn effective_chunk_samples(&self) -> usize {
        self.chunk_samples.clamp(MIN_CHUNK_SAMPLES, MAX_CHUNK_SAMPLES)
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_samples: 1024,
            pause_poll_ms: 10,
            initial_sample_rate: 16_000,
            buffer_seconds: 0.5,
        }
    }
}
