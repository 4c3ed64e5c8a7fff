//! MP3 frame loop.
//!
//! The loop owns framing policy only. Turning one MPEG frame into PCM is the job of
//! a [`FrameDecoder`]; the loop decides what to do with each result:
//! - implausible result: advance one byte and count a failure (resync)
//! - empty frame: skip it and count a failure
//! - good frame: downmix to mono and hand it to the caller
//!
//! Two ceilings keep the loop bounded on arbitrary input: [`MAX_CONSECUTIVE_FAILURES`]
//! (stream is desynchronized) and [`MAX_FRAME_ATTEMPTS`] (runaway guard).

use crate::downmix::downmix_to_mono;
use crate::error::{AudioError, Result};

pub const MAX_CONSECUTIVE_FAILURES: u32 = 100;
pub const MAX_FRAME_ATTEMPTS: u32 = 10_000;

/// Smallest byte count a decoder may report for one frame (the frame header).
pub const MIN_FRAME_BYTES: i32 = 4;
/// Largest MPEG audio frame, free-format layer III at 640 kbit/s and 32 kHz.
pub const MAX_FRAME_BYTES: i32 = 2881;

const ID3V2_HEADER_LEN: usize = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;

/// What a [`FrameDecoder`] reports for one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameInfo {
    /// Samples per channel written to the output buffer. Negative means error.
    pub samples: i32,
    /// Bytes of input the frame occupied.
    pub frame_bytes: i32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Single-frame MPEG audio decoder.
pub trait FrameDecoder {
    /// Decode the frame at the start of `input`, appending interleaved PCM to `pcm`.
    fn decode_frame(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> FrameInfo;
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopStop {
    #[default]
    EndOfInput,
    Desynchronized,
    FrameLimit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Mp3Summary {
    /// Frames that produced PCM.
    pub frames: u32,
    /// Decoder invocations, good or bad.
    pub attempts: u32,
    pub failures: u32,
    /// Mono samples handed to the caller.
    pub samples: u64,
    /// Rate and source channel count of the first good frame.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub stop: LoopStop,
}

/// Byte offset of the first MPEG frame, past an optional leading ID3v2 tag.
///
/// The tag size is the synch-safe integer in bytes 6..10 plus the 10-byte header
/// (and a 10-byte footer when flagged). Results are clamped to the buffer length;
/// a buffer holding only part of a tag header is consumed entirely.
pub fn id3v2_skip(bytes: &[u8]) -> usize {
    if bytes.len() < 3 || &bytes[..3] != b"ID3" {
        return 0;
    }
    if bytes.len() < ID3V2_HEADER_LEN {
        return bytes.len();
    }
    let size = synchsafe(&bytes[6..10]);
    let mut skip = ID3V2_HEADER_LEN + size;
    if bytes[5] & ID3V2_FOOTER_FLAG != 0 {
        skip += ID3V2_HEADER_LEN;
    }
    skip.min(bytes.len())
}

fn synchsafe(b: &[u8]) -> usize {
    ((b[0] as usize & 0x7f) << 21)
        | ((b[1] as usize & 0x7f) << 14)
        | ((b[2] as usize & 0x7f) << 7)
        | (b[3] as usize & 0x7f)
}

/// Decode `bytes` frame by frame, passing each mono frame and its rate to `on_frame`.
///
/// `codec_rate` is the rate the output is currently configured for. MP3 playback never
/// reconfigures the codec; a mismatch is logged once and played as-is.
///
/// Returns [`AudioError::NotSupported`] when no frame could be decoded. Errors from
/// `on_frame` stop the loop and are returned unchanged.
pub fn decode_mp3<D, F>(
    bytes: &[u8],
    decoder: &mut D,
    codec_rate: Option<u32>,
    mut on_frame: F,
) -> Result<Mp3Summary>
where
    D: FrameDecoder + ?Sized,
    F: FnMut(&[i16], u32) -> Result<()>,
{
    let mut summary = Mp3Summary::default();
    let mut offset = id3v2_skip(bytes);
    let mut consecutive_failures = 0u32;
    let mut rate_warned = false;
    let mut pcm: Vec<i16> = Vec::new();

    if offset > 0 {
        tracing::debug!(offset, "skipped id3v2 tag");
    }

    while offset < bytes.len() {
        if summary.attempts >= MAX_FRAME_ATTEMPTS {
            tracing::warn!(attempts = summary.attempts, "mp3 frame limit reached");
            summary.stop = LoopStop::FrameLimit;
            break;
        }
        summary.attempts += 1;

        pcm.clear();
        let remaining = bytes.len() - offset;
        let info = decoder.decode_frame(&bytes[offset..], &mut pcm);

        let plausible = info.samples >= 0
            && (MIN_FRAME_BYTES..=MAX_FRAME_BYTES).contains(&info.frame_bytes)
            && info.frame_bytes as usize <= remaining;

        if !plausible {
            offset += 1;
        } else if info.samples == 0 {
            offset += info.frame_bytes as usize;
        } else {
            consecutive_failures = 0;
            summary.frames += 1;

            let channels = info.channels.max(1);
            let wanted = info.samples as usize * channels as usize;
            pcm.truncate(wanted);
            let mono = downmix_to_mono(&pcm, channels);

            if summary.sample_rate.is_none() {
                summary.sample_rate = Some(info.sample_rate);
                summary.channels = Some(channels);
            }
            if !rate_warned {
                if let Some(codec_rate) = codec_rate {
                    if codec_rate != info.sample_rate {
                        tracing::warn!(
                            stream_rate_hz = info.sample_rate,
                            codec_rate_hz = codec_rate,
                            "mp3 sample rate differs from codec rate"
                        );
                        rate_warned = true;
                    }
                }
            }

            summary.samples += mono.len() as u64;
            on_frame(&mono, info.sample_rate)?;
            offset += info.frame_bytes as usize;
            continue;
        }

        summary.failures += 1;
        consecutive_failures += 1;
        if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            tracing::warn!(
                offset,
                failures = summary.failures,
                "mp3 stream desynchronized"
            );
            summary.stop = LoopStop::Desynchronized;
            break;
        }
    }

    tracing::debug!(
        frames = summary.frames,
        attempts = summary.attempts,
        failures = summary.failures,
        stop = ?summary.stop,
        "mp3 loop finished"
    );

    if summary.frames == 0 {
        return Err(AudioError::NotSupported(
            "no decodable mp3 frames".to_string(),
        ));
    }
    Ok(summary)
}
