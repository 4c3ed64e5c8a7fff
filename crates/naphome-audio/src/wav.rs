//! RIFF/WAVE container parsing.
//!
//! Only the two chunks playback needs are extracted:
//! - `fmt `: format code, channel count, sample rate, bit depth
//! - `data`: the PCM payload, returned as a borrowed slice of the input
//!
//! Every other chunk (`LIST`, `fact`, ...) is skipped using its declared size,
//! rounded up to an even length as RIFF requires.

use crate::error::{AudioError, Result};

const RIFF_HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;
const FMT_MIN_LEN: usize = 16;
const FORMAT_PCM: u16 = 1;

/// Borrowed view of the PCM payload of a WAV buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavClip<'a> {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    /// Little-endian interleaved samples, trimmed to whole frames.
    pub pcm: &'a [u8],
}

impl<'a> WavClip<'a> {
    /// Total samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }

    pub fn frame_count(&self) -> usize {
        self.sample_count() / self.channels.max(1) as usize
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as u64 * 1000 / self.sample_rate as u64
    }

    /// Interleaved samples decoded from the payload.
    pub fn samples(&self) -> impl Iterator<Item = i16> + 'a {
        self.pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn to_samples(&self) -> Vec<i16> {
        self.samples().collect()
    }
}

#[derive(Clone, Copy, Debug)]
struct FmtChunk {
    audio_format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Parse a WAV buffer and return a view of its PCM payload.
///
/// Errors:
/// - [`AudioError::Format`] when the `RIFF`/`WAVE` magic, the `fmt ` chunk or the
///   `data` chunk is missing
/// - [`AudioError::NotSupported`] for anything but 16-bit integer PCM, mono or stereo
///
/// A `data` chunk whose declared size runs past the end of the buffer is clipped to
/// the bytes actually present. Any other chunk that overruns ends the walk.
pub fn parse_wav(bytes: &[u8]) -> Result<WavClip<'_>> {
    if bytes.len() < RIFF_HEADER_LEN || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(AudioError::Format("missing RIFF/WAVE header"));
    }

    let mut fmt: Option<FmtChunk> = None;
    let mut data: Option<&[u8]> = None;
    let mut offset = RIFF_HEADER_LEN;

    while offset + CHUNK_HEADER_LEN <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + CHUNK_HEADER_LEN;
        let body_end = body_start.saturating_add(size);
        let overruns = body_end > bytes.len();

        match id {
            b"fmt " if !overruns => {
                fmt = Some(parse_fmt(&bytes[body_start..body_end])?);
            }
            b"data" => {
                data = Some(&bytes[body_start..body_end.min(bytes.len())]);
            }
            _ => {}
        }

        if overruns {
            tracing::debug!(
                chunk = %String::from_utf8_lossy(id),
                declared = size,
                available = bytes.len() - body_start,
                "wav chunk overruns buffer"
            );
            break;
        }
        offset = body_end + (size & 1);
    }

    let fmt = fmt.ok_or(AudioError::Format("missing fmt chunk"))?;
    let data = data.ok_or(AudioError::Format("missing data chunk"))?;

    if fmt.audio_format != FORMAT_PCM {
        return Err(AudioError::NotSupported(format!(
            "wav format code {}",
            fmt.audio_format
        )));
    }
    if fmt.bits_per_sample != 16 {
        return Err(AudioError::NotSupported(format!(
            "{}-bit wav",
            fmt.bits_per_sample
        )));
    }
    if !(1..=2).contains(&fmt.channels) {
        return Err(AudioError::NotSupported(format!(
            "{} channel wav",
            fmt.channels
        )));
    }
    if fmt.sample_rate == 0 {
        return Err(AudioError::Format("zero sample rate"));
    }

    let block_align = fmt.channels as usize * 2;
    let whole = data.len() - data.len() % block_align;

    Ok(WavClip {
        channels: fmt.channels,
        sample_rate: fmt.sample_rate,
        bits_per_sample: fmt.bits_per_sample,
        pcm: &data[..whole],
    })
}

fn parse_fmt(body: &[u8]) -> Result<FmtChunk> {
    if body.len() < FMT_MIN_LEN {
        return Err(AudioError::Format("fmt chunk too short"));
    }
    Ok(FmtChunk {
        audio_format: read_u16(body, 0),
        channels: read_u16(body, 2),
        sample_rate: read_u32(body, 4),
        bits_per_sample: read_u16(body, 14),
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Build a canonical 44-byte-header PCM WAV around `samples`.
///
/// Fails with [`AudioError::NotSupported`] when the header fields would not fit
/// their 32-bit slots.
pub fn encode_wav(channels: u16, sample_rate: u32, samples: &[i16]) -> Result<Vec<u8>> {
    let (data_len, byte_rate) = header_sizes(channels, sample_rate, samples.len())?;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    Ok(out)
}

/// `(data chunk length, byte rate)` for a 16-bit PCM header.
fn header_sizes(channels: u16, sample_rate: u32, sample_count: usize) -> Result<(u32, u32)> {
    let data_len = sample_count
        .checked_mul(2)
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| {
            AudioError::NotSupported(format!("{sample_count} samples exceed the RIFF size limit"))
        })?;
    if !(1..=2).contains(&channels) {
        return Err(AudioError::NotSupported(format!("{channels} channels")));
    }
    let byte_rate = sample_rate
        .checked_mul(channels as u32 * 2)
        .ok_or_else(|| AudioError::NotSupported(format!("sample rate {sample_rate} Hz")))?;
    Ok((data_len, byte_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(id);
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(body);
        if body.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn fmt_body(format: u16, channels: u16, rate: u32, bits: u16) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&format.to_le_bytes());
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&rate.to_le_bytes());
        body.extend_from_slice(&(rate * channels as u32 * 2).to_le_bytes());
        body.extend_from_slice(&(channels * 2).to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        body
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(4 + body.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn one_second_of_mono_silence_has_44100_samples() {
        let bytes = encode_wav(1, 44_100, &vec![0i16; 44_100]).unwrap();
        let clip = parse_wav(&bytes).unwrap();
        assert_eq!(clip.sample_count(), 44_100);
        assert_eq!(clip.frame_count(), 44_100);
        assert_eq!(clip.duration_ms(), 1000);
        assert!(clip.samples().all(|s| s == 0));
    }

    #[test]
    fn header_fields_match_documented_offsets() {
        let bytes = encode_wav(1, 22_050, &[1, -1, 300]).unwrap();
        let clip = parse_wav(&bytes).unwrap();
        assert_eq!(clip.channels, u16::from_le_bytes([bytes[22], bytes[23]]));
        assert_eq!(
            clip.sample_rate,
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]])
        );
        assert_eq!(clip.to_samples(), vec![1, -1, 300]);
    }

    #[test]
    fn missing_data_chunk_is_a_format_error() {
        let bytes = riff(&[chunk(b"fmt ", &fmt_body(1, 1, 16_000, 16))]);
        let err = parse_wav(&bytes).unwrap_err();
        assert!(matches!(err, AudioError::Format("missing data chunk")));
    }

    #[test]
    fn missing_fmt_chunk_is_a_format_error() {
        let bytes = riff(&[chunk(b"data", &[0, 0, 0, 0])]);
        let err = parse_wav(&bytes).unwrap_err();
        assert!(matches!(err, AudioError::Format("missing fmt chunk")));
    }

    #[test]
    fn bad_magic_is_a_format_error() {
        let mut bytes = encode_wav(1, 8_000, &[0; 4]).unwrap();
        bytes[8..12].copy_from_slice(b"AVI ");
        assert!(matches!(parse_wav(&bytes), Err(AudioError::Format(_))));
        assert!(matches!(parse_wav(b"RIFF"), Err(AudioError::Format(_))));
    }

    #[test]
    fn odd_sized_chunks_are_padded_before_the_next_header() {
        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(1, 2, 48_000, 16)),
            chunk(b"LIST", &[1, 2, 3]),
            chunk(b"data", &[1, 0, 2, 0, 3, 0, 4, 0]),
        ]);
        let clip = parse_wav(&bytes).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.to_samples(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn non_pcm_and_non_16_bit_are_not_supported() {
        let float = riff(&[
            chunk(b"fmt ", &fmt_body(3, 1, 48_000, 32)),
            chunk(b"data", &[0; 8]),
        ]);
        assert!(matches!(parse_wav(&float), Err(AudioError::NotSupported(_))));

        let eight_bit = riff(&[
            chunk(b"fmt ", &fmt_body(1, 1, 8_000, 8)),
            chunk(b"data", &[0; 8]),
        ]);
        assert!(matches!(parse_wav(&eight_bit), Err(AudioError::NotSupported(_))));
    }

    #[test]
    fn truncated_data_chunk_is_clipped_to_whole_frames() {
        let mut bytes = riff(&[
            chunk(b"fmt ", &fmt_body(1, 2, 8_000, 16)),
            chunk(b"data", &[0; 12]),
        ]);
        bytes.truncate(bytes.len() - 5);
        let clip = parse_wav(&bytes).unwrap();
        assert_eq!(clip.pcm.len(), 4);
    }

    #[test]
    fn chunk_overrunning_before_data_ends_the_walk() {
        let mut junk = chunk(b"junk", &[0; 4]);
        junk[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let bytes = riff(&[
            chunk(b"fmt ", &fmt_body(1, 1, 8_000, 16)),
            junk,
            chunk(b"data", &[0; 4]),
        ]);
        assert!(matches!(
            parse_wav(&bytes),
            Err(AudioError::Format("missing data chunk"))
        ));
    }

    #[test]
    fn oversized_payload_is_refused() {
        assert!(header_sizes(1, 16_000, 100).is_ok());
        assert!(matches!(
            header_sizes(1, 16_000, u32::MAX as usize / 2),
            Err(AudioError::NotSupported(_))
        ));
        assert!(matches!(
            header_sizes(2, u32::MAX, 1),
            Err(AudioError::NotSupported(_))
        ));
        assert!(encode_wav(3, 16_000, &[0; 6]).is_err());
    }
}
