//! Asset playback: container parsing, format normalization and the chunk loop.
//!
//! - WAV: parse, reconfigure the codec to the file's rate (unless the voice
//!   pipeline owns the codec), downmix, play.
//! - MP3: frame loop with a per-frame downmix and play; the codec rate is left alone.

use crate::arbiter::Codec;
use crate::asset::{AssetKind, AudioAsset};
use crate::downmix::downmix_to_mono;
use crate::error::{AudioError, Result};
use crate::mp3::{FrameDecoder, Mp3Summary, decode_mp3};
use crate::playback::{PlaybackReport, PlaybackSessionOptions, play_pcm};
use crate::wav::parse_wav;

/// What a finished asset playback looked like.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetReport {
    pub kind: Option<AssetKind>,
    pub source_rate: u32,
    pub source_channels: u16,
    /// `false` when the codec kept a different rate than the source.
    pub rate_matched: bool,
    pub playback: PlaybackReport,
    pub mp3: Option<Mp3Summary>,
}

/// Play a WAV buffer. Nothing reaches the sink if parsing fails.
pub fn play_wav(
    codec: &Codec,
    bytes: &[u8],
    opts: &PlaybackSessionOptions,
) -> Result<AssetReport> {
    let clip = parse_wav(bytes)?;
    tracing::info!(
        channels = clip.channels,
        rate_hz = clip.sample_rate,
        samples = clip.sample_count(),
        "wav parsed"
    );

    let rate_matched = codec.reconfigure_unless_voice_active(clip.sample_rate)?;
    let samples = clip.to_samples();
    let mono = downmix_to_mono(&samples, clip.channels);
    let opts = PlaybackSessionOptions {
        session_rate: Some(clip.sample_rate),
        ..opts.clone()
    };
    let playback = play_pcm(codec, &mono, &opts)?;

    Ok(AssetReport {
        kind: Some(AssetKind::Wav),
        source_rate: clip.sample_rate,
        source_channels: clip.channels,
        rate_matched,
        playback,
        mp3: None,
    })
}

/// Play an MP3 buffer at whatever rate the codec is already set to.
pub fn play_mp3<D>(
    codec: &Codec,
    bytes: &[u8],
    decoder: &mut D,
    opts: &PlaybackSessionOptions,
) -> Result<AssetReport>
where
    D: FrameDecoder + ?Sized,
{
    let codec_rate = codec.sample_rate();
    let opts = PlaybackSessionOptions {
        session_rate: Some(codec_rate),
        ..opts.clone()
    };
    let mut playback = PlaybackReport::default();
    let summary = decode_mp3(bytes, decoder, Some(codec_rate), |mono, _rate| {
        let chunk = play_pcm(codec, mono, &opts)?;
        playback.absorb(&chunk);
        Ok(())
    })?;

    let source_rate = summary.sample_rate.unwrap_or(codec_rate);
    Ok(AssetReport {
        kind: Some(AssetKind::Mp3),
        source_rate,
        source_channels: summary.channels.unwrap_or(1),
        rate_matched: source_rate == codec_rate,
        playback,
        mp3: Some(summary),
    })
}

/// Dispatch on the asset's container.
pub fn play_asset<D>(
    codec: &Codec,
    asset: &AudioAsset,
    decoder: &mut D,
    opts: &PlaybackSessionOptions,
) -> Result<AssetReport>
where
    D: FrameDecoder + ?Sized,
{
    match asset.kind() {
        AssetKind::Wav => play_wav(codec, asset.bytes(), opts),
        AssetKind::Mp3 => play_mp3(codec, asset.bytes(), decoder, opts),
        AssetKind::Unknown => Err(AudioError::NotSupported(format!(
            "unrecognized asset {}",
            asset.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbiter::Arbiter;
    use crate::mp3::FrameInfo;
    use crate::playback::Priority;
    use crate::sink::MemorySink;
    use crate::wav::encode_wav;
    use naphome_types::VoiceState;

    struct StereoFrames;

    impl FrameDecoder for StereoFrames {
        fn decode_frame(&mut self, _input: &[u8], pcm: &mut Vec<i16>) -> FrameInfo {
            pcm.extend(std::iter::repeat_n([100i16, 300], 600).flatten());
            FrameInfo {
                samples: 600,
                frame_bytes: 200,
                sample_rate: 22_050,
                channels: 2,
            }
        }
    }

    fn codec(rate: u32) -> (Codec, MemorySink) {
        let sink = MemorySink::new(rate);
        (Codec::new(Box::new(sink.clone()), Arbiter::shared()), sink)
    }

    #[test]
    fn wav_reconfigures_and_downmixes() {
        let (codec, sink) = codec(16_000);
        let bytes = encode_wav(2, 44_100, &[10, 20, 30, 41, -5, -6]).unwrap();
        let opts = PlaybackSessionOptions::new(Priority::Background, 1024);
        let report = play_wav(&codec, &bytes, &opts).unwrap();

        assert!(report.rate_matched);
        let log = sink.log();
        assert_eq!(log.reconfigures, vec![44_100]);
        assert_eq!(log.samples, vec![15, 35, -5]);
    }

    #[test]
    fn wav_keeps_codec_rate_while_voice_active() {
        let (codec, sink) = codec(16_000);
        codec.arbiter().set_voice_state(VoiceState::Processing);
        let bytes = encode_wav(1, 24_000, &[1, 2, 3]).unwrap();
        let opts = PlaybackSessionOptions::new(Priority::Voice, 1024);
        let report = play_wav(&codec, &bytes, &opts).unwrap();

        assert!(!report.rate_matched);
        assert!(sink.log().reconfigures.is_empty());
        assert_eq!(sink.log().samples, vec![1, 2, 3]);
    }

    #[test]
    fn malformed_wav_writes_nothing() {
        let (codec, sink) = codec(16_000);
        let mut bytes = encode_wav(1, 16_000, &[1, 2, 3, 4]).unwrap();
        bytes[36..40].copy_from_slice(b"junk");
        let opts = PlaybackSessionOptions::new(Priority::Background, 1024);
        assert!(matches!(
            play_wav(&codec, &bytes, &opts),
            Err(AudioError::Format(_))
        ));
        let log = sink.log();
        assert!(log.writes.is_empty());
        assert!(log.reconfigures.is_empty());
    }

    #[test]
    fn mp3_plays_mono_frames_without_reconfiguring() {
        let (codec, sink) = codec(16_000);
        let bytes = vec![0u8; 1000];
        let opts = PlaybackSessionOptions::new(Priority::Background, 1024);
        let report = play_mp3(&codec, &bytes, &mut StereoFrames, &opts).unwrap();

        assert!(!report.rate_matched);
        assert_eq!(report.source_channels, 2);
        assert_eq!(report.mp3.as_ref().unwrap().frames, 5);
        let log = sink.log();
        assert!(log.reconfigures.is_empty());
        assert_eq!(log.samples.len(), 5 * 600);
        assert!(log.samples.iter().all(|&s| s == 200));
    }

    #[test]
    fn unknown_asset_is_not_supported() {
        let (codec, _sink) = codec(16_000);
        let asset = AudioAsset::new("notes.txt", b"hello".to_vec());
        let opts = PlaybackSessionOptions::new(Priority::Background, 1024);
        assert!(matches!(
            play_asset(&codec, &asset, &mut StereoFrames, &opts),
            Err(AudioError::NotSupported(_))
        ));
    }
}
