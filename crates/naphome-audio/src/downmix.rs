//! Channel reduction to the mono stream the codec expects.

use std::borrow::Cow;

/// Reduce interleaved PCM to mono.
///
/// Each output sample is the arithmetic mean of its frame, truncated toward zero,
/// so a stereo input of `n` samples yields `n / 2` samples. Mono input is borrowed
/// as-is. A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Cow<'_, [i16]> {
    match channels {
        0 | 1 => Cow::Borrowed(samples),
        2 => Cow::Owned(
            samples
                .chunks_exact(2)
                .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
                .collect(),
        ),
        n => {
            let n = n as usize;
            Cow::Owned(
                samples
                    .chunks_exact(n)
                    .map(|frame| {
                        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                        (sum / n as i32) as i16
                    })
                    .collect(),
            )
        }
    }
}
