//! Output device discovery and stream configuration for the cpal sink.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let devices = host.output_devices().context("No output devices")?;
        for d in devices {
            let matched = d
                .description()
                .ok()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false);
            if matched {
                return Ok(d);
            }
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

pub fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.to_string())
}

/// Choose an output config for `target_rate`.
///
/// A range containing the exact rate wins. Otherwise the range whose nearest edge is
/// closest to the target is used at that edge. Ties go to the preferred sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;

    for range in device.supported_output_configs()? {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let distance = rate.abs_diff(target_rate);
        let rank = sample_format_rank(range.sample_format());
        let better = match &best {
            None => true,
            Some((b_distance, b_rank, _)) => (distance, rank) < (*b_distance, *b_rank),
        };
        if better {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }

    best.map(|(_, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Print output devices to stdout, marking the host default with `*`.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default = host.default_output_device().as_ref().and_then(device_name);
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        let name = device_name(&d).unwrap_or_else(|| "unknown".to_string());
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{marker}#{i}: {name}");
    }
    Ok(())
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::I16 => 0,
        cpal::SampleFormat::F32 => 1,
        cpal::SampleFormat::I32 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_device_name_is_case_insensitive() {
        assert!(matches_device_name("USB Speaker", "speaker"));
        assert!(!matches_device_name("USB Speaker", "dac"));
        assert!(!matches_device_name("USB Speaker", "  "));
    }

    #[test]
    fn clamp_rate_keeps_target_inside_range() {
        assert_eq!(clamp_rate(8_000, 48_000, 16_000), 16_000);
        assert_eq!(clamp_rate(44_100, 96_000, 16_000), 44_100);
        assert_eq!(clamp_rate(8_000, 22_050, 44_100), 22_050);
    }

    #[test]
    fn i16_is_the_preferred_format() {
        assert!(
            sample_format_rank(cpal::SampleFormat::I16)
                < sample_format_rank(cpal::SampleFormat::F32)
        );
    }
}
