//! Device output through cpal.
//!
//! cpal streams cannot leave the thread that built them, so [`CpalSink`] keeps the
//! stream on a dedicated output thread and talks to it over a command channel.
//! Samples travel through a bounded [`SampleQueue`]; the real-time callback drains it
//! without blocking, fans mono out to every device channel and pads underruns
//! with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};

use crate::device;
use crate::error::AudioError;
use crate::queue::{SampleQueue, capacity_for};
use crate::sink::AudioSink;

const HIGHEST_EXPECTED_RATE: u32 = 48_000;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

enum OutputCommand {
    Open {
        rate: u32,
        reply: Sender<std::result::Result<u32, String>>,
    },
    Shutdown,
}

/// [`AudioSink`] backed by a cpal output stream.
pub struct CpalSink {
    queue: Arc<SampleQueue>,
    control: Sender<OutputCommand>,
    requested_rate: u32,
    device_name: Option<String>,
    underrun_samples: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open the output device (by name substring, or the default) at `initial_rate`.
    pub fn open(device_needle: Option<String>, initial_rate: u32, buffer_seconds: f32) -> Result<Self> {
        let queue = Arc::new(SampleQueue::new(capacity_for(
            HIGHEST_EXPECTED_RATE,
            buffer_seconds,
        )));
        let underrun_samples = Arc::new(AtomicU64::new(0));
        let (control, commands) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let worker = {
            let queue = queue.clone();
            let underruns = underrun_samples.clone();
            thread::Builder::new()
                .name("audio-output".to_string())
                .spawn(move || output_thread_main(device_needle, queue, underruns, commands, ready_tx))
                .context("spawn audio output thread")?
        };

        let device_name = ready_rx
            .recv()
            .context("audio output thread exited during startup")?
            .map_err(|e| anyhow!(e))?;

        let mut sink = Self {
            queue,
            control,
            requested_rate: initial_rate,
            device_name: Some(device_name),
            underrun_samples,
            worker: Some(worker),
        };
        sink.open_stream(initial_rate)?;
        Ok(sink)
    }

    pub fn underrun_samples(&self) -> u64 {
        self.underrun_samples.load(Ordering::Relaxed)
    }

    fn open_stream(&mut self, rate: u32) -> Result<u32> {
        let (reply, result) = crossbeam_channel::bounded(1);
        self.control
            .send(OutputCommand::Open { rate, reply })
            .map_err(|_| anyhow!("audio output thread is gone"))?;
        let actual = result
            .recv()
            .context("audio output thread dropped the request")?
            .map_err(|e| anyhow!(e))?;
        self.requested_rate = rate;
        Ok(actual)
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, samples: &[i16]) -> crate::error::Result<()> {
        if self.queue.push_blocking(samples) {
            Ok(())
        } else {
            Err(AudioError::Sink("output queue closed".to_string()))
        }
    }

    fn reconfigure(&mut self, sample_rate: u32) -> crate::error::Result<()> {
        if !self.queue.wait_until_drained(DRAIN_TIMEOUT) {
            tracing::warn!("output queue did not drain before reconfigure");
            self.queue.clear();
        }
        self.open_stream(sample_rate)
            .map(|_| ())
            .map_err(AudioError::sink)
    }

    fn sample_rate(&self) -> u32 {
        self.requested_rate
    }

    fn device_name(&self) -> Option<String> {
        self.device_name.clone()
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.control.send(OutputCommand::Shutdown);
        self.queue.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn output_thread_main(
    device_needle: Option<String>,
    queue: Arc<SampleQueue>,
    underruns: Arc<AtomicU64>,
    commands: Receiver<OutputCommand>,
    ready: Sender<std::result::Result<String, String>>,
) {
    let host = cpal::default_host();
    let device = match device::pick_device(&host, device_needle.as_deref()) {
        Ok(device) => device,
        Err(e) => {
            let _ = ready.send(Err(format!("{e:#}")));
            return;
        }
    };
    let name = device::device_name(&device).unwrap_or_else(|| "unknown".to_string());
    tracing::info!(device = %name, "output device");
    if ready.send(Ok(name)).is_err() {
        return;
    }

    let mut stream: Option<cpal::Stream> = None;
    while let Ok(cmd) = commands.recv() {
        match cmd {
            OutputCommand::Open { rate, reply } => {
                // Release the old stream before opening a new one on the same device.
                stream = None;
                let result = open_stream(&device, rate, &queue, &underruns);
                let reply_value = match result {
                    Ok((s, actual)) => {
                        stream = Some(s);
                        Ok(actual)
                    }
                    Err(e) => Err(format!("{e:#}")),
                };
                let _ = reply.send(reply_value);
            }
            OutputCommand::Shutdown => break,
        }
    }
    drop(stream);
}

fn open_stream(
    device: &cpal::Device,
    rate: u32,
    queue: &Arc<SampleQueue>,
    underruns: &Arc<AtomicU64>,
) -> Result<(cpal::Stream, u32)> {
    let config = device::pick_output_config(device, rate)?;
    let stream_config: cpal::StreamConfig = config.clone().into();
    let actual = stream_config.sample_rate;
    if actual != rate {
        tracing::warn!(
            requested_hz = rate,
            device_hz = actual,
            "device cannot run at the requested rate, pitch will shift"
        );
    }
    let stream = match config.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &stream_config, queue, underruns),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, &stream_config, queue, underruns),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, &stream_config, queue, underruns),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &stream_config, queue, underruns),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }?;
    stream.play()?;
    tracing::info!(
        rate_hz = actual,
        channels = stream_config.channels,
        "output stream started"
    );
    Ok((stream, actual))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    underruns: &Arc<AtomicU64>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let channels = config.channels.max(1) as usize;
    let queue = queue.clone();
    let underruns = underruns.clone();
    let mut scratch: Vec<i16> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let frames = data.len() / channels;
            scratch.resize(frames, 0);
            let filled = queue.pop_into(&mut scratch[..frames]);
            if filled < frames {
                scratch[filled..frames].fill(0);
                if filled > 0 {
                    underruns.fetch_add((frames - filled) as u64, Ordering::Relaxed);
                }
            }
            for (frame, &sample) in data.chunks_mut(channels).zip(scratch.iter()) {
                let value = T::from_sample(sample);
                frame.fill(value);
            }
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;
    Ok(stream)
}
