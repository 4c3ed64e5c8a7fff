use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use naphome::cli::{Args, Command};
use naphome::config::{NaphomeConfig, normalize_device_name};
use naphome::runtime::{self, RunOptions};

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=warn,mdns_sd=warn")
        }))
        .init();

    let file = match &args.config {
        Some(path) => NaphomeConfig::load(path)?,
        None => NaphomeConfig::default(),
    };
    let mut config = file.resolve()?;
    if let Some(device) = normalize_device_name(args.device) {
        config.output_device = Some(device);
    }

    match args.cmd.unwrap_or(Command::Run {
        http_bind: None,
        no_mdns: false,
        no_voice: false,
        demo: false,
    }) {
        Command::Run {
            http_bind,
            no_mdns,
            no_voice,
            demo,
        } => {
            if let Some(bind) = http_bind {
                config.http_bind = bind;
            }
            config.mdns_enabled &= !no_mdns;
            config.voice_enabled &= !no_voice;
            runtime::run(config, RunOptions { start_demo: demo })
        }
        Command::Play { path, volume } => runtime::run_play(&config, &path, volume),
        Command::Sensors { count, interval_ms } => runtime::run_sensors(
            &config,
            count,
            std::time::Duration::from_millis(interval_ms),
        ),
        Command::ListDevices => runtime::list_devices(),
    }
}
