use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "naphome", version = VERSION, about = "Voice assistant demo board runtime")]
pub struct Args {
    /// Path to a TOML config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Output device by substring match (overrides the config file)
    #[arg(long, global = true)]
    pub device: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the assistant: sensors, LED face, voice loop and dashboard (default)
    Run {
        /// Dashboard bind address, e.g. 0.0.0.0:8080
        #[arg(long)]
        http_bind: Option<SocketAddr>,

        /// Do not advertise the dashboard over mDNS
        #[arg(long)]
        no_mdns: bool,

        /// Do not read voice commands from stdin
        #[arg(long)]
        no_voice: bool,

        /// Start the demo suite immediately
        #[arg(long)]
        demo: bool,
    },

    /// Play a local WAV or MP3 file and exit
    Play {
        path: PathBuf,

        /// Playback gain in percent
        #[arg(long, default_value_t = 100)]
        volume: u8,
    },

    /// Print sensor snapshots as JSON lines
    Sensors {
        /// Number of polls (0 = until interrupted)
        #[arg(long, default_value_t = 5)]
        count: u32,

        /// Milliseconds between polls
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// List output devices and exit
    ListDevices,
}
