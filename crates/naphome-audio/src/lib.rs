//! Audio stack: container parsing, arbitration, chunked playback and device output.

pub mod arbiter;
pub mod asset;
pub mod config;
pub mod decode;
pub mod device;
pub mod downmix;
pub mod error;
pub mod mp3;
pub mod output;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod sink;
pub mod status;
pub mod wav;

pub use arbiter::{Arbiter, Codec};
pub use asset::{AssetKind, AudioAsset};
pub use error::AudioError;
pub use playback::{PlaybackSessionOptions, Priority};
