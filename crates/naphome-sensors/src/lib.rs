//! Environmental sensor drivers with synthetic fallback.
//!
//! Every driver follows the same contract: `init` probes the part and falls back to
//! a deterministic generator when nothing answers, `read` never fails, and `deinit`
//! hands the bus back.

pub mod bh1750;
pub mod bus;
pub mod crc;
pub mod error;
pub mod hub;
pub mod reading;
pub mod scd30;
pub mod sgp30;
pub mod sht30;
pub mod synthetic;

pub use bus::{DetachedBus, SharedBus, StdDelay};
pub use error::SensorError;
pub use hub::{SensorAddresses, SensorHub};
pub use reading::Reading;
