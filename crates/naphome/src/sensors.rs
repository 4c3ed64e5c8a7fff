//! Background sensor polling and the shared latest-snapshot store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use naphome_sensors::SensorHub;
use naphome_types::SensorSnapshot;
use serde::Serialize;

/// Latest readings, shared by the dispatcher, the demo suite and the dashboard.
#[derive(Clone, Default)]
pub struct SensorStore {
    latest: Arc<Mutex<SensorSnapshot>>,
}

impl SensorStore {
    pub fn latest(&self) -> SensorSnapshot {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, snapshot: SensorSnapshot) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }
}

/// Poll `hub` every `interval` until `stop` is raised, then deinit the parts.
pub fn spawn_sensor_poller<B, D>(
    mut hub: SensorHub<B, D>,
    interval: Duration,
    store: SensorStore,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>>
where
    B: I2c + Clone + Send + 'static,
    D: DelayNs + Clone + Send + 'static,
{
    store.publish(hub.poll());
    std::thread::Builder::new()
        .name("sensor-poller".to_string())
        .spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                std::thread::sleep(interval);
                let snapshot = hub.poll();
                store.publish(snapshot);
            }
            hub.shutdown();
        })
}

#[derive(Serialize)]
struct Telemetry<'a> {
    board: &'a str,
    timestamp: i64,
    #[serde(flatten)]
    sensors: &'a SensorSnapshot,
}

/// One JSON telemetry line for the current readings.
pub fn telemetry_json(board: &str, timestamp: i64, snapshot: &SensorSnapshot) -> String {
    let record = Telemetry {
        board,
        timestamp,
        sensors: snapshot,
    };
    serde_json::to_string(&record).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}
