//! Assembles the dashboard status document from the live stores.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use naphome_audio::Codec;
use naphome_audio::status::PlayerStatusState;
use naphome_types::{CpuInfo, DashboardStatus, MemoryInfo, SystemInfo};

use crate::demo::TestBoard;
use crate::sensors::SensorStore;
use crate::tasks::TaskRegistry;

/// Everything `GET /api/status` reads from.
#[derive(Clone)]
pub struct StatusSources {
    pub started: Instant,
    pub codec: Arc<Codec>,
    pub player: Arc<Mutex<PlayerStatusState>>,
    pub tests: Arc<TestBoard>,
    pub tasks: TaskRegistry,
    pub sensors: SensorStore,
}

impl StatusSources {
    pub fn snapshot(&self) -> DashboardStatus {
        let arbiter = self.codec.arbiter();
        let audio = self
            .player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(arbiter, self.codec.volume());
        DashboardStatus {
            system: system_info(self.started),
            memory: host_memory(),
            cpu: CpuInfo::default(),
            tasks: self.tasks.snapshot(),
            tests: self.tests.results(),
            sensors: self.sensors.latest(),
            audio,
            voice_state: arbiter.voice_state(),
        }
    }
}

fn system_info(started: Instant) -> SystemInfo {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    SystemInfo {
        chip_model: format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS),
        cores,
        revision: 0,
        cpu_freq_mhz: 0,
        uptime_seconds: started.elapsed().as_secs(),
    }
}

/// Heap figures from `/proc/meminfo`; zeros where that file does not exist.
pub fn host_memory() -> MemoryInfo {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(raw) => parse_meminfo(&raw),
        Err(_) => MemoryInfo::default(),
    }
}

fn parse_meminfo(raw: &str) -> MemoryInfo {
    let field = |key: &str| -> u64 {
        raw.lines()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix(':'))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|kb| kb.parse::<u64>().ok())
            .map(|kb| kb * 1024)
            .unwrap_or(0)
    };
    let free = field("MemAvailable");
    MemoryInfo {
        free_heap: free,
        total_heap: field("MemTotal"),
        largest_free_block: free,
        min_free_heap: field("MemFree"),
        psram_free: 0,
        psram_total: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use naphome_audio::Arbiter;
    use naphome_audio::sink::MemorySink;
    use naphome_types::{TestStatus, VoiceState};

    fn sources() -> StatusSources {
        let codec = Arc::new(Codec::new(
            Box::new(MemorySink::new(16_000)),
            Arbiter::shared(),
        ));
        StatusSources {
            started: Instant::now(),
            codec,
            player: PlayerStatusState::shared(),
            tests: Arc::new(TestBoard::default()),
            tasks: TaskRegistry::new(),
            sensors: SensorStore::default(),
        }
    }

    #[test]
    fn snapshot_reflects_live_stores() {
        let sources = sources();
        sources.tests.record(2, TestStatus::Pass);
        sources.codec.set_volume(40);
        sources.codec.arbiter().set_voice_state(VoiceState::Listening);

        let status = sources.snapshot();
        assert_eq!(status.tasks[0].name, "System");
        assert_eq!(status.tests.len(), 12);
        assert_eq!(status.tests[1].status, TestStatus::Pass);
        assert_eq!(status.tests[0].status, TestStatus::NotImplemented);
        assert_eq!(status.audio.volume_percent, 40);
        assert!(status.audio.now_playing.is_none());
        assert_eq!(status.voice_state, VoiceState::Listening);
        assert!(status.system.cores >= 1);
    }

    #[test]
    fn meminfo_fields_are_scaled_to_bytes() {
        let raw = "MemTotal:       16384 kB\nMemFree:         2048 kB\nMemAvailable:    8192 kB\n";
        let mem = parse_meminfo(raw);
        assert_eq!(mem.total_heap, 16384 * 1024);
        assert_eq!(mem.free_heap, 8192 * 1024);
        assert_eq!(mem.min_free_heap, 2048 * 1024);
        assert_eq!(parse_meminfo("").total_heap, 0);
    }
}
