//! The spoken twelve-step board demo.
//!
//! Each step announces itself, checks one subsystem, speaks the outcome and
//! flashes the status color. Results land on a shared [`TestBoard`] that the
//! dashboard reads; steps that have not run report "not implemented".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use naphome_types::{MemoryInfo, SensorSnapshot, TestResult, TestStatus};

use crate::cloud::Speaker;
use crate::led::LedFace;
use crate::sensors::{SensorStore, telemetry_json};

pub const TEST_NAMES: [&str; 12] = [
    "ESP32-S3 System Initialization",
    "SHT30 Temperature/Humidity Sensor",
    "SGP30 VOC Sensor",
    "BH1750 Light Sensor",
    "SCD30 CO2 Sensor",
    "PCA9685 RGB LED Control",
    "WiFi Connectivity",
    "AWS IoT Core MQTT",
    "ESP-SR Wake Word Detection",
    "IR Blaster Functionality",
    "Audio Output System",
    "Sensor Telemetry Publishing",
];

const INTROS: [&str; 12] = [
    "ESP32-S3 system initialization.",
    "SHT30 temperature and humidity sensor.",
    "SGP30 VOC sensor.",
    "BH1750 light sensor.",
    "SCD30 CO2 sensor.",
    "PCA9685 RGB LED control.",
    "WiFi connectivity.",
    "AWS IoT Core MQTT connectivity.",
    "ESP-SR wake word detection.",
    "IR blaster functionality.",
    "Audio output system.",
    "Sensor telemetry publishing.",
];

const NOT_IMPLEMENTED: &str = "This function is not yet implemented.";
const LOW_HEAP_BYTES: u64 = 100_000;

/// Latest status of every step.
#[derive(Debug, Default)]
pub struct TestBoard {
    statuses: Mutex<[TestStatus; 12]>,
}

impl TestBoard {
    pub fn record(&self, test_num: u8, status: TestStatus) {
        let idx = usize::from(test_num.saturating_sub(1));
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = statuses.get_mut(idx) {
            *slot = status;
        }
    }

    pub fn results(&self) -> Vec<TestResult> {
        let statuses = *self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        TEST_NAMES
            .iter()
            .zip(statuses)
            .enumerate()
            .map(|(i, (name, status))| TestResult {
                test_num: i as u8 + 1,
                name: (*name).to_string(),
                status,
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub passed: usize,
    pub warnings: usize,
    pub failed: usize,
    pub not_implemented: usize,
}

impl SuiteSummary {
    fn count(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Warning => self.warnings += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::NotImplemented => self.not_implemented += 1,
        }
    }

    pub fn sentence(&self) -> String {
        format!(
            "Test suite complete. {} passed, {} warnings, {} failed, {} not implemented.",
            self.passed, self.warnings, self.failed, self.not_implemented
        )
    }

    /// Color left on the strip once the suite ends.
    pub fn final_status(&self) -> TestStatus {
        if self.failed == 0 && self.not_implemented == 0 {
            TestStatus::Pass
        } else if self.failed == 0 {
            TestStatus::Warning
        } else {
            TestStatus::Fail
        }
    }
}

/// Pauses between the spoken parts of the demo.
#[derive(Clone, Copy, Debug)]
pub struct DemoTiming {
    pub settle: Duration,
    pub after_intro: Duration,
    pub between_tests: Duration,
    pub led_step: Duration,
}

impl Default for DemoTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(1),
            after_intro: Duration::from_secs(2),
            between_tests: Duration::from_secs(3),
            led_step: Duration::from_secs(1),
        }
    }
}

impl DemoTiming {
    pub fn instant() -> Self {
        Self {
            settle: Duration::ZERO,
            after_intro: Duration::ZERO,
            between_tests: Duration::ZERO,
            led_step: Duration::ZERO,
        }
    }
}

pub type Probe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Everything the steps inspect.
pub struct DemoEnv {
    pub board_name: String,
    pub speaker: Arc<dyn Speaker>,
    pub face: Arc<LedFace>,
    pub sensors: SensorStore,
    pub memory: Arc<dyn Fn() -> MemoryInfo + Send + Sync>,
    /// Network reachability.
    pub network: Probe,
    /// Plays a test tone; `true` when it reached the output.
    pub audio: Probe,
    pub timing: DemoTiming,
}

/// Starts a demo run. Implemented by [`DemoSuite`]; swapped out in tests.
pub trait DemoTrigger: Send + Sync {
    /// `false` when a run is already in progress or could not be started.
    fn trigger(&self) -> bool;
}

pub struct DemoSuite {
    board: Arc<TestBoard>,
    running: AtomicBool,
    env: DemoEnv,
}

impl DemoSuite {
    pub fn new(board: Arc<TestBoard>, env: DemoEnv) -> Arc<Self> {
        Arc::new(Self {
            board,
            running: AtomicBool::new(false),
            env,
        })
    }

    pub fn board(&self) -> &Arc<TestBoard> {
        &self.board
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a run on its own thread unless one is already going.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("demo already running");
            return false;
        }
        let suite = self.clone();
        let spawned = std::thread::Builder::new()
            .name("demo-suite".to_string())
            .spawn(move || {
                suite.run_steps();
                suite.running.store(false, Ordering::Release);
            });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("demo thread spawn failed: {e}");
                self.running.store(false, Ordering::Release);
                false
            }
        }
    }

    /// Run every step on the calling thread.
    pub fn run_steps(&self) -> SuiteSummary {
        tracing::info!("demo suite starting");
        let env = &self.env;
        std::thread::sleep(env.timing.settle);
        env.speaker.say("This is a demo of the Naphome 0.9.");
        std::thread::sleep(env.timing.after_intro);

        let mut summary = SuiteSummary::default();
        for (i, name) in TEST_NAMES.iter().enumerate() {
            let num = i as u8 + 1;
            tracing::info!(test = num, name, "running demo step");
            env.speaker.say(&format!("Test {num}. {}", INTROS[i]));
            let status = self.run_step(num);
            tracing::info!(test = num, status = status.code(), "demo step done");
            self.board.record(num, status);
            env.face.test_status(status);
            summary.count(status);
            std::thread::sleep(env.timing.between_tests);
        }

        tracing::info!(
            passed = summary.passed,
            warnings = summary.warnings,
            failed = summary.failed,
            not_implemented = summary.not_implemented,
            "demo suite complete"
        );
        env.speaker.say(&summary.sentence());
        env.face.test_status(summary.final_status());
        summary
    }

    fn run_step(&self, num: u8) -> TestStatus {
        let env = &self.env;
        let say = |text: &str| env.speaker.say(text);
        match num {
            1 => {
                let memory = (env.memory)();
                if memory.total_heap == 0 || memory.free_heap > LOW_HEAP_BYTES {
                    say("Test 1 passed. System initialized successfully.");
                    TestStatus::Pass
                } else {
                    say("Test 1 warning. Low memory available.");
                    TestStatus::Warning
                }
            }
            2..=5 => {
                let snapshot = env.sensors.latest();
                let (status, line) = sensor_step(num, &snapshot);
                say(&line);
                status
            }
            6 => {
                if !env.face.self_test() {
                    say("Test 6 failed. LED strip not initialized.");
                    return TestStatus::Fail;
                }
                for status in [TestStatus::Pass, TestStatus::Warning, TestStatus::Fail] {
                    env.face.test_status(status);
                    std::thread::sleep(env.timing.led_step);
                }
                say("Test 6 passed. LED control working.");
                TestStatus::Pass
            }
            7 => {
                if (env.network)() {
                    say("Test 7 passed. WiFi connected.");
                    TestStatus::Pass
                } else {
                    say("Test 7 warning. WiFi not connected.");
                    TestStatus::Warning
                }
            }
            11 => {
                if (env.audio)() {
                    say("Test 11 passed. Audio output working.");
                    TestStatus::Pass
                } else {
                    say("Test 11 failed. Audio output not available.");
                    TestStatus::Fail
                }
            }
            12 => {
                let snapshot = env.sensors.latest();
                let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
                let line = telemetry_json(&env.board_name, timestamp, &snapshot);
                tracing::info!(target: "telemetry", "{line}");
                say("Test 12 passed. Sensor telemetry published.");
                TestStatus::Pass
            }
            _ => {
                say(NOT_IMPLEMENTED);
                TestStatus::NotImplemented
            }
        }
    }
}

impl DemoTrigger for Arc<DemoSuite> {
    fn trigger(&self) -> bool {
        self.start()
    }
}

/// Sensor steps pass on hardware, warn on simulated data and fail with no reading.
fn sensor_step(num: u8, snapshot: &SensorSnapshot) -> (TestStatus, String) {
    let reading = match num {
        2 => snapshot.climate.map(|c| {
            (
                c.hardware_present,
                "SHT30",
                format!(
                    "Temperature {:.1} degrees, humidity {:.0} percent.",
                    c.temperature_c, c.humidity_rh
                ),
            )
        }),
        3 => snapshot.air_quality.map(|a| {
            (
                a.hardware_present,
                "SGP30",
                format!("VOC {} parts per billion, CO2 equivalent {} parts per million.", a.tvoc_ppb, a.eco2_ppm),
            )
        }),
        4 => snapshot
            .light
            .map(|l| (l.hardware_present, "BH1750", format!("Light level {:.0} lux.", l.lux))),
        _ => snapshot.co2.map(|c| {
            (
                c.hardware_present,
                "SCD30",
                format!("CO2 {:.0} parts per million.", c.co2_ppm),
            )
        }),
    };
    match reading {
        Some((true, _, values)) => (TestStatus::Pass, format!("Test {num} passed. {values}")),
        Some((false, part, values)) => (
            TestStatus::Warning,
            format!("Test {num} warning. {part} not detected, using simulated data. {values}"),
        ),
        None => (TestStatus::Fail, format!("Test {num} failed. No sensor reading.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::testing::ScriptedSpeaker;
    use crate::led::testing::memory_face;
    use crate::led::{Rgb, status_color};
    use naphome_types::{ClimateSample, LightSample};

    fn env(speaker: Arc<ScriptedSpeaker>, face: Arc<LedFace>, sensors: SensorStore) -> DemoEnv {
        DemoEnv {
            board_name: "Naphome 0.9".to_string(),
            speaker,
            face,
            sensors,
            memory: Arc::new(MemoryInfo::default),
            network: Arc::new(|| false),
            audio: Arc::new(|| true),
            timing: DemoTiming::instant(),
        }
    }

    #[test]
    fn unrun_tests_report_not_implemented() {
        let board = TestBoard::default();
        let results = board.results();
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.status == TestStatus::NotImplemented));
        assert_eq!(results[0].test_num, 1);
        assert_eq!(results[11].name, "Sensor Telemetry Publishing");
        board.record(3, TestStatus::Pass);
        board.record(0, TestStatus::Fail);
        board.record(13, TestStatus::Fail);
        assert_eq!(board.results()[2].status, TestStatus::Pass);
        assert_eq!(board.results()[0].status, TestStatus::NotImplemented);
    }

    #[test]
    fn final_status_follows_counts() {
        let all_pass = SuiteSummary {
            passed: 12,
            ..Default::default()
        };
        assert_eq!(all_pass.final_status(), TestStatus::Pass);
        let with_gaps = SuiteSummary {
            passed: 4,
            warnings: 1,
            not_implemented: 7,
            failed: 0,
        };
        assert_eq!(with_gaps.final_status(), TestStatus::Warning);
        assert_eq!(
            with_gaps.sentence(),
            "Test suite complete. 4 passed, 1 warnings, 0 failed, 7 not implemented."
        );
        let failed = SuiteSummary {
            failed: 1,
            ..Default::default()
        };
        assert_eq!(failed.final_status(), TestStatus::Fail);
    }

    #[test]
    fn sensor_steps_grade_by_presence() {
        let mut snapshot = SensorSnapshot::default();
        snapshot.climate = Some(ClimateSample {
            temperature_c: 22.46,
            humidity_rh: 41.2,
            hardware_present: true,
        });
        snapshot.light = Some(LightSample {
            lux: 310.0,
            hardware_present: false,
        });
        let (status, line) = sensor_step(2, &snapshot);
        assert_eq!(status, TestStatus::Pass);
        assert_eq!(line, "Test 2 passed. Temperature 22.5 degrees, humidity 41 percent.");
        let (status, line) = sensor_step(4, &snapshot);
        assert_eq!(status, TestStatus::Warning);
        assert!(line.starts_with("Test 4 warning. BH1750 not detected"));
        assert_eq!(sensor_step(5, &snapshot).0, TestStatus::Fail);
    }

    #[test]
    fn full_run_speaks_every_step_and_records_results() {
        let speaker = Arc::new(ScriptedSpeaker::default());
        let (face, strip) = memory_face();
        let sensors = SensorStore::default();
        sensors.publish(SensorSnapshot {
            climate: Some(ClimateSample {
                temperature_c: 21.0,
                humidity_rh: 40.0,
                hardware_present: false,
            }),
            ..Default::default()
        });
        let board = Arc::new(TestBoard::default());
        let suite = DemoSuite::new(board.clone(), env(speaker.clone(), face, sensors));

        let summary = suite.run_steps();
        assert_eq!(
            summary,
            SuiteSummary {
                passed: 4,
                warnings: 2,
                failed: 3,
                not_implemented: 3,
            }
        );

        let lines = speaker.lines();
        assert_eq!(lines[0], "This is a demo of the Naphome 0.9.");
        assert_eq!(lines[1], "Test 1. ESP32-S3 system initialization.");
        assert_eq!(lines[2], "Test 1 passed. System initialized successfully.");
        assert!(lines.contains(&"Test 7 warning. WiFi not connected.".to_string()));
        assert!(lines.contains(&"Test 8. AWS IoT Core MQTT connectivity.".to_string()));
        assert_eq!(lines.iter().filter(|l| *l == NOT_IMPLEMENTED).count(), 3);
        assert_eq!(lines.last().unwrap(), &summary.sentence());

        let results = board.results();
        assert_eq!(results[1].status, TestStatus::Warning);
        assert_eq!(results[2].status, TestStatus::Fail);
        assert_eq!(results[5].status, TestStatus::Pass);
        assert_eq!(results[8].status, TestStatus::NotImplemented);

        let last = strip.last().unwrap();
        assert!(last.iter().all(|p| *p == status_color(TestStatus::Fail)));
        assert_ne!(last[0], Rgb::OFF);
    }

    #[test]
    fn trigger_is_exclusive_while_running() {
        let speaker = Arc::new(ScriptedSpeaker::default());
        let (face, _) = memory_face();
        let mut demo_env = env(speaker, face, SensorStore::default());
        demo_env.timing.settle = Duration::from_millis(200);
        let suite = DemoSuite::new(Arc::new(TestBoard::default()), demo_env);

        assert!(suite.trigger());
        assert!(!suite.trigger());
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while suite.is_running() {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(suite.trigger());
    }
}
