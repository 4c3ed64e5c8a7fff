use serde::{Deserialize, Serialize, Serializer};

/// Reason why the last playback request ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Every chunk of the asset reached the sink.
    Eof,
    /// Parse, decode or sink error aborted playback.
    Error,
    /// Playback was stopped by a command or by disabling background audio.
    Stopped,
}

/// Voice pipeline phase, as seen by the audio arbitration layer.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    /// Passive wake-word listening. Background audio may play.
    #[default]
    Idle,
    /// Wake word heard; capturing a command.
    Listening,
    /// Command captured; dispatching and speaking the reply.
    Processing,
}

impl VoiceState {
    pub fn as_u8(self) -> u8 {
        match self {
            VoiceState::Idle => 0,
            VoiceState::Listening => 1,
            VoiceState::Processing => 2,
        }
    }

    /// Unknown values map to `Idle`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => VoiceState::Listening,
            2 => VoiceState::Processing,
            _ => VoiceState::Idle,
        }
    }
}

/// Audio playback status reported on the dashboard.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioStatus {
    /// Asset currently playing, if any.
    pub now_playing: Option<String>,
    /// `wav`, `mp3` or `pcm`.
    pub asset_kind: Option<String>,
    /// `true` while playback is stalled by a user pause or the voice pipeline.
    pub paused: bool,
    /// Elapsed playback time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Sample rate the codec is configured for (Hz).
    pub sample_rate: Option<u32>,
    /// Channel count of the source before downmix.
    pub source_channels: Option<u16>,
    /// Output device name, if known.
    pub device: Option<String>,
    /// Output gain in percent.
    pub volume_percent: u8,
    /// MP3 frames decoded for the current asset.
    pub frames_decoded: Option<u64>,
    /// MP3 decode failures for the current asset.
    pub decode_failures: Option<u64>,
    /// End reason of the last finished request.
    pub end_reason: Option<PlaybackEndReason>,
}

/// Outcome of one demo-suite check.
///
/// Serialized as its numeric code (0 pass, 1 warning, 2 fail, 3 not implemented).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TestStatus {
    Pass,
    Warning,
    Fail,
    #[default]
    NotImplemented,
}

impl TestStatus {
    pub fn code(self) -> u8 {
        match self {
            TestStatus::Pass => 0,
            TestStatus::Warning => 1,
            TestStatus::Fail => 2,
            TestStatus::NotImplemented => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(TestStatus::Pass),
            1 => Some(TestStatus::Warning),
            2 => Some(TestStatus::Fail),
            3 => Some(TestStatus::NotImplemented),
            _ => None,
        }
    }
}

impl Serialize for TestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for TestStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        TestStatus::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown test status {code}")))
    }
}

/// One row of the dashboard test table.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestResult {
    /// 1-based test number.
    pub test_num: u8,
    pub name: String,
    pub status: TestStatus,
}

/// Board identity and uptime.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemInfo {
    pub chip_model: String,
    pub cores: u32,
    pub revision: u32,
    pub cpu_freq_mhz: u32,
    pub uptime_seconds: u64,
}

/// Heap figures in bytes. Zero when the platform does not report them.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryInfo {
    pub free_heap: u64,
    pub total_heap: u64,
    pub largest_free_block: u64,
    pub min_free_heap: u64,
    pub psram_free: u64,
    pub psram_total: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuInfo {
    pub core0_usage: f32,
    pub core1_usage: f32,
}

/// A worker registered with the task registry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    /// `Running`, `Blocked` or `Finished`.
    pub state: String,
    pub priority: u8,
    /// Not measurable on the host; always 0 there.
    pub stack_high_water: u32,
    /// Preferred core, -1 when unpinned.
    pub core_id: i32,
}

/// Latest environmental readings, one entry per sensor.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SensorSnapshot {
    pub climate: Option<ClimateSample>,
    pub air_quality: Option<AirQualitySample>,
    pub light: Option<LightSample>,
    pub co2: Option<Co2Sample>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClimateSample {
    pub temperature_c: f32,
    pub humidity_rh: f32,
    pub hardware_present: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct AirQualitySample {
    pub tvoc_ppb: u16,
    pub eco2_ppm: u16,
    pub hardware_present: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct LightSample {
    pub lux: f32,
    pub hardware_present: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Co2Sample {
    pub co2_ppm: f32,
    pub temperature_c: f32,
    pub humidity_rh: f32,
    pub hardware_present: bool,
}

/// Body of `GET /api/status`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DashboardStatus {
    pub system: SystemInfo,
    pub memory: MemoryInfo,
    pub cpu: CpuInfo,
    pub tasks: Vec<TaskInfo>,
    pub tests: Vec<TestResult>,
    pub sensors: SensorSnapshot,
    pub audio: AudioStatus,
    pub voice_state: VoiceState,
}

/// Body of `POST /api/demo/run`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoRunResponse {
    pub success: bool,
    pub message: String,
}

/// Body of `GET /api/github`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GithubActivity {
    pub commits: u32,
    pub pull_requests: u32,
    pub issues: u32,
    pub repositories: u32,
    pub recent_activity: Vec<ActivityEntry>,
    pub heatmap: Vec<HeatmapDay>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub repo: String,
    pub date: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeatmapDay {
    pub date: String,
    pub count: u32,
}
