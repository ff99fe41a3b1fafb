//! Core types for vdm-engine

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Unique identifier for a task: its creation timestamp in Unix milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKey(pub i64);

impl TaskKey {
    /// Create a new TaskKey
    pub fn new(key: i64) -> Self {
        Self(key)
    }

    /// Key for a task created right now
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskKey {
    fn from(key: i64) -> Self {
        Self(key)
    }
}

impl From<TaskKey> for i64 {
    fn from(key: TaskKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskKey {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Task status
///
/// Lifecycle: `Pending → Analyzing → Downloading → {Merging → Completed} | Completed | Failed | Stopped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not started yet
    #[default]
    Pending,
    /// Engine launched, no progress reported yet
    Analyzing,
    /// Transfer in progress
    Downloading,
    /// Post-processor is merging streams
    Merging,
    /// Finished successfully
    Completed,
    /// Failed with error
    Failed,
    /// Stopped by the user
    Stopped,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Pending,
            1 => Status::Analyzing,
            2 => Status::Downloading,
            3 => Status::Merging,
            4 => Status::Completed,
            5 => Status::Failed,
            6 => Status::Stopped,
            _ => Status::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Pending => 0,
            Status::Analyzing => 1,
            Status::Downloading => 2,
            Status::Merging => 3,
            Status::Completed => 4,
            Status::Failed => 5,
            Status::Stopped => 6,
        }
    }

    /// Whether this status ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Stopped)
    }
}

/// Kind of proxy to route engine traffic through
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Direct connection
    #[default]
    None,
    /// HTTP proxy
    Http,
    /// SOCKS5 proxy
    Socks5,
}

/// Proxy descriptor as entered by the user
///
/// Address and port are kept as text; an empty field disables the proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Proxy kind
    #[serde(default)]
    pub kind: ProxyKind,
    /// Host name or IP address
    #[serde(default)]
    pub address: String,
    /// Port number
    #[serde(default)]
    pub port: String,
}

impl ProxySettings {
    /// Build a proxy descriptor
    pub fn new(kind: ProxyKind, address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            kind,
            address: address.into(),
            port: port.into(),
        }
    }
}

/// External tool driving a download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// youtube-dl (and compatible forks)
    #[default]
    YoutubeDl,
    /// annie
    Annie,
}

impl EngineKind {
    /// Every engine the adapter knows about
    pub const ALL: [EngineKind; 2] = [EngineKind::YoutubeDl, EngineKind::Annie];
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::YoutubeDl => f.write_str("youtube-dl"),
            EngineKind::Annie => f.write_str("annie"),
        }
    }
}

/// What a task downloads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    /// One media item
    #[default]
    SingleMedia,
    /// A new build of the engine binary itself
    EngineUpdate,
}

/// Immutable description of what to download
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Page or media URL handed to the engine
    pub url: String,
    /// Engine that performs the download
    #[serde(default)]
    pub engine: EngineKind,
    /// Format selector understood by the engine (None = engine default)
    #[serde(default)]
    pub format_id: Option<String>,
    /// Destination directory
    pub output_dir: PathBuf,
    /// Proxy descriptor
    #[serde(default)]
    pub proxy: ProxySettings,
    /// Cookie file passed to the engine
    #[serde(default)]
    pub cookies: Option<PathBuf>,
    /// Post-processor (ffmpeg) binary location
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Download kind
    #[serde(default)]
    pub kind: DownloadKind,
}

impl TaskConfig {
    /// Single-media task with engine defaults for everything but URL and destination
    pub fn new(engine: EngineKind, url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            engine,
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }
}

/// One downloadable format reported by an engine's metadata mode
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Media title
    pub title: String,
    /// Media description
    pub description: String,
    /// Engine-specific format selector
    pub format_id: String,
    /// Human-readable format summary
    pub format: String,
    /// Extra note (resolution, codec, ...)
    pub format_note: String,
    /// Container extension
    pub ext: String,
    /// Size in bytes (0 = unknown)
    pub filesize: u64,
}

/// Event emitted by the [`TaskManager`](crate::TaskManager)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A worker was spawned for the task
    Started {
        /// Task key
        key: TaskKey,
        /// Engine running the task
        engine: EngineKind,
    },

    /// The run ended without a process-level failure
    Finished {
        /// Task key
        key: TaskKey,
        /// Status of the sink when the run ended
        status: Status,
    },

    /// The run ended with a process-level failure
    Failed {
        /// Task key
        key: TaskKey,
        /// Error message
        error: String,
    },
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_integer_codes_round_trip() {
        for status in [
            Status::Pending,
            Status::Analyzing,
            Status::Downloading,
            Status::Merging,
            Status::Completed,
            Status::Failed,
            Status::Stopped,
        ] {
            assert_eq!(Status::from_i32(status.to_i32()), status);
        }
    }

    #[test]
    fn unknown_status_code_maps_to_failed() {
        assert_eq!(Status::from_i32(42), Status::Failed);
        assert_eq!(Status::from_i32(-1), Status::Failed);
    }

    #[test]
    fn only_completed_failed_and_stopped_are_terminal() {
        assert!(Status::Completed.is_terminal());
        assert!(Status::Failed.is_terminal());
        assert!(Status::Stopped.is_terminal());
        assert!(!Status::Pending.is_terminal());
        assert!(!Status::Analyzing.is_terminal());
        assert!(!Status::Downloading.is_terminal());
        assert!(!Status::Merging.is_terminal());
    }

    #[test]
    fn task_key_parses_and_displays() {
        let key: TaskKey = "1700000000123".parse().unwrap();
        assert_eq!(key.get(), 1_700_000_000_123);
        assert_eq!(key.to_string(), "1700000000123");
    }

    #[test]
    fn task_config_deserializes_with_defaults() {
        let json = r#"{"url": "https://example.com/v", "output_dir": "/tmp/videos"}"#;
        let config: TaskConfig = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.engine, EngineKind::YoutubeDl);
        assert_eq!(config.kind, DownloadKind::SingleMedia);
        assert_eq!(config.proxy.kind, ProxyKind::None);
        assert!(config.format_id.is_none());
        assert!(config.cookies.is_none());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let event = Event::Finished {
            key: TaskKey(7),
            status: Status::Stopped,
        };
        let json = serde_json::to_value(&event).expect("serialize failed");
        assert_eq!(json["type"], "finished");
        assert_eq!(json["key"], 7);
        assert_eq!(json["status"], "stopped");
    }
}
