//! Configuration types for vdm-engine

use crate::error::{Error, Result};
use crate::types::EngineKind;
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Engine binary locations
///
/// Used as a flattened sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Directory where bundled engine binaries live (default: "./engines")
    #[serde(default = "default_engines_dir")]
    pub engines_dir: PathBuf,

    /// Path to the youtube-dl executable (auto-detected if None)
    #[serde(default)]
    pub youtube_dl_path: Option<PathBuf>,

    /// Path to the annie executable (auto-detected if None)
    #[serde(default)]
    pub annie_path: Option<PathBuf>,

    /// Whether to search PATH for engine binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            engines_dir: default_engines_dir(),
            youtube_dl_path: None,
            annie_path: None,
            search_path: true,
        }
    }
}

impl EnginesConfig {
    /// Explicitly configured binary for an engine, if any
    pub fn explicit_path(&self, kind: EngineKind) -> Option<&PathBuf> {
        match kind {
            EngineKind::YoutubeDl => self.youtube_dl_path.as_ref(),
            EngineKind::Annie => self.annie_path.as_ref(),
        }
    }
}

/// Main configuration for the engine adapter
///
/// Loading this from disk is the host application's job; every field has a default
/// so an empty JSON object is a valid configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Engine binary locations
    #[serde(flatten)]
    pub engines: EnginesConfig,

    /// Encoding label used to decode engine output (default: "utf-8")
    ///
    /// Any WHATWG label is accepted, e.g. "gbk" or "windows-1252".
    #[serde(default = "default_charset")]
    pub charset: String,

    /// How long a stopped engine gets to exit before it is killed (default: 500ms)
    #[serde(default = "default_stop_grace_period", with = "duration_millis_serde")]
    pub stop_grace_period: Duration,

    /// Capacity of the task event broadcast channel (default: 256)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engines: EnginesConfig::default(),
            charset: default_charset(),
            stop_grace_period: default_stop_grace_period(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl Config {
    /// Resolve [`charset`](Self::charset) to a decoder
    pub fn encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.charset.trim().as_bytes()).ok_or_else(|| Error::Config {
            message: format!("unknown charset '{}'", self.charset),
            key: Some("charset".to_string()),
        })
    }
}

fn default_engines_dir() -> PathBuf {
    PathBuf::from("./engines")
}

fn default_true() -> bool {
    true
}

fn default_charset() -> String {
    "utf-8".to_string()
}

fn default_stop_grace_period() -> Duration {
    Duration::from_millis(500)
}

fn default_event_channel_capacity() -> usize {
    256
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");

        assert_eq!(config.engines.engines_dir, PathBuf::from("./engines"));
        assert!(config.engines.search_path);
        assert!(config.engines.youtube_dl_path.is_none());
        assert_eq!(config.charset, "utf-8");
        assert_eq!(config.stop_grace_period, Duration::from_millis(500));
        assert_eq!(config.event_channel_capacity, 256);
    }

    #[test]
    fn engine_fields_are_flattened() {
        let json = r#"{
            "engines_dir": "/opt/vdm/engines",
            "annie_path": "/usr/local/bin/annie",
            "search_path": false,
            "stop_grace_period": 1500
        }"#;
        let config: Config = serde_json::from_str(json).expect("deserialize failed");

        assert_eq!(config.engines.engines_dir, PathBuf::from("/opt/vdm/engines"));
        assert_eq!(
            config.engines.explicit_path(EngineKind::Annie),
            Some(&PathBuf::from("/usr/local/bin/annie"))
        );
        assert!(config.engines.explicit_path(EngineKind::YoutubeDl).is_none());
        assert!(!config.engines.search_path);
        assert_eq!(config.stop_grace_period, Duration::from_millis(1500));
    }

    #[test]
    fn grace_period_serializes_as_millis() {
        let config = Config {
            stop_grace_period: Duration::from_millis(750),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).expect("serialize failed");
        assert_eq!(json["stop_grace_period"], 750);
    }

    #[test]
    fn known_charsets_resolve() {
        let mut config = Config::default();
        assert_eq!(config.encoding().unwrap(), encoding_rs::UTF_8);

        config.charset = "GBK".to_string();
        assert_eq!(config.encoding().unwrap(), encoding_rs::GBK);
    }

    #[test]
    fn unknown_charset_is_a_config_error() {
        let config = Config {
            charset: "klingon-8".to_string(),
            ..Default::default()
        };

        match config.encoding() {
            Err(Error::Config { key, message }) => {
                assert_eq!(key.as_deref(), Some("charset"));
                assert!(message.contains("klingon-8"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }
}
