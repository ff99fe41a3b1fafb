//! Fake engines: shell scripts installed where the manager looks for engine binaries

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use vdm_engine::engine::profile_for;
use vdm_engine::{Config, EngineKind, TaskConfig, TaskKey, TaskManager, TaskState};

/// Engine that reports progress up to 100% and exits cleanly
pub const COMPLETING_YOUTUBE_DL: &str = r#"
printf '%s\n' '[youtube] abc: Downloading webpage'
printf '%s\n' '[download] Destination: /tmp/out/clip.mp4'
printf '%s\r' '[download]  25.0% of 8.00MiB at  1.00MiB/s ETA 00:06'
printf '%s\r' '[download]  75.0% of 8.00MiB at  2.00MiB/s ETA 00:01'
printf '%s\n' '[download] 100% of 8.00MiB in 00:04'
"#;

/// Engine that reports some progress, then hangs until it is terminated
pub const HANGING_YOUTUBE_DL: &str = r#"
printf '%s\n' '[download]  10.0% of 8.00MiB at  1.00MiB/s ETA 00:07'
exec sleep 30
"#;

/// Engine that rejects the URL
pub const FAILING_YOUTUBE_DL: &str = r#"
printf '%s\n' 'ERROR: Unsupported URL: http://e/v' >&2
exit 1
"#;

/// Directory of fake engine binaries plus a manager configured to use only them
pub struct FakeEngines {
    dir: TempDir,
}

impl FakeEngines {
    /// Empty engines directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Engines directory
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Install `body` as the binary for `kind`
    pub fn install(&self, kind: EngineKind, body: &str) -> PathBuf {
        let path = self.dir.path().join(profile_for(kind).binary_name());
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Configuration that finds engines in this directory only
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.engines.engines_dir = self.dir.path().to_path_buf();
        config.engines.search_path = false;
        config.stop_grace_period = std::time::Duration::from_millis(200);
        config
    }

    /// Manager using [`config`](Self::config)
    pub fn manager(&self) -> TaskManager {
        TaskManager::new(self.config()).unwrap()
    }

    /// Task writing into a subdirectory of the engines directory
    pub fn task(&self, key: i64, kind: EngineKind) -> Arc<TaskState> {
        Arc::new(TaskState::with_key(
            TaskKey::new(key),
            TaskConfig::new(kind, "http://e/v", self.dir.path().join("out")),
        ))
    }
}
