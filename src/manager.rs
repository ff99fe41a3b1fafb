//! Task manager: owns the table of running engine invocations
//!
//! Each started task gets its own [`Engine`] and a tokio worker. The table maps the
//! task key to that engine and the worker handle; the worker removes its own entry
//! when the run ends, so the table only ever holds live runs.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::task_state::TaskState;
use crate::types::{DownloadKind, Event, MediaFormat, TaskConfig, TaskKey};

/// Live run of one task
struct ActiveTask {
    engine: Arc<Engine>,
    handle: JoinHandle<()>,
}

type ActiveTable = Arc<Mutex<HashMap<TaskKey, ActiveTask>>>;

/// Starts, stops and tracks engine runs
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use vdm_engine::{Config, EngineKind, TaskConfig, TaskManager, TaskState};
///
/// # #[tokio::main]
/// # async fn main() -> vdm_engine::Result<()> {
/// let manager = TaskManager::new(Config::default())?;
/// let mut events = manager.subscribe();
///
/// let state = Arc::new(TaskState::new(TaskConfig::new(
///     EngineKind::YoutubeDl,
///     "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
///     "/downloads",
/// )));
/// manager.start(Arc::clone(&state)).await?;
///
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TaskManager {
    config: Arc<Config>,
    active: ActiveTable,
    event_tx: broadcast::Sender<Event>,
}

impl TaskManager {
    /// Create a manager
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configured charset is unknown.
    pub fn new(config: Config) -> Result<Self> {
        config.encoding()?;
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Ok(Self {
            config: Arc::new(config),
            active: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to task events
    ///
    /// Events sent before subscribing are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Start downloading `state`'s task on a new worker
    ///
    /// The sink is reset with [`TaskState::begin`] (status `Analyzing`) before the
    /// worker is spawned, and an [`Event::Started`] is emitted. The worker emits
    /// [`Event::Finished`] or [`Event::Failed`] when the run ends.
    ///
    /// # Errors
    ///
    /// - [`Error::NotSupported`] for engine-update tasks
    /// - [`Error::AlreadyRunning`] if a run for the same key is still live
    /// - [`Error::Config`] if the engine cannot be configured
    pub async fn start(&self, state: Arc<TaskState>) -> Result<()> {
        let key = state.key();
        if state.config().kind == DownloadKind::EngineUpdate {
            return Err(Error::NotSupported(format!(
                "task {key} is an engine update; engine binaries are managed outside the adapter"
            )));
        }

        let mut active = self.active.lock().await;
        if active.get(&key).is_some_and(|task| !task.handle.is_finished()) {
            return Err(Error::AlreadyRunning(key));
        }

        let kind = state.config().engine;
        let engine = Arc::new(Engine::from_config(kind, &self.config)?);
        state.begin();

        let handle = tokio::spawn(run_task(
            Arc::clone(&engine),
            state,
            Arc::clone(&self.active),
            self.event_tx.clone(),
        ));
        // worker removes its entry under this lock, so it cannot run ahead of the insert
        active.insert(key, ActiveTask { engine, handle });

        info!(key = %key, engine = %kind, "task started");
        // sent under the lock so it always precedes the worker's final event
        self.event_tx.send(Event::Started { key, engine: kind }).ok();
        Ok(())
    }

    /// Request a cooperative stop of the run for `key`
    ///
    /// Returns `false` if no run is live for `key`. The worker finishes the sink as
    /// `Stopped` and emits [`Event::Finished`].
    pub async fn stop(&self, key: TaskKey) -> bool {
        let active = self.active.lock().await;
        match active.get(&key) {
            Some(task) => {
                task.engine.stop();
                debug!(key = %key, "stop requested");
                true
            }
            None => false,
        }
    }

    /// Request a stop of every live run; returns how many were signalled
    pub async fn stop_all(&self) -> usize {
        let active = self.active.lock().await;
        for task in active.values() {
            task.engine.stop();
        }
        active.len()
    }

    /// Whether a run for `key` is live
    pub async fn is_active(&self, key: TaskKey) -> bool {
        self.active.lock().await.contains_key(&key)
    }

    /// Number of live runs
    pub async fn active_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// List the formats available for `task`'s URL using its engine
    ///
    /// Runs on the caller's task and touches no sink.
    ///
    /// # Errors
    ///
    /// See [`Engine::fetch_metadata`].
    pub async fn fetch_metadata(&self, task: &TaskConfig) -> Result<Vec<MediaFormat>> {
        Engine::from_config(task.engine, &self.config)?
            .fetch_metadata(task)
            .await
    }

    /// Stop every live run and wait for the workers to exit
    pub async fn shutdown(&self) {
        let tasks: Vec<(TaskKey, ActiveTask)> = self.active.lock().await.drain().collect();
        info!(count = tasks.len(), "shutting down task manager");

        for (_, task) in &tasks {
            task.engine.stop();
        }
        for (key, task) in tasks {
            if let Err(e) = task.handle.await {
                warn!(key = %key, error = %e, "task worker did not exit cleanly");
            }
        }
    }
}

async fn run_task(
    engine: Arc<Engine>,
    state: Arc<TaskState>,
    active: ActiveTable,
    event_tx: broadcast::Sender<Event>,
) {
    let key = state.key();
    let result = engine.download(&state).await;

    {
        let mut active = active.lock().await;
        // after a shutdown the key may already belong to a newer run
        if active
            .get(&key)
            .is_some_and(|task| Arc::ptr_eq(&task.engine, &engine))
        {
            active.remove(&key);
        }
    }

    let event = match result {
        Ok(status) => {
            debug!(key = %key, status = ?status, "task worker finished");
            Event::Finished { key, status }
        }
        Err(e) => {
            warn!(key = %key, error = %e, code = e.error_code(), "task failed");
            Event::Failed {
                key,
                error: e.to_string(),
            }
        }
    };
    event_tx.send(event).ok();
}
