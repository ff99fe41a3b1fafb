//! Waiting helpers for task events and sink state

use std::time::Duration;
use tokio::sync::broadcast;
use vdm_engine::{Event, Status, TaskKey, TaskState};

/// How a run ended, as seen through events
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// Run finished with this status
    Finished(Status),
    /// Run failed with this error
    Failed(String),
    /// Timeout waiting for the run to end
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the final event of `key`'s run
///
/// `events` must have been subscribed before the task was started.
pub async fn wait_for_outcome(
    events: &mut broadcast::Receiver<Event>,
    key: TaskKey,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Finished {
                    key: event_key,
                    status,
                }) if event_key == key => return WaitResult::Finished(status),
                Ok(Event::Failed {
                    key: event_key,
                    error,
                }) if event_key == key => return WaitResult::Failed(error),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Poll `state` until it reports `status`; returns false on timeout
pub async fn wait_for_status(state: &TaskState, status: Status, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, async {
        while state.status() != status {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}
