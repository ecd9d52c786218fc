//! In-memory fakes of the remote capabilities for tests.
//!
//! Enabled for downstream crates through the `testing` feature.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RemoteError, RemoteResult};
use crate::notify::Notifier;
use crate::workflow::{RunCounts, WorkflowClient, WorkflowState};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct Remote {
    states: HashMap<String, WorkflowState>,
    runs: HashMap<String, RunCounts>,
    unreadable: HashSet<String>,
    rejecting: HashSet<String>,
    set_calls: Vec<(String, WorkflowState)>,
    latency: Duration,
}

/// Scripted [`WorkflowClient`]. Workflows are keyed by name; the scope is ignored.
#[derive(Default)]
pub struct ScriptedWorkflowClient {
    remote: Mutex<Remote>,
}

impl ScriptedWorkflowClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_remote_state(&self, workflow: &str, state: WorkflowState) {
        lock(&self.remote).states.insert(workflow.to_string(), state);
    }

    pub fn set_runs(&self, workflow: &str, total: u64, failed: u64) {
        lock(&self.remote)
            .runs
            .insert(workflow.to_string(), RunCounts { total, failed });
    }

    /// Make `get_state` and `recent_runs` fail for this workflow.
    pub fn fail_reads(&self, workflow: &str) {
        lock(&self.remote).unreadable.insert(workflow.to_string());
    }

    /// Make `set_state` fail for this workflow.
    pub fn fail_set_state(&self, workflow: &str) {
        lock(&self.remote).rejecting.insert(workflow.to_string());
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.remote).latency = latency;
    }

    pub fn state_of(&self, workflow: &str) -> Option<WorkflowState> {
        lock(&self.remote).states.get(workflow).copied()
    }

    /// Every `set_state` call received, in order, including rejected ones.
    pub fn set_calls(&self) -> Vec<(String, WorkflowState)> {
        lock(&self.remote).set_calls.clone()
    }

    async fn delay(&self) {
        let latency = lock(&self.remote).latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WorkflowClient for ScriptedWorkflowClient {
    async fn get_state(&self, _scope: &str, workflow: &str) -> RemoteResult<WorkflowState> {
        self.delay().await;
        let remote = lock(&self.remote);
        if remote.unreadable.contains(workflow) {
            return Err(RemoteError::Rejected(format!("{workflow} unreadable")));
        }
        remote
            .states
            .get(workflow)
            .copied()
            .ok_or_else(|| RemoteError::Rejected(format!("{workflow} not found")))
    }

    async fn set_state(
        &self,
        _scope: &str,
        workflow: &str,
        desired: WorkflowState,
    ) -> RemoteResult<()> {
        self.delay().await;
        let mut remote = lock(&self.remote);
        remote.set_calls.push((workflow.to_string(), desired));
        if remote.rejecting.contains(workflow) {
            return Err(RemoteError::Rejected(format!("cannot change {workflow}")));
        }
        remote.states.insert(workflow.to_string(), desired);
        Ok(())
    }

    async fn recent_runs(
        &self,
        _scope: &str,
        workflow: &str,
        _window_minutes: u32,
    ) -> RemoteResult<RunCounts> {
        self.delay().await;
        let remote = lock(&self.remote);
        if remote.unreadable.contains(workflow) {
            return Err(RemoteError::Rejected(format!("{workflow} unreadable")));
        }
        Ok(remote.runs.get(workflow).copied().unwrap_or_default())
    }
}

#[derive(Default)]
struct Outbox {
    messages: Vec<String>,
    failing: bool,
}

/// [`Notifier`] that records every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    outbox: Mutex<Outbox>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, sends are recorded but reported as failed.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.outbox).failing = failing;
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.outbox).messages.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> RemoteResult<String> {
        let mut outbox = lock(&self.outbox);
        outbox.messages.push(message.to_string());
        if outbox.failing {
            return Err(RemoteError::Rejected("gateway down".to_string()));
        }
        Ok(format!("msg-{}", outbox.messages.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_tracks_state_changes() {
        let client = ScriptedWorkflowClient::new();
        client.set_remote_state("v3", WorkflowState::Enabled);
        client.fail_set_state("failover");

        client.set_state("rg", "v3", WorkflowState::Disabled).await.unwrap();
        assert!(client.set_state("rg", "failover", WorkflowState::Enabled).await.is_err());

        assert_eq!(client.state_of("v3"), Some(WorkflowState::Disabled));
        assert_eq!(client.state_of("failover"), None);
        assert_eq!(client.set_calls().len(), 2);
    }

    #[tokio::test]
    async fn unknown_workflow_state_is_an_error() {
        let client = ScriptedWorkflowClient::new();
        assert!(client.get_state("rg", "ghost").await.is_err());
        assert_eq!(client.recent_runs("rg", "ghost", 30).await.unwrap(), RunCounts::default());
    }

    #[tokio::test]
    async fn recording_notifier_numbers_messages() {
        let notifier = RecordingNotifier::new();
        assert_eq!(notifier.send("a").await.unwrap(), "msg-1");
        notifier.set_failing(true);
        assert!(notifier.send("b").await.is_err());
        assert_eq!(notifier.messages(), ["a", "b"]);
    }
}
