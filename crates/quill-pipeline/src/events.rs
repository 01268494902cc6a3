//! Workflow event system for observability.
//!
//! Emits [`WorkflowEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (loggers, dashboards, audit writers) can follow a run
//! without coupling to the runner internals.

use serde::{Deserialize, Serialize};

use quill_types::{HandoffStatus, RunStatus, Stage};

/// Events emitted during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    RunStarted {
        topic: String,
        content_type: String,
    },
    RunCompleted {
        terminal_stage: Stage,
        status: RunStatus,
        duration_ms: u64,
    },
    StageStarted {
        stage: Stage,
        iteration: u32,
    },
    StageCompleted {
        stage: Stage,
        duration_ms: u64,
    },
    StageFailed {
        stage: Stage,
        error: String,
    },
    HandoffCompleted {
        source: Stage,
        target: Stage,
        status: HandoffStatus,
        handoff_id: String,
    },
    RouteSelected {
        stage: Stage,
        label: String,
        target: Stage,
    },
    CycleGuardTripped {
        from: Stage,
        to: Stage,
        traversals: u32,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<WorkflowEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
