//! Workflow runner: the stage traversal loop.
//!
//! A run executes one stage, picks the next stage (through the stage's decision
//! gate when it has one), checks traversal guards, and moves the state across
//! the edge with the [`HandoffManager`]. Every failure ends in the error stage
//! and [`WorkflowRunner::run`] always returns a [`FinalResult`].

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use quill_types::{
    ContentRequest, QuillError, Result, RunStatus, Stage, StageFailure, WorkflowState,
};

use crate::decision::decide;
use crate::events::{EventEmitter, WorkflowEvent};
use crate::graph::WorkflowGraph;
use crate::handoff::{Handoff, HandoffAnalytics, HandoffManager, HandoffRecord};
use crate::lint::lint_or_raise;
use crate::stages::StageRegistry;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configuration for a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Upper bound on stage executions before the run is sent to error handling.
    pub max_steps: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { max_steps: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoSummary {
    pub meta_description: String,
    pub title_suggestions: Vec<String>,
    pub keywords: Vec<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAnalytics {
    /// Seconds.
    pub total_processing_time: f64,
    pub stage_iterations: BTreeMap<Stage, u32>,
    pub revision_count: u32,
    pub research_confidence: Option<f64>,
    /// Stages in execution order, repeats included.
    pub visited_stages: Vec<Stage>,
    pub word_count: usize,
}

/// The outcome of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub success: bool,
    pub status: RunStatus,
    pub terminal_stage: Stage,
    pub final_content: String,
    pub quality_score: Option<f64>,
    pub seo: Option<SeoSummary>,
    pub analytics: RunAnalytics,
    pub error_messages: Vec<String>,
    pub stage_failures: Vec<StageFailure>,
    /// Error handling salvaged a draft.
    pub partial_completion: bool,
    pub handoffs: Vec<HandoffRecord>,
    pub handoff_analytics: HandoffAnalytics,
    pub state: WorkflowState,
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

pub struct WorkflowRunner {
    graph: WorkflowGraph,
    registry: StageRegistry,
    handoffs: HandoffManager,
    config: RunnerConfig,
    emitter: EventEmitter,
}

/// Per-run bookkeeping.
struct Trace {
    handoffs: HandoffManager,
    traversals: HashMap<(Stage, Stage), u32>,
    visited: Vec<Stage>,
    steps: usize,
}

impl WorkflowRunner {
    /// Runner over the standard content workflow graph.
    pub fn new(registry: StageRegistry, config: RunnerConfig) -> Result<Self> {
        Self::with_graph(WorkflowGraph::standard(), registry, config)
    }

    /// Runner over a custom graph. The graph must pass lint.
    pub fn with_graph(
        graph: WorkflowGraph,
        registry: StageRegistry,
        config: RunnerConfig,
    ) -> Result<Self> {
        for diagnostic in lint_or_raise(&graph)? {
            tracing::warn!(rule = %diagnostic.rule, "{}", diagnostic.message);
        }
        for stage in graph.stages() {
            if !registry.has(*stage) {
                tracing::warn!(stage = %stage, "No handler registered");
            }
        }
        Ok(Self {
            graph,
            registry,
            handoffs: HandoffManager::standard(),
            config,
            emitter: EventEmitter::default(),
        })
    }

    /// Replace the handoff rules. Each run starts from an empty history.
    pub fn with_handoffs(mut self, handoffs: HandoffManager) -> Self {
        self.handoffs = handoffs;
        self
    }

    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn config(&self) -> RunnerConfig {
        self.config
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Run the workflow for `request` to a terminal stage.
    pub async fn run(&self, request: ContentRequest) -> FinalResult {
        let started = Instant::now();
        let mut state = WorkflowState::new(request);
        let mut trace = Trace {
            handoffs: self.handoffs.fresh(),
            traversals: HashMap::new(),
            visited: Vec::new(),
            steps: 0,
        };

        tracing::info!(
            topic = %state.topic(),
            content_type = %state.content_type(),
            graph = %self.graph.name,
            "Workflow started"
        );
        self.emitter.emit(WorkflowEvent::RunStarted {
            topic: state.topic().to_string(),
            content_type: state.content_type().as_str().to_string(),
        });

        let mut stage = self.graph.entry();
        loop {
            if trace.steps >= self.config.max_steps && !stage.is_terminal() {
                let limit = QuillError::StepLimitExceeded { steps: trace.steps };
                tracing::warn!(stage = %stage, "{limit}");
                state.push_error(limit.to_string());
                state = self.transition(state, stage, Stage::Error, &mut trace);
                stage = Stage::Error;
                continue;
            }

            let outcome = self.execute_stage(&mut state, stage, &mut trace).await;
            let next = match outcome {
                Err(e) if stage != Stage::Error => {
                    self.handle_stage_error(&mut state, stage, e);
                    Stage::Error
                }
                Err(e) => {
                    state.push_error(e.to_string());
                    break;
                }
                Ok(()) if stage.is_terminal() => break,
                Ok(()) => self.select_next(&mut state, stage, &mut trace),
            };

            state = self.transition(state, stage, next, &mut trace);
            stage = next;
        }

        self.finish(state, stage, trace, started)
    }

    async fn execute_stage(
        &self,
        state: &mut WorkflowState,
        stage: Stage,
        trace: &mut Trace,
    ) -> Result<()> {
        trace.steps += 1;
        trace.visited.push(stage);
        state.current_stage = stage;
        let iteration = state.bump_iterations(stage);

        tracing::info!(stage = %stage, iteration, "Stage started");
        self.emitter
            .emit(WorkflowEvent::StageStarted { stage, iteration });

        let started = Instant::now();
        let handler = self
            .registry
            .get(stage)
            .ok_or_else(|| QuillError::stage(stage, "No handler registered"))?;
        handler.execute(state).await?;

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(stage = %stage, duration_ms, "Stage completed");
        self.emitter
            .emit(WorkflowEvent::StageCompleted { stage, duration_ms });
        Ok(())
    }

    /// Record the failure and put back the draft from the latest snapshot.
    fn handle_stage_error(&self, state: &mut WorkflowState, stage: Stage, error: QuillError) {
        let message = error.to_string();
        tracing::error!(stage = %stage, error = %message, "Stage failed");
        self.emitter.emit(WorkflowEvent::StageFailed {
            stage,
            error: message.clone(),
        });
        state.push_error(message.clone());
        state.record_failure(stage, message, false);

        let restored = state
            .rollback_snapshots
            .iter()
            .max_by_key(|(_, snapshot)| snapshot.timestamp)
            .and_then(|(name, snapshot)| snapshot.draft.clone().map(|d| (name.clone(), d)));
        if let Some((name, draft)) = restored {
            tracing::debug!(snapshot = %name, "Draft restored from snapshot");
            state.draft = Some(draft);
        }
    }

    /// Follow the stage's gate (or its unconditional edge) and apply the
    /// edge's traversal guard.
    fn select_next(&self, state: &mut WorkflowState, stage: Stage, trace: &mut Trace) -> Stage {
        let edge = match self.graph.gate(stage) {
            Some(gate) => {
                let label = decide(gate, state);
                let edge = self.graph.route(stage, label);
                if let Some(edge) = edge {
                    tracing::info!(stage = %stage, gate = gate.as_str(), label, target = %edge.to, "Route selected");
                    self.emitter.emit(WorkflowEvent::RouteSelected {
                        stage,
                        label: label.to_string(),
                        target: edge.to,
                    });
                    if edge.to == Stage::Error && !state.has_errors() {
                        state.push_error(format!(
                            "Decision '{}' at {stage} selected error handling",
                            gate.as_str()
                        ));
                    }
                }
                edge
            }
            None => self.graph.next(stage),
        };

        let Some(edge) = edge else {
            state.push_error(format!("No outgoing edge from stage '{stage}'"));
            return Stage::Error;
        };

        let traversals = trace.traversals.entry((edge.from, edge.to)).or_insert(0);
        *traversals += 1;
        if let Some(max) = edge.max_traversals {
            if *traversals > max {
                tracing::warn!(from = %edge.from, to = %edge.to, traversals = *traversals, max, "Cycle guard tripped");
                self.emitter.emit(WorkflowEvent::CycleGuardTripped {
                    from: edge.from,
                    to: edge.to,
                    traversals: *traversals,
                });
                state.push_error(format!(
                    "Edge {} -> {} exceeded {max} traversals",
                    edge.from, edge.to
                ));
                return Stage::Error;
            }
        }
        edge.to
    }

    /// Move the state across `from -> to`. A rejected or failed handoff
    /// diverts to the error stage; a handoff into the error stage always
    /// proceeds.
    fn transition(
        &self,
        state: WorkflowState,
        from: Stage,
        to: Stage,
        trace: &mut Trace,
    ) -> WorkflowState {
        let handoff = trace.handoffs.execute(state, from, to);
        self.emit_handoff(handoff.record());

        if handoff.is_accepted() || to == Stage::Error {
            return handoff.into_parts().0;
        }

        if let Handoff::Failed { error, .. } = &handoff {
            tracing::error!(from = %from, to = %to, error = %error, "Handoff failed");
        }
        let (mut state, record) = handoff.into_parts();
        state.error_messages.extend(record.errors.iter().cloned());
        state.push_error(format!("Handoff failed: {from} -> {to}"));

        let handoff = trace.handoffs.execute(state, from, Stage::Error);
        self.emit_handoff(handoff.record());
        handoff.into_parts().0
    }

    fn emit_handoff(&self, record: &HandoffRecord) {
        self.emitter.emit(WorkflowEvent::HandoffCompleted {
            source: record.source,
            target: record.target,
            status: record.status,
            handoff_id: record.id.clone(),
        });
    }

    fn finish(
        &self,
        mut state: WorkflowState,
        terminal_stage: Stage,
        trace: Trace,
        started: Instant,
    ) -> FinalResult {
        let status = *state.status.get_or_insert(RunStatus::Failed);
        let success = matches!(
            status,
            RunStatus::Completed | RunStatus::CompletedWithFallbacks
        );
        let elapsed = started.elapsed();

        let seo = state.seo.as_ref().map(|s| SeoSummary {
            meta_description: s.meta_description.clone(),
            title_suggestions: s.title_suggestions.clone(),
            keywords: s.keywords.clone(),
            score: s.score,
        });
        let analytics = RunAnalytics {
            total_processing_time: elapsed.as_secs_f64(),
            stage_iterations: state.agent_iterations.clone(),
            revision_count: state.revision_count,
            research_confidence: state.research_confidence(),
            visited_stages: trace.visited,
            word_count: state.word_count(),
        };
        let handoff_analytics = trace.handoffs.analytics();

        tracing::info!(
            terminal = %terminal_stage,
            status = ?status,
            steps = trace.steps,
            errors = state.error_messages.len(),
            "Workflow finished"
        );
        self.emitter.emit(WorkflowEvent::RunCompleted {
            terminal_stage,
            status,
            duration_ms: elapsed.as_millis() as u64,
        });

        FinalResult {
            success,
            status,
            terminal_stage,
            final_content: state.final_content.clone().unwrap_or_default(),
            quality_score: state.quality_score(),
            seo,
            analytics,
            error_messages: state.error_messages.clone(),
            stage_failures: state.stage_failures.clone(),
            partial_completion: status == RunStatus::CompletedWithErrors,
            handoffs: trace.handoffs.into_history(),
            handoff_analytics,
            state,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Gate;
    use crate::stages::{Collaborators, StageHandler};
    use async_trait::async_trait;
    use quill_types::ContentType;

    struct FailingStage(Stage);

    #[async_trait]
    impl StageHandler for FailingStage {
        fn stage(&self) -> Stage {
            self.0
        }

        async fn execute(&self, _state: &mut WorkflowState) -> Result<()> {
            Err(QuillError::stage(self.0, "boom"))
        }
    }

    fn request() -> ContentRequest {
        ContentRequest::new("AI automation for startups", ContentType::BlogPost)
    }

    fn runner(registry: StageRegistry) -> WorkflowRunner {
        WorkflowRunner::new(registry, RunnerConfig::default()).unwrap()
    }

    // Test 1: A failing stage routes to error handling with a stage failure
    #[tokio::test]
    async fn failing_stage_routes_to_error() {
        let mut registry = StageRegistry::standard(Collaborators::offline());
        registry.register(FailingStage(Stage::Planning));
        let result = runner(registry).run(request()).await;

        assert_eq!(result.terminal_stage, Stage::Error);
        assert!(!result.success);
        assert!(result
            .error_messages
            .iter()
            .any(|m| m == "Stage 'content_planning' failed: boom"));
        assert_eq!(result.stage_failures.last().map(|f| f.stage), Some(Stage::Planning));
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.final_content.starts_with("Content generation failed due to: "));
    }

    // Test 2: A missing handler is a stage error, not a panic
    #[tokio::test]
    async fn missing_handler_is_reported() {
        let mut registry = StageRegistry::new();
        registry.register(crate::stages::InitializeStage);
        registry.register(crate::stages::ErrorStage);
        let result = runner(registry).run(request()).await;

        assert_eq!(result.terminal_stage, Stage::Error);
        assert!(result.error_messages[0].contains("No handler registered"));
        assert_eq!(
            result.analytics.visited_stages,
            vec![Stage::Initialize, Stage::Research, Stage::Error]
        );
    }

    // Test 3: The step limit sends the run to error handling
    #[tokio::test]
    async fn step_limit_is_enforced() {
        let registry = StageRegistry::standard(Collaborators::offline());
        let runner = WorkflowRunner::new(registry, RunnerConfig { max_steps: 3 }).unwrap();
        let result = runner.run(request()).await;

        assert_eq!(result.terminal_stage, Stage::Error);
        assert_eq!(result.analytics.visited_stages.len(), 4);
        assert!(result.error_messages[0].contains("Step limit reached after 3"));
    }

    // Test 4: Construction rejects a graph that fails lint
    #[test]
    fn invalid_graph_is_rejected() {
        let mut graph = WorkflowGraph::new("broken", Stage::Initialize);
        graph
            .add_edge(Stage::Initialize, Stage::Review)
            .set_gate(Stage::Review, Gate::Content);
        let err = WorkflowRunner::with_graph(graph, StageRegistry::new(), RunnerConfig::default())
            .err()
            .unwrap();
        match err {
            QuillError::GraphError(_) => {}
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // Test 5: Events cover the run lifecycle
    #[tokio::test]
    async fn events_cover_run_lifecycle() {
        let runner = runner(StageRegistry::standard(Collaborators::offline()));
        let mut rx = runner.emitter().subscribe();
        let result = runner.run(request()).await;

        let mut started = 0;
        let mut completed = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                WorkflowEvent::StageStarted { .. } => started += 1,
                WorkflowEvent::RunCompleted { terminal_stage, .. } => {
                    completed = Some(terminal_stage)
                }
                _ => {}
            }
        }
        assert_eq!(started, result.analytics.visited_stages.len());
        assert_eq!(completed, Some(result.terminal_stage));
    }

    /// Review that overwrites the draft before failing.
    struct ClobberingReview;

    #[async_trait]
    impl StageHandler for ClobberingReview {
        fn stage(&self) -> Stage {
            Stage::Review
        }

        async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
            state.draft = Some(quill_types::Draft::new("garbage", false));
            Err(QuillError::stage(Stage::Review, "review crashed"))
        }
    }

    // Test 6: A failing stage's draft edits are rolled back before salvage
    #[tokio::test]
    async fn failed_stage_draft_is_restored_from_snapshot() {
        let mut registry = StageRegistry::standard(Collaborators::offline());
        registry.register(ClobberingReview);
        let result = runner(registry).run(request()).await;

        let snapshot = result
            .state
            .rollback_snapshots
            .get("pre_content_review")
            .and_then(|s| s.draft.clone())
            .unwrap();
        assert_eq!(result.terminal_stage, Stage::Error);
        assert_eq!(result.status, RunStatus::CompletedWithErrors);
        assert_eq!(result.final_content, snapshot.content);
        assert!(result.final_content.starts_with("# AI automation for startups"));
        assert!(!result.final_content.contains("garbage"));
        let failure = result.stage_failures.last().unwrap();
        assert_eq!(failure.stage, Stage::Review);
        assert!(!failure.fallback_used);
        assert!(result
            .error_messages
            .iter()
            .any(|m| m == "Stage 'content_review' failed: review crashed"));
    }
}
