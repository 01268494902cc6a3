//! Content workflow engine: graph, decision gates, handoffs, and stage handlers.
//!
//! This crate implements the quill pipeline: a lint-checked workflow graph over
//! thirteen stages, decision gates with bounded revision loops, a handoff
//! manager that validates, transforms, and stamps the state on every
//! transition, and a runner that always produces a [`FinalResult`].

pub mod audit;
pub mod decision;
pub mod events;
pub mod graph;
pub mod handoff;
pub mod lint;
pub mod requirements;
pub mod runner;
pub mod stages;
pub mod transforms;
pub mod validation;

pub use audit::{load_run_log, save_run_log};
pub use decision::{
    content_gate, content_quality, decide, final_readiness, quality_gate, research_gate,
    ContentRoute, QualityRoute, ResearchRoute,
};
pub use events::{EventEmitter, WorkflowEvent};
pub use graph::{Gate, WorkflowEdge, WorkflowGraph};
pub use handoff::{
    analytics, health_report, state_checksum, DataTransfer, Handoff, HandoffAnalytics,
    HandoffManager, HandoffRecord, HealthReport, HealthStatus,
};
pub use lint::{lint, lint_or_raise, Diagnostic, LintRule, Severity};
pub use requirements::{NodeRequirements, PostValidation};
pub use runner::{FinalResult, RunAnalytics, RunnerConfig, SeoSummary, WorkflowRunner};
pub use stages::{Collaborators, DynStage, StageHandler, StageRegistry};
pub use transforms::{TransformOutcome, TransformResult, TransformRule, TransformRuleSet};
pub use validation::{FieldKind, ValidationReport, ValidationRule, ValidationRuleSet};
