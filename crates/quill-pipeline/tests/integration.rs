//! End-to-end integration tests for the quill content workflow.
//!
//! Each test runs the full workflow: build registry -> lint graph -> run ->
//! verify the final result, handoff history, and audit log.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use quill_llm::{TemplateSearch, TextGenerator, UnconfiguredGenerator};
use quill_pipeline::{
    lint, load_run_log, save_run_log, Collaborators, FinalResult, RunnerConfig, Severity,
    StageHandler, StageRegistry, WorkflowEvent, WorkflowGraph, WorkflowRunner,
};
use quill_types::{
    ContentRequest, ContentType, HandoffStatus, QualityReport, QuillError, ResearchOutput,
    RunStatus, SearchHit, Stage, WorkflowState, MAX_REVISIONS,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TOPIC: &str = "AI automation for startups";

/// A blog article of about 890 words that clears every quality check.
fn article() -> String {
    let intro = "Introduction: AI automation for startups is changing how small teams work. \
                 Founders who adopt it early move faster than larger rivals. \
                 This guide explains where the technology helps most and how to begin.";
    let mut parts = vec![intro.to_string()];
    for i in 1..10 {
        parts.push(format!("## Part {i}"));
        parts.push(format!(
            "Section {i} looks at how automation supports daily operations. Teams use AI tools \
             to sort support tickets, draft reports, and flag unusual numbers before they \
             become problems. The technology works best when the process is already clear, so \
             founders should document each step first. Startup leaders also report that \
             innovation speeds up once routine tasks leave the calendar, because people spend \
             more time with customers and less time copying data between systems. Measuring \
             the hours saved each week keeps the effort honest and shows which workflows \
             deserve the next investment."
        ));
    }
    parts.push("## Conclusion".to_string());
    parts.push(
        "In conclusion, AI automation for startups rewards teams that start small, measure \
         results, and expand step by step."
            .to_string(),
    );
    parts.join("\n\n")
}

/// Returns the same text for every prompt and counts calls.
struct CannedWriter {
    text: String,
    calls: AtomicUsize,
}

impl CannedWriter {
    fn new(text: String) -> Arc<Self> {
        Arc::new(Self {
            text,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TextGenerator for CannedWriter {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, QuillError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// Research with a fixed confidence.
struct FixedResearch(f64);

#[async_trait]
impl StageHandler for FixedResearch {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn execute(&self, state: &mut WorkflowState) -> quill_types::Result<()> {
        let results = (0..3)
            .map(|i| SearchHit {
                title: format!("AI automation trend report {i}"),
                snippet: "Automation and technology adoption across startups.".into(),
                link: format!("https://example.com/{i}"),
            })
            .collect();
        state.research = Some(ResearchOutput {
            query: format!("{} trends", state.topic()),
            results,
            confidence: self.0,
            keywords: vec!["ai".into(), "automation".into(), "startup".into()],
            summary: "Found 3 relevant sources. Key topics include: ai, automation".into(),
            source: "fixed".into(),
        });
        Ok(())
    }
}

/// Quality assurance that always reports the same low score.
struct LowQuality(f64);

#[async_trait]
impl StageHandler for LowQuality {
    fn stage(&self) -> Stage {
        Stage::QualityAssurance
    }

    async fn execute(&self, state: &mut WorkflowState) -> quill_types::Result<()> {
        let mut checks = BTreeMap::new();
        checks.insert("keyword_integration".to_string(), false);
        state.quality = Some(QualityReport {
            checks,
            score: self.0,
            feedback: vec!["Keywords not properly integrated".into()],
            revision_needed: true,
        });
        Ok(())
    }
}

fn canned_registry(writer: Arc<CannedWriter>) -> StageRegistry {
    let collaborators = Collaborators {
        writer,
        search: Arc::new(TemplateSearch::new()),
    };
    StageRegistry::standard(collaborators)
}

async fn run(registry: StageRegistry) -> FinalResult {
    WorkflowRunner::new(registry, RunnerConfig::default())
        .expect("standard graph passes lint")
        .run(ContentRequest::new(TOPIC, ContentType::BlogPost).with_audience("startup founders"))
        .await
}

// ---------------------------------------------------------------------------
// Test 1: A good draft goes straight through to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_completes_without_revisions() {
    let writer = CannedWriter::new(article());
    let result = run(canned_registry(writer.clone())).await;

    assert!(result.success, "errors: {:?}", result.error_messages);
    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.terminal_stage, Stage::Completion);
    assert_eq!(result.analytics.revision_count, 0);
    assert_eq!(writer.calls.load(Ordering::SeqCst), 1);
    assert!(result.error_messages.is_empty());
    assert!(result.stage_failures.is_empty());

    assert_eq!(
        result.analytics.visited_stages,
        vec![
            Stage::Initialize,
            Stage::Research,
            Stage::Analyze,
            Stage::Planning,
            Stage::Writing,
            Stage::Review,
            Stage::Seo,
            Stage::QualityAssurance,
            Stage::FinalAssembly,
            Stage::Completion,
        ]
    );

    let quality = result.quality_score.unwrap();
    assert!((80.0..=100.0).contains(&quality), "quality {quality}");
    let seo = result.seo.as_ref().unwrap();
    assert!((0.0..=100.0).contains(&seo.score));
    assert_eq!(seo.title_suggestions.len(), 4);
    assert!(result.final_content.starts_with("Introduction: AI automation"));
    assert_eq!(result.analytics.research_confidence, Some(1.0));
}

// ---------------------------------------------------------------------------
// Test 2: Every transition leaves a handoff record and a stamped state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handoffs_are_recorded_and_stamped() {
    let result = run(canned_registry(CannedWriter::new(article()))).await;

    assert_eq!(result.handoffs.len(), 9);
    assert_eq!(result.handoff_analytics.total_handoffs, 9);
    assert_eq!(result.state.handoff_history.len(), 9);
    for record in &result.handoffs {
        assert_ne!(record.status, HandoffStatus::ValidationError, "{}", record.transition());
        assert_ne!(record.status, HandoffStatus::Failure, "{}", record.transition());
        assert!(record.checksum.is_some());
    }

    let last = result.handoffs.last().unwrap();
    assert_eq!((last.source, last.target), (Stage::FinalAssembly, Stage::Completion));
    assert_eq!(result.state.metadata.last_handoff.as_deref(), Some(last.id.as_str()));
    assert_eq!(result.state.metadata.current_node, Some(Stage::Completion));
    assert!(result.state.rollback_snapshots.contains_key("pre_workflow_completion"));

    let enrichment = &result.state.enrichment;
    assert!(enrichment.keyword_priorities.is_some());
    assert!(enrichment.writing_context.is_some());
}

// ---------------------------------------------------------------------------
// Test 3: A writer that never produces text still ends with content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_writer_falls_back_and_terminates() {
    let collaborators = Collaborators::new(UnconfiguredGenerator, TemplateSearch::new());
    let result = run(StageRegistry::standard(collaborators)).await;

    assert!(result.terminal_stage.is_terminal());
    assert!(!result.final_content.trim().is_empty());
    assert!(result
        .stage_failures
        .iter()
        .any(|f| f.stage == Stage::Writing && f.fallback_used));
    assert!(result.analytics.revision_count <= MAX_REVISIONS);
    assert!(result.final_content.contains(TOPIC));
}

// ---------------------------------------------------------------------------
// Test 4: Persistent low quality stops after the revision cap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn low_quality_stops_at_revision_cap() {
    let writer = CannedWriter::new(article());
    let mut registry = canned_registry(writer.clone());
    registry.register(LowQuality(40.0));
    let result = run(registry).await;

    assert_eq!(result.terminal_stage, Stage::Error);
    assert_eq!(result.analytics.revision_count, MAX_REVISIONS);
    assert_eq!(result.state.iterations(Stage::RevisionPlanning), MAX_REVISIONS);
    assert_eq!(result.state.iterations(Stage::QualityAssurance), 3);
    assert_eq!(result.status, RunStatus::CompletedWithErrors);
    assert!(result.partial_completion);
    assert!(!result.success);
    // One draft plus one rewrite per revision.
    assert_eq!(writer.calls.load(Ordering::SeqCst), 3);
}

// ---------------------------------------------------------------------------
// Test 5: Weak research is retried once, then accepted with caution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn weak_research_is_retried_once() {
    let mut registry = canned_registry(CannedWriter::new(article()));
    registry.register(FixedResearch(0.5));
    let result = run(registry).await;

    assert_eq!(result.state.iterations(Stage::Research), 2);
    assert_eq!(result.state.iterations(Stage::Analyze), 2);
    assert_eq!(result.state.iterations(Stage::Planning), 1);
    assert_eq!(result.terminal_stage, Stage::Completion);
}

// ---------------------------------------------------------------------------
// Test 6: Research below the caution threshold ends in error handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poor_research_routes_to_error() {
    let mut registry = canned_registry(CannedWriter::new(article()));
    registry.register(FixedResearch(0.2));
    let result = run(registry).await;

    assert_eq!(result.terminal_stage, Stage::Error);
    assert_eq!(
        result.analytics.visited_stages,
        vec![Stage::Initialize, Stage::Research, Stage::Analyze, Stage::Error]
    );
    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.error_messages[0].contains("research_quality"));
    assert!(result
        .final_content
        .starts_with("Content generation failed due to: "));
}

// ---------------------------------------------------------------------------
// Test 7: Strong research proceeds without a retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn strong_research_proceeds_directly() {
    let mut registry = canned_registry(CannedWriter::new(article()));
    registry.register(FixedResearch(0.7));
    let result = run(registry).await;

    assert_eq!(result.state.iterations(Stage::Research), 1);
    assert_eq!(result.terminal_stage, Stage::Completion);
}

// ---------------------------------------------------------------------------
// Test 8: Run log survives a save/load cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_log_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(canned_registry(CannedWriter::new(article()))).await;

    save_run_log(&result, dir.path()).await.unwrap();
    let loaded = load_run_log(dir.path()).await.unwrap().unwrap();

    assert_eq!(loaded.final_content, result.final_content);
    assert_eq!(loaded.status, result.status);
    assert_eq!(loaded.handoffs, result.handoffs);
    assert_eq!(loaded.state, result.state);
}

// ---------------------------------------------------------------------------
// Test 9: The standard graph is lint-clean
// ---------------------------------------------------------------------------

#[test]
fn standard_graph_has_no_lint_errors() {
    let diagnostics = lint(&WorkflowGraph::standard());
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    assert!(errors.is_empty(), "Expected no lint errors: {errors:?}");
}

// ---------------------------------------------------------------------------
// Test 10: Observers see handoffs and routing decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn observers_see_routes_and_handoffs() {
    let runner = WorkflowRunner::new(
        canned_registry(CannedWriter::new(article())),
        RunnerConfig::default(),
    )
    .unwrap();
    let mut rx = runner.emitter().subscribe();
    let result = runner.run(ContentRequest::new(TOPIC, ContentType::BlogPost)).await;

    let mut routes = Vec::new();
    let mut handoffs = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            WorkflowEvent::RouteSelected { stage, label, .. } => routes.push((stage, label)),
            WorkflowEvent::HandoffCompleted { .. } => handoffs += 1,
            _ => {}
        }
    }
    assert_eq!(handoffs, result.handoffs.len());
    assert_eq!(
        routes,
        vec![
            (Stage::Analyze, "proceed".to_string()),
            (Stage::Review, "seo".to_string()),
            (Stage::QualityAssurance, "finalize".to_string()),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 11: A writer that returns empty text still yields salvaged content
// ---------------------------------------------------------------------------

/// Generator that answers every prompt with an empty string.
struct EmptyWriter;

#[async_trait]
impl TextGenerator for EmptyWriter {
    fn name(&self) -> &str {
        "empty"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, QuillError> {
        Ok(String::new())
    }
}

#[tokio::test]
async fn empty_writer_output_is_salvaged() {
    for content_type in ContentType::ALL {
        let collaborators = Collaborators::new(EmptyWriter, TemplateSearch::new());
        let runner =
            WorkflowRunner::new(StageRegistry::standard(collaborators), RunnerConfig::default())
                .unwrap();
        let result = runner.run(ContentRequest::new(TOPIC, content_type)).await;

        assert_eq!(result.terminal_stage, Stage::Error, "{content_type}");
        assert_eq!(result.status, RunStatus::CompletedWithErrors);
        assert!(result.partial_completion);
        assert!(!result.success);
        assert!(!result.final_content.trim().is_empty());
        assert_eq!(result.analytics.revision_count, 0);
        assert!(result
            .stage_failures
            .iter()
            .any(|f| f.stage == Stage::Writing && f.fallback_used));
        assert!(result
            .error_messages
            .iter()
            .any(|m| m == "Edge content_review -> content_revision exceeded 2 traversals"));
    }
}
