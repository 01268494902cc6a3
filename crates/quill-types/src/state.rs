//! The workflow state threaded through every stage of a run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContentType, Enrichment, Stage};

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

// ---------------------------------------------------------------------------
// ContentRequest: run inputs
// ---------------------------------------------------------------------------

/// Caller-supplied parameters for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRequest {
    pub topic: String,
    pub content_type: ContentType,
    pub target_audience: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ContentRequest {
    pub fn new(topic: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            topic: topic.into(),
            content_type,
            target_audience: None,
            keywords: Vec::new(),
        }
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.target_audience = Some(audience.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Per-stage outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
    pub link: String,
}

/// Written by `initialize_workflow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSetup {
    pub min_words: usize,
    pub max_words: usize,
    pub style: String,
    pub sections: Vec<String>,
}

/// Written by `research_agent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchOutput {
    pub query: String,
    pub results: Vec<SearchHit>,
    /// 0.0–1.0 estimate of research sufficiency.
    pub confidence: f64,
    pub keywords: Vec<String>,
    pub summary: String,
    /// Name of the search provider that produced the results.
    pub source: String,
}

/// Written by `analyze_research`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchAnalysis {
    pub sufficient_sources: bool,
    pub sufficient_keywords: bool,
    pub high_confidence: bool,
    pub trending_topics: Vec<String>,
}

/// Written by `content_planning`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPlan {
    pub outline: String,
    pub sections: Vec<String>,
    pub primary_keywords: Vec<String>,
    pub writing_style: String,
}

/// Written by `content_writing` and replaced by `content_revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub content: String,
    /// `true` when the text came from the local template instead of the generator.
    pub fallback: bool,
}

impl Draft {
    pub fn new(content: impl Into<String>, fallback: bool) -> Self {
        Self {
            content: content.into(),
            fallback,
        }
    }

    pub fn word_count(&self) -> usize {
        count_words(&self.content)
    }
}

/// Written by `content_review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentReview {
    pub criteria: BTreeMap<String, bool>,
    /// Percentage of criteria met, 0–100.
    pub score: f64,
}

/// Written by `seo_optimization`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoOutput {
    pub optimized_content: String,
    /// 0–100.
    pub score: f64,
    pub meta_description: String,
    pub title_suggestions: Vec<String>,
    pub keywords: Vec<String>,
}

/// Written by `quality_assurance`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: BTreeMap<String, bool>,
    /// 0–100, blended with the SEO score.
    pub score: f64,
    pub feedback: Vec<String>,
    pub revision_needed: bool,
}

/// Written by `revision_planning`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPlan {
    pub revision: u32,
    pub strategies: Vec<String>,
}

// ---------------------------------------------------------------------------
// Control and audit types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithFallbacks,
    CompletedWithErrors,
    Failed,
}

/// A stage whose core work failed. `fallback_used` tells whether local
/// content was substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
    pub fallback_used: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Success,
    Warning,
    Failure,
    Partial,
    ValidationError,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStatus::Success => "success",
            HandoffStatus::Warning => "warning",
            HandoffStatus::Failure => "failure",
            HandoffStatus::Partial => "partial",
            HandoffStatus::ValidationError => "validation_error",
        }
    }
}

/// Compact handoff entry stamped onto the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffSummary {
    pub id: String,
    pub source: Stage,
    pub target: Stage,
    pub timestamp: DateTime<Utc>,
    pub status: HandoffStatus,
    pub processing_time: f64,
}

/// Run bookkeeping. Stage data lives in the typed outputs, not here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub started_at: Option<DateTime<Utc>>,
    pub current_node: Option<Stage>,
    pub last_handoff: Option<String>,
    pub last_checksum: Option<String>,
}

/// Partial copy of the state taken before a handoff's transformations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub timestamp: DateTime<Utc>,
    pub stage: Stage,
    pub draft: Option<Draft>,
    pub quality_score: Option<f64>,
    pub error_count: usize,
}

// ---------------------------------------------------------------------------
// WorkflowState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    request: ContentRequest,

    pub current_stage: Stage,

    pub setup: Option<RunSetup>,
    pub research: Option<ResearchOutput>,
    pub analysis: Option<ResearchAnalysis>,
    pub plan: Option<ContentPlan>,
    pub draft: Option<Draft>,
    pub review: Option<ContentReview>,
    pub seo: Option<SeoOutput>,
    pub quality: Option<QualityReport>,
    pub revision: Option<RevisionPlan>,
    pub final_content: Option<String>,
    #[serde(default)]
    pub enrichment: Enrichment,

    /// Incremented only by `revision_planning`.
    pub revision_count: u32,
    /// Executions per stage.
    pub agent_iterations: BTreeMap<Stage, u32>,
    /// Append-only. Non-empty means the run failed somewhere.
    pub error_messages: Vec<String>,
    pub stage_failures: Vec<StageFailure>,
    pub completion_timestamp: Option<DateTime<Utc>>,
    pub status: Option<RunStatus>,

    pub metadata: RunMetadata,
    pub handoff_history: Vec<HandoffSummary>,
    pub rollback_snapshots: BTreeMap<String, RollbackSnapshot>,
}

impl WorkflowState {
    pub fn new(request: ContentRequest) -> Self {
        Self {
            request,
            current_stage: Stage::Initialize,
            setup: None,
            research: None,
            analysis: None,
            plan: None,
            draft: None,
            review: None,
            seo: None,
            quality: None,
            revision: None,
            final_content: None,
            enrichment: Enrichment::default(),
            revision_count: 0,
            agent_iterations: BTreeMap::new(),
            error_messages: Vec::new(),
            stage_failures: Vec::new(),
            completion_timestamp: None,
            status: None,
            metadata: RunMetadata::default(),
            handoff_history: Vec::new(),
            rollback_snapshots: BTreeMap::new(),
        }
    }

    // --- inputs (read-only after creation) ---

    pub fn request(&self) -> &ContentRequest {
        &self.request
    }

    pub fn topic(&self) -> &str {
        &self.request.topic
    }

    pub fn content_type(&self) -> ContentType {
        self.request.content_type
    }

    pub fn target_audience(&self) -> Option<&str> {
        self.request.target_audience.as_deref()
    }

    pub fn requested_keywords(&self) -> &[String] {
        &self.request.keywords
    }

    // --- derived values ---

    /// Word count of the current draft, 0 before any draft exists.
    pub fn word_count(&self) -> usize {
        self.draft.as_ref().map_or(0, Draft::word_count)
    }

    pub fn research_confidence(&self) -> Option<f64> {
        self.research.as_ref().map(|r| r.confidence)
    }

    pub fn seo_score(&self) -> Option<f64> {
        self.seo.as_ref().map(|s| s.score)
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.quality.as_ref().map(|q| q.score)
    }

    pub fn primary_keywords(&self) -> &[String] {
        self.plan
            .as_ref()
            .map(|p| p.primary_keywords.as_slice())
            .unwrap_or(&[])
    }

    /// Optimized content when SEO has run, otherwise the draft.
    pub fn best_content(&self) -> Option<&str> {
        self.seo
            .as_ref()
            .map(|s| s.optimized_content.as_str())
            .filter(|c| !c.trim().is_empty())
            .or_else(|| self.draft.as_ref().map(|d| d.content.as_str()))
            .filter(|c| !c.trim().is_empty())
    }

    pub fn has_errors(&self) -> bool {
        !self.error_messages.is_empty()
    }

    pub fn iterations(&self, stage: Stage) -> u32 {
        self.agent_iterations.get(&stage).copied().unwrap_or(0)
    }

    // --- mutation helpers ---

    /// Count one more execution of `stage` and return the new total.
    pub fn bump_iterations(&mut self, stage: Stage) -> u32 {
        let count = self.agent_iterations.entry(stage).or_insert(0);
        *count += 1;
        *count
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.error_messages.push(message.into());
    }

    pub fn record_failure(&mut self, stage: Stage, message: impl Into<String>, fallback_used: bool) {
        self.stage_failures.push(StageFailure {
            stage,
            message: message.into(),
            fallback_used,
        });
    }

    // --- named field view ---

    /// Flat JSON view of the state keyed by the field names the handoff
    /// rules refer to. Fields without a value are absent, not `null`.
    pub fn field_view(&self) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::{json, Value};

        let mut view = serde_json::Map::new();
        let mut put = |key: &str, value: Value| {
            view.insert(key.to_string(), value);
        };

        put("topic", json!(self.request.topic));
        put("content_type", json!(self.request.content_type.as_str()));
        if let Some(audience) = &self.request.target_audience {
            put("target_audience", json!(audience));
        }
        put("specific_keywords", json!(self.request.keywords));
        put("workflow_stage", json!(self.current_stage.phase()));
        put("current_agent", json!(self.current_stage.agent()));
        put("revision_count", json!(self.revision_count));
        put("error_messages", json!(self.error_messages));
        put(
            "metadata",
            serde_json::to_value(&self.metadata).unwrap_or_else(|_| json!({})),
        );

        if let Some(research) = &self.research {
            put("research_query", json!(research.query));
            put(
                "search_results",
                serde_json::to_value(&research.results).unwrap_or_else(|_| json!([])),
            );
            put("research_confidence", json!(research.confidence));
            put("extracted_keywords", json!(research.keywords));
            put("research_summary", json!(research.summary));
        }
        if let Some(analysis) = &self.analysis {
            put(
                "research_assessment",
                json!({
                    "sufficient_sources": analysis.sufficient_sources,
                    "sufficient_keywords": analysis.sufficient_keywords,
                    "high_confidence": analysis.high_confidence,
                }),
            );
            put("trending_topics", json!(analysis.trending_topics));
        }
        if let Some(plan) = &self.plan {
            put("content_outline", json!(plan.outline));
            put("content_sections", json!(plan.sections));
            put("primary_keywords", json!(plan.primary_keywords));
            put("writing_style", json!(plan.writing_style));
        }
        if let Some(draft) = &self.draft {
            put("draft_content", json!(draft.content));
            put("word_count", json!(draft.word_count()));
        }
        if let Some(review) = &self.review {
            put("review_score", json!(review.score));
        }
        if let Some(seo) = &self.seo {
            put("optimized_content", json!(seo.optimized_content));
            put("seo_score", json!(seo.score));
            put("meta_description", json!(seo.meta_description));
            put("title_suggestions", json!(seo.title_suggestions));
        }
        if let Some(quality) = &self.quality {
            put("quality_score", json!(quality.score));
            put("quality_checks", json!(quality.checks));
            put("quality_feedback", json!(quality.feedback));
        }
        if let Some(revision) = &self.revision {
            put("revision_plan", json!(revision.strategies));
        }
        if let Some(content) = &self.final_content {
            put("final_content", json!(content));
        }

        if let Ok(Value::Object(enriched)) = serde_json::to_value(&self.enrichment) {
            for (key, value) in enriched {
                put(&key, value);
            }
        }

        view
    }
}
