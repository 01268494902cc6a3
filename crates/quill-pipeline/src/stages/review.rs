use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use quill_types::{
    count_words, ContentReview, QualityReport, QuillError, Result, RevisionPlan, Stage,
    WorkflowState, MAX_REVISIONS, MIN_QUALITY_SCORE,
};

use super::{head_lower, tail_lower, word_range, StageHandler};

static INFORMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(gonna|wanna|gotta)\b").expect("informal-tone pattern is valid")
});

const BASE_WEIGHT: f64 = 0.7;
const SEO_WEIGHT: f64 = 0.3;

fn mentions_any(content: &str, keywords: &[String]) -> bool {
    let lower = content.to_lowercase();
    keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
}

fn pass_rate(checks: &BTreeMap<String, bool>) -> f64 {
    if checks.is_empty() {
        return 0.0;
    }
    let passed = checks.values().filter(|ok| **ok).count();
    passed as f64 / checks.len() as f64 * 100.0
}

// ---------------------------------------------------------------------------
// content_review
// ---------------------------------------------------------------------------

/// Quick structural review of the fresh draft.
pub struct ReviewStage;

#[async_trait]
impl StageHandler for ReviewStage {
    fn stage(&self) -> Stage {
        Stage::Review
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let draft = state
            .draft
            .as_ref()
            .filter(|d| !d.content.trim().is_empty())
            .ok_or_else(|| QuillError::stage(Stage::Review, "No content to review"))?;

        let (min, max) = word_range(state);
        let words = draft.word_count();
        let tail = tail_lower(&draft.content, 200);

        let criteria: BTreeMap<String, bool> = [
            ("sufficient_length", words >= min),
            ("not_too_long", words <= max),
            (
                "has_introduction",
                head_lower(&draft.content, 200).contains("introduction"),
            ),
            (
                "has_conclusion",
                ["conclusion", "summary", "finally"]
                    .iter()
                    .any(|w| tail.contains(w)),
            ),
            (
                "keyword_integration",
                mentions_any(&draft.content, state.primary_keywords()),
            ),
        ]
        .into_iter()
        .map(|(name, ok)| (name.to_string(), ok))
        .collect();

        let review = ContentReview {
            score: pass_rate(&criteria),
            criteria,
        };
        tracing::info!(score = review.score, words, "Content reviewed");
        state.review = Some(review);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// quality_assurance
// ---------------------------------------------------------------------------

/// Full quality pass over the optimized content, blended with the SEO score.
pub struct QualityStage;

impl QualityStage {
    fn checks(state: &WorkflowState, content: &str) -> BTreeMap<String, bool> {
        let (min, max) = word_range(state);
        let words = count_words(content);
        let lower = content.to_lowercase();
        let tail = tail_lower(content, 300);
        let topic = state.topic().to_lowercase().replace(' ', "");

        // Leading markdown heading markers do not count as the first character.
        let first = content
            .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
            .chars()
            .next();

        [
            ("proper_length", (min..=max).contains(&words)),
            (
                "has_sections",
                content.lines().filter(|l| !l.trim().is_empty()).count() >= 3,
            ),
            ("complete_sentences", content.matches('.').count() >= 3),
            (
                "keyword_integration",
                mentions_any(content, state.primary_keywords()),
            ),
            ("topic_relevance", lower.replace(' ', "").contains(&topic)),
            ("professional_tone", !INFORMAL.is_match(content)),
            (
                "no_placeholders",
                !content.contains('[') && !content.contains("{{"),
            ),
            ("proper_capitalization", first.is_some_and(char::is_uppercase)),
            (
                "conclusion_present",
                ["conclusion", "summary", "finally"]
                    .iter()
                    .any(|w| tail.contains(w)),
            ),
        ]
        .into_iter()
        .map(|(name, ok)| (name.to_string(), ok))
        .collect()
    }
}

#[async_trait]
impl StageHandler for QualityStage {
    fn stage(&self) -> Stage {
        Stage::QualityAssurance
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let content = state
            .best_content()
            .map(str::to_string)
            .ok_or_else(|| QuillError::stage(Stage::QualityAssurance, "No content to check"))?;

        let checks = Self::checks(state, &content);
        let seo = state.seo_score().unwrap_or(0.0);
        let score = pass_rate(&checks) * BASE_WEIGHT + seo * SEO_WEIGHT;

        let failed = |name: &str| !checks.get(name).copied().unwrap_or(false);
        let mut feedback = Vec::new();
        if failed("proper_length") {
            feedback.push(format!(
                "Content length ({} words) outside target range",
                count_words(&content)
            ));
        }
        if failed("keyword_integration") {
            feedback.push("Keywords not properly integrated".to_string());
        }
        if failed("conclusion_present") {
            feedback.push("Content lacks proper conclusion".to_string());
        }
        if failed("professional_tone") {
            feedback.push("Tone not sufficiently professional".to_string());
        }

        let report = QualityReport {
            revision_needed: score < MIN_QUALITY_SCORE && state.revision_count < MAX_REVISIONS,
            checks,
            score,
            feedback,
        };
        tracing::info!(
            score = report.score,
            feedback = report.feedback.len(),
            revision_needed = report.revision_needed,
            "Quality assessed"
        );
        state.quality = Some(report);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// revision_planning
// ---------------------------------------------------------------------------

/// Turns QA feedback into concrete revision strategies.
pub struct RevisionPlanningStage;

#[async_trait]
impl StageHandler for RevisionPlanningStage {
    fn stage(&self) -> Stage {
        Stage::RevisionPlanning
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        state.revision_count += 1;

        let feedback = state
            .quality
            .as_ref()
            .map(|q| q.feedback.join(" ").to_lowercase())
            .unwrap_or_default();
        let (min, _) = word_range(state);
        let words = state.best_content().map_or(0, count_words);

        let mut strategies = Vec::new();
        if feedback.contains("length") {
            strategies.push(if words < min {
                "Expand content with more detailed examples and explanations".to_string()
            } else {
                "Condense content while maintaining key points".to_string()
            });
        }
        if feedback.contains("keyword") {
            strategies.push(format!(
                "Better integrate keywords: {}",
                state.primary_keywords().join(", ")
            ));
        }
        if feedback.contains("conclusion") {
            strategies.push("Add comprehensive conclusion section".to_string());
        }
        if feedback.contains("professional") {
            strategies.push("Enhance professional tone and language".to_string());
        }

        tracing::info!(
            revision = state.revision_count,
            strategies = strategies.len(),
            "Revision planned"
        );
        state.revision = Some(RevisionPlan {
            revision: state.revision_count,
            strategies,
        });
        Ok(())
    }
}
