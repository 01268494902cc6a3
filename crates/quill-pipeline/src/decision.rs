//! Decision functions for the three gated stages.
//!
//! Every gate checks `error_messages` first and then applies a numeric
//! threshold. The revision cap is [`MAX_REVISIONS`] in both revision gates.

use serde::{Deserialize, Serialize};

use quill_types::{WorkflowState, MAX_RESEARCH_ATTEMPTS, MAX_REVISIONS, Stage};

use crate::graph::Gate;

// ---------------------------------------------------------------------------
// Research gate
// ---------------------------------------------------------------------------

pub const PROCEED_CONFIDENCE: f64 = 0.7;
pub const RETRY_CONFIDENCE: f64 = 0.4;
pub const CAUTION_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchRoute {
    Proceed,
    ProceedWithCaution,
    Retry,
    Error,
}

impl ResearchRoute {
    pub fn label(&self) -> &'static str {
        match self {
            ResearchRoute::Proceed => "proceed",
            ResearchRoute::ProceedWithCaution => "proceed_with_caution",
            ResearchRoute::Retry => "retry",
            ResearchRoute::Error => "error",
        }
    }
}

/// Route after `analyze_research`. Attempts are counted as executions of
/// the research stage.
pub fn research_gate(state: &WorkflowState) -> ResearchRoute {
    if state.has_errors() {
        return ResearchRoute::Error;
    }
    let confidence = state.research_confidence().unwrap_or(0.0);
    let attempts = state.iterations(Stage::Research);

    if confidence >= PROCEED_CONFIDENCE {
        ResearchRoute::Proceed
    } else if confidence >= RETRY_CONFIDENCE && attempts < MAX_RESEARCH_ATTEMPTS {
        ResearchRoute::Retry
    } else if confidence >= CAUTION_CONFIDENCE {
        tracing::warn!(confidence, attempts, "Proceeding with low research confidence");
        ResearchRoute::ProceedWithCaution
    } else {
        ResearchRoute::Error
    }
}

// ---------------------------------------------------------------------------
// Content gate
// ---------------------------------------------------------------------------

pub const MIN_SEO_WORDS: usize = 200;
pub const PROCEED_CONTENT_QUALITY: f64 = 0.7;
pub const REVISE_CONTENT_QUALITY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentRoute {
    Seo,
    Revise,
    Error,
}

impl ContentRoute {
    pub fn label(&self) -> &'static str {
        match self {
            ContentRoute::Seo => "seo",
            ContentRoute::Revise => "revise",
            ContentRoute::Error => "error",
        }
    }
}

/// Composite 0.0–1.0 heuristic over length, paragraph structure and
/// keyword coverage of the draft.
pub fn content_quality(state: &WorkflowState) -> f64 {
    let mut factors = Vec::with_capacity(3);

    factors.push(match state.word_count() {
        n if n >= 500 => 1.0,
        n if n >= 300 => 0.8,
        n if n >= 100 => 0.6,
        _ => 0.3,
    });

    let content = state
        .draft
        .as_ref()
        .map(|d| d.content.as_str())
        .filter(|c| !c.trim().is_empty());
    if let Some(content) = content {
        let paragraphs = content.split("\n\n").filter(|p| !p.trim().is_empty()).count();
        factors.push((paragraphs as f64 / 4.0).min(1.0));

        let keywords = state.primary_keywords();
        if !keywords.is_empty() {
            let lower = content.to_lowercase();
            let found = keywords
                .iter()
                .filter(|k| lower.contains(&k.to_lowercase()))
                .count();
            factors.push((found as f64 / keywords.len() as f64).min(1.0));
        }
    }

    factors.iter().sum::<f64>() / factors.len() as f64
}

/// Route after `content_review`.
pub fn content_gate(state: &WorkflowState) -> ContentRoute {
    if state.has_errors() {
        return ContentRoute::Error;
    }
    let quality = content_quality(state);
    if state.word_count() >= MIN_SEO_WORDS && quality >= PROCEED_CONTENT_QUALITY {
        ContentRoute::Seo
    } else if quality >= REVISE_CONTENT_QUALITY && state.revision_count < MAX_REVISIONS {
        ContentRoute::Revise
    } else {
        ContentRoute::Error
    }
}

// ---------------------------------------------------------------------------
// Final quality gate
// ---------------------------------------------------------------------------

pub const FINALIZE_READINESS: f64 = 80.0;
pub const REVISE_READINESS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityRoute {
    Finalize,
    Revise,
    Error,
}

impl QualityRoute {
    pub fn label(&self) -> &'static str {
        match self {
            QualityRoute::Finalize => "finalize",
            QualityRoute::Revise => "revise",
            QualityRoute::Error => "error",
        }
    }
}

/// `0.6 * quality + 0.4 * seo`; unset scores count as zero.
pub fn final_readiness(state: &WorkflowState) -> f64 {
    0.6 * state.quality_score().unwrap_or(0.0) + 0.4 * state.seo_score().unwrap_or(0.0)
}

/// Route after `quality_assurance`.
pub fn quality_gate(state: &WorkflowState) -> QualityRoute {
    if state.has_errors() {
        return QualityRoute::Error;
    }
    let readiness = final_readiness(state);
    if readiness >= FINALIZE_READINESS {
        QualityRoute::Finalize
    } else if readiness >= REVISE_READINESS && state.revision_count < MAX_REVISIONS {
        QualityRoute::Revise
    } else {
        QualityRoute::Error
    }
}

/// Evaluate `gate` and return the label of the chosen edge.
pub fn decide(gate: Gate, state: &WorkflowState) -> &'static str {
    match gate {
        Gate::Research => research_gate(state).label(),
        Gate::Content => content_gate(state).label(),
        Gate::Final => quality_gate(state).label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{
        ContentPlan, ContentRequest, ContentType, Draft, QualityReport, ResearchOutput, SeoOutput,
    };

    fn state() -> WorkflowState {
        WorkflowState::new(ContentRequest::new("AI automation", ContentType::BlogPost))
    }

    fn with_confidence(confidence: f64, attempts: u32) -> WorkflowState {
        let mut s = state();
        s.research = Some(ResearchOutput {
            query: "q".into(),
            results: vec![],
            confidence,
            keywords: vec![],
            summary: String::new(),
            source: "test".into(),
        });
        for _ in 0..attempts {
            s.bump_iterations(Stage::Research);
        }
        s
    }

    fn with_scores(quality: f64, seo: f64, revisions: u32) -> WorkflowState {
        let mut s = state();
        s.quality = Some(QualityReport {
            checks: Default::default(),
            score: quality,
            feedback: vec![],
            revision_needed: false,
        });
        s.seo = Some(SeoOutput {
            optimized_content: String::new(),
            score: seo,
            meta_description: String::new(),
            title_suggestions: vec![],
            keywords: vec![],
        });
        s.revision_count = revisions;
        s
    }

    fn article(paragraphs: usize, words_each: usize, keyword: &str) -> String {
        (0..paragraphs)
            .map(|_| {
                let mut p = vec!["word"; words_each - 1];
                p.push(keyword);
                p.join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn research_gate_boundaries() {
        assert_eq!(research_gate(&with_confidence(0.7, 1)), ResearchRoute::Proceed);
        assert_eq!(research_gate(&with_confidence(0.4, 1)), ResearchRoute::Retry);
        assert_eq!(research_gate(&with_confidence(0.3, 1)), ResearchRoute::ProceedWithCaution);
        assert_eq!(research_gate(&with_confidence(0.29, 1)), ResearchRoute::Error);
    }

    #[test]
    fn research_retry_stops_after_two_attempts() {
        assert_eq!(research_gate(&with_confidence(0.5, 2)), ResearchRoute::ProceedWithCaution);
        assert_eq!(research_gate(&with_confidence(0.69, 1)), ResearchRoute::Retry);
    }

    #[test]
    fn errors_win_over_every_threshold() {
        let mut s = with_confidence(1.0, 1);
        s.push_error("boom");
        assert_eq!(research_gate(&s), ResearchRoute::Error);

        let mut s = with_scores(100.0, 100.0, 0);
        s.push_error("boom");
        assert_eq!(quality_gate(&s), QualityRoute::Error);
        assert_eq!(content_gate(&s), ContentRoute::Error);
    }

    #[test]
    fn content_quality_combines_factors() {
        let mut s = state();
        s.plan = Some(ContentPlan {
            outline: String::new(),
            sections: vec![],
            primary_keywords: vec!["automation".into(), "missing".into()],
            writing_style: "informative".into(),
        });
        s.draft = Some(Draft::new(article(4, 130, "automation"), false));
        // words 520 -> 1.0, paragraphs 4 -> 1.0, keywords 1/2 -> 0.5
        assert!((content_quality(&s) - 2.5 / 3.0).abs() < 1e-9);
        assert_eq!(content_gate(&s), ContentRoute::Seo);
    }

    #[test]
    fn short_draft_is_revised_until_cap() {
        let mut s = state();
        s.draft = Some(Draft::new(article(2, 60, "x"), false));
        // words 120 -> 0.6, paragraphs 2 -> 0.5
        assert!((content_quality(&s) - 0.55).abs() < 1e-9);
        assert_eq!(content_gate(&s), ContentRoute::Revise);

        s.revision_count = MAX_REVISIONS;
        assert_eq!(content_gate(&s), ContentRoute::Error);
    }

    #[test]
    fn empty_draft_routes_to_error() {
        assert_eq!(content_gate(&state()), ContentRoute::Error);
    }

    #[test]
    fn quality_gate_blends_scores() {
        assert_eq!(quality_gate(&with_scores(80.0, 80.0, 0)), QualityRoute::Finalize);
        assert_eq!(quality_gate(&with_scores(100.0, 50.0, 0)), QualityRoute::Finalize);
        assert_eq!(quality_gate(&with_scores(70.0, 50.0, 0)), QualityRoute::Revise);
        assert_eq!(quality_gate(&with_scores(70.0, 50.0, 2)), QualityRoute::Error);
        assert_eq!(quality_gate(&with_scores(50.0, 50.0, 0)), QualityRoute::Error);
    }

    #[test]
    fn unset_scores_count_as_zero() {
        assert_eq!(final_readiness(&state()), 0.0);
        assert_eq!(decide(Gate::Final, &state()), "error");
    }
}
