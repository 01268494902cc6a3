//! Required inputs per stage and target-specific quality checks, evaluated
//! after a handoff's transformations have run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use quill_types::{Stage, WorkflowState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostValidation {
    pub requirements_met: Vec<String>,
    /// One entry per missing requirement.
    pub missing: Vec<String>,
    /// Starts at 100 and drops per failed quality check.
    pub quality_score: f64,
    pub quality_warnings: Vec<String>,
}

impl PostValidation {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NodeRequirements {
    inputs: HashMap<Stage, Vec<&'static str>>,
}

impl NodeRequirements {
    pub fn standard() -> Self {
        let inputs = HashMap::from([
            (Stage::Initialize, vec!["topic"]),
            (Stage::Research, vec!["topic", "metadata"]),
            (
                Stage::Analyze,
                vec!["search_results", "research_confidence", "extracted_keywords"],
            ),
            (Stage::Planning, vec!["research_assessment", "content_strategy"]),
            (
                Stage::Writing,
                vec!["content_outline", "content_sections", "primary_keywords"],
            ),
            (Stage::Review, vec!["draft_content", "word_count"]),
            (Stage::Seo, vec!["draft_content", "primary_keywords"]),
            (Stage::QualityAssurance, vec!["optimized_content", "seo_score"]),
            (Stage::RevisionPlanning, vec!["quality_feedback", "quality_score"]),
            (Stage::ContentRevision, vec!["draft_content", "revision_strategy"]),
            (
                Stage::FinalAssembly,
                vec!["optimized_content", "quality_score", "metadata"],
            ),
            (Stage::Completion, vec!["final_content", "final_output"]),
            (Stage::Error, vec!["error_messages", "current_agent"]),
        ]);
        Self { inputs }
    }

    pub fn inputs(&self, stage: Stage) -> &[&'static str] {
        self.inputs.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn check(&self, state: &WorkflowState, target: Stage) -> PostValidation {
        let view = state.field_view();
        let mut result = PostValidation {
            requirements_met: Vec::new(),
            missing: Vec::new(),
            quality_score: 100.0,
            quality_warnings: Vec::new(),
        };

        for field in self.inputs(target) {
            if view.get(*field).is_some_and(|v| !v.is_null()) {
                result.requirements_met.push(field.to_string());
            } else {
                result.missing.push(format!(
                    "Target node '{target}' requires field '{field}' which is missing"
                ));
            }
        }

        quality_checks(state, target, &mut result);
        result
    }
}

impl Default for NodeRequirements {
    fn default() -> Self {
        Self::standard()
    }
}

fn quality_checks(state: &WorkflowState, target: Stage, result: &mut PostValidation) {
    let mut penalize = |points: f64, warning: &str| {
        result.quality_score -= points;
        result.quality_warnings.push(warning.to_string());
    };

    match target {
        Stage::Writing => {
            if state.research_confidence().is_some_and(|c| c < 0.5) {
                penalize(20.0, "Low research confidence may affect content quality");
            }
            if state.plan.is_some() && state.primary_keywords().len() < 3 {
                penalize(10.0, "Limited keywords may affect SEO optimization");
            }
        }
        Stage::Seo => {
            if state.word_count() < 300 {
                penalize(30.0, "Content too short for effective SEO optimization");
            }
        }
        Stage::QualityAssurance => {
            if state.seo_score().map_or(true, |s| s < 60.0) {
                penalize(25.0, "Low SEO score may affect overall quality assessment");
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{ContentRequest, ContentType, Draft};

    fn state() -> WorkflowState {
        WorkflowState::new(ContentRequest::new("AI automation", ContentType::BlogPost))
    }

    #[test]
    fn every_stage_has_requirements() {
        let reqs = NodeRequirements::standard();
        for stage in Stage::ALL {
            assert!(!reqs.inputs(stage).is_empty(), "{stage} has no requirements");
        }
    }

    #[test]
    fn missing_inputs_are_reported() {
        let reqs = NodeRequirements::standard();
        let result = reqs.check(&state(), Stage::Review);
        assert!(!result.is_complete());
        assert_eq!(
            result.missing[0],
            "Target node 'content_review' requires field 'draft_content' which is missing"
        );

        let result = reqs.check(&state(), Stage::Research);
        assert!(result.is_complete());
        assert_eq!(result.requirements_met, vec!["topic", "metadata"]);
    }

    #[test]
    fn short_content_lowers_seo_quality() {
        let reqs = NodeRequirements::standard();
        let mut s = state();
        s.draft = Some(Draft::new("too short", false));
        let result = reqs.check(&s, Stage::Seo);
        assert_eq!(result.quality_score, 70.0);
        assert_eq!(
            result.quality_warnings,
            vec!["Content too short for effective SEO optimization".to_string()]
        );
    }

    #[test]
    fn missing_seo_score_counts_as_low() {
        let reqs = NodeRequirements::standard();
        let result = reqs.check(&state(), Stage::QualityAssurance);
        assert_eq!(result.quality_score, 75.0);
    }
}
