use async_trait::async_trait;

use quill_types::{ContentPlan, Result, Stage, WorkflowState};

use super::StageHandler;

const MAX_PRIMARY_KEYWORDS: usize = 5;

/// Builds the outline and keyword focus the writer works from.
pub struct PlanningStage;

/// Ranked keywords from the analysis handoff when present, otherwise the
/// research keywords, followed by any the request asked for.
fn primary_keywords(state: &WorkflowState) -> Vec<String> {
    let ranked: Vec<String> = match state.enrichment.keyword_priorities.as_ref() {
        Some(priorities) if !priorities.is_empty() => {
            priorities.iter().map(|p| p.keyword.clone()).collect()
        }
        _ => state
            .research
            .as_ref()
            .map(|r| r.keywords.clone())
            .unwrap_or_default(),
    };

    let mut keywords: Vec<String> = Vec::new();
    let candidates = ranked
        .into_iter()
        .take(MAX_PRIMARY_KEYWORDS)
        .chain(state.requested_keywords().iter().cloned());
    for keyword in candidates {
        let keyword = keyword.trim().to_string();
        if !keyword.is_empty() && !keywords.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
            keywords.push(keyword);
        }
    }
    keywords
}

#[async_trait]
impl StageHandler for PlanningStage {
    fn stage(&self) -> Stage {
        Stage::Planning
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let profile = state.content_type().profile();
        let outline = profile
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}: {}", i + 1, s.title, s.purpose))
            .collect::<Vec<_>>()
            .join("\n");

        let plan = ContentPlan {
            outline,
            sections: profile.sections.iter().map(|s| s.title.to_string()).collect(),
            primary_keywords: primary_keywords(state),
            writing_style: profile.style.to_string(),
        };
        tracing::info!(
            sections = plan.sections.len(),
            keywords = plan.primary_keywords.len(),
            style = %plan.writing_style,
            "Content planned"
        );
        state.plan = Some(plan);
        Ok(())
    }
}
