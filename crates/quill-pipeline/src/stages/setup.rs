use async_trait::async_trait;
use chrono::Utc;

use quill_types::{QuillError, Result, RunSetup, Stage, WorkflowState};

use super::StageHandler;

/// Checks the request and records the content profile for the run.
pub struct InitializeStage;

#[async_trait]
impl StageHandler for InitializeStage {
    fn stage(&self) -> Stage {
        Stage::Initialize
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        if state.topic().trim().is_empty() {
            return Err(QuillError::stage(Stage::Initialize, "Topic is required"));
        }

        let profile = state.content_type().profile();
        state.setup = Some(RunSetup {
            min_words: profile.min_words,
            max_words: profile.max_words,
            style: profile.style.to_string(),
            sections: profile.sections.iter().map(|s| s.title.to_string()).collect(),
        });
        state.metadata.started_at.get_or_insert_with(Utc::now);

        tracing::info!(
            topic = %state.topic(),
            content_type = %state.content_type(),
            min_words = profile.min_words,
            max_words = profile.max_words,
            "Workflow initialized"
        );
        Ok(())
    }
}
