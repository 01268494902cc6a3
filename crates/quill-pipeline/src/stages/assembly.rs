use async_trait::async_trait;
use chrono::Utc;

use quill_types::{Result, RunStatus, Stage, WorkflowState};

use super::StageHandler;

/// Picks the best available content as the final output.
pub struct FinalAssemblyStage;

#[async_trait]
impl StageHandler for FinalAssemblyStage {
    fn stage(&self) -> Stage {
        Stage::FinalAssembly
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let content = state
            .best_content()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Content about {}", state.topic().trim()));
        tracing::info!(words = quill_types::count_words(&content), "Final content assembled");
        state.final_content = Some(content);
        Ok(())
    }
}

/// Marks a successful run complete.
pub struct CompletionStage;

#[async_trait]
impl StageHandler for CompletionStage {
    fn stage(&self) -> Stage {
        Stage::Completion
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let status = if state.stage_failures.iter().any(|f| f.fallback_used) {
            RunStatus::CompletedWithFallbacks
        } else {
            RunStatus::Completed
        };
        state.completion_timestamp = Some(Utc::now());
        state.status = Some(status);
        tracing::info!(status = ?status, "Workflow completed");
        Ok(())
    }
}

/// Salvages whatever content exists when the run cannot finish normally.
pub struct ErrorStage;

#[async_trait]
impl StageHandler for ErrorStage {
    fn stage(&self) -> Stage {
        Stage::Error
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let salvaged = state
            .draft
            .as_ref()
            .map(|d| d.content.clone())
            .filter(|c| !c.trim().is_empty());

        let status = match salvaged {
            Some(content) => {
                state.final_content = Some(content);
                RunStatus::CompletedWithErrors
            }
            None => {
                state.final_content = Some(format!(
                    "Content generation failed due to: {}",
                    state.error_messages.join("; ")
                ));
                RunStatus::Failed
            }
        };
        state.completion_timestamp = Some(Utc::now());
        state.status = Some(status);
        tracing::warn!(
            status = ?status,
            errors = state.error_messages.len(),
            "Workflow ended in error handling"
        );
        Ok(())
    }
}
