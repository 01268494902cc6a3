//! Shared types, errors, and workflow state for the Quill content pipeline.
//!
//! This crate provides the foundational types used across all other Quill crates:
//! - `QuillError`: unified error taxonomy
//! - `Stage` / `ContentType`: the fixed vocabulary of the workflow graph
//! - `WorkflowState`: the record threaded through every stage, with typed
//!   per-stage outputs instead of an untyped scratchpad
//! - `HandoffStatus` / `HandoffSummary`: audit entries stamped onto the state

mod enrichment;
mod stage;
mod state;

pub use enrichment::*;
pub use stage::*;
pub use state::*;

/// Revision passes allowed before a run is routed to error handling.
///
/// Shared by the content-quality gate, the final-quality gate, the revision
/// path validation rules, and the guard on the review/revision cycle edge.
pub const MAX_REVISIONS: u32 = 2;

/// Research executions allowed before the research gate stops retrying.
pub const MAX_RESEARCH_ATTEMPTS: u32 = 2;

/// Quality score at or above which QA stops asking for revisions.
pub const MIN_QUALITY_SCORE: f64 = 80.0;

/// Unified error type for all Quill subsystems.
#[derive(Debug, thiserror::Error)]
pub enum QuillError {
    // === Text generation ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("No text generation provider available: {0}")]
    ProviderUnavailable(String),

    // === Search ===
    #[error("Search via {engine} failed: {message}")]
    SearchError { engine: String, message: String },

    // === Workflow ===
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stage '{stage}' failed: {message}")]
    StageError { stage: Stage, message: String },

    #[error("Transformation '{transform}' failed: {message}")]
    TransformFailed { transform: String, message: String },

    #[error("Workflow graph invalid: {0}")]
    GraphError(String),

    #[error("Step limit reached after {steps} stage executions")]
    StepLimitExceeded { steps: usize },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl QuillError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QuillError::RateLimited { .. }
                | QuillError::RequestTimeout { .. }
                | QuillError::ProviderError { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QuillError::AuthError { .. }
                | QuillError::ProviderUnavailable(_)
                | QuillError::InvalidInput(_)
                | QuillError::GraphError(_)
        )
    }

    /// Shorthand for a [`QuillError::StageError`].
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        QuillError::StageError {
            stage,
            message: message.into(),
        }
    }
}

/// A convenience alias for `Result<T, QuillError>`.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = QuillError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_stage_error_uses_wire_name() {
        let err = QuillError::stage(Stage::Writing, "empty draft");
        assert_eq!(
            err.to_string(),
            "Stage 'content_writing' failed: empty draft"
        );
    }

    #[test]
    fn error_display_search_error() {
        let err = QuillError::SearchError {
            engine: "serpapi".into(),
            message: "quota exceeded".into(),
        };
        assert_eq!(err.to_string(), "Search via serpapi failed: quota exceeded");
    }

    #[test]
    fn error_display_step_limit() {
        let err = QuillError::StepLimitExceeded { steps: 50 };
        assert_eq!(
            err.to_string(),
            "Step limit reached after 50 stage executions"
        );
    }

    // --- is_retryable / is_terminal ---

    #[test]
    fn retryable_rate_limited_and_flagged_provider_errors() {
        let rate = QuillError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 1000,
        };
        let flagged = QuillError::ProviderError {
            provider: "x".into(),
            status: 503,
            message: "unavailable".into(),
            retryable: true,
        };
        let unflagged = QuillError::ProviderError {
            provider: "x".into(),
            status: 400,
            message: "bad request".into(),
            retryable: false,
        };
        assert!(rate.is_retryable());
        assert!(flagged.is_retryable());
        assert!(!unflagged.is_retryable());
    }

    #[test]
    fn terminal_auth_and_unavailable() {
        assert!(QuillError::AuthError {
            provider: "x".into()
        }
        .is_terminal());
        assert!(QuillError::ProviderUnavailable("none".into()).is_terminal());
        assert!(!QuillError::RateLimited {
            provider: "x".into(),
            retry_after_ms: 0
        }
        .is_terminal());
    }

    // --- From impls ---

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QuillError = io_err.into();
        assert!(matches!(err, QuillError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: QuillError = json_err.into();
        assert!(matches!(err, QuillError::Json(_)));
    }

    #[test]
    fn revision_cap_is_two() {
        assert_eq!(MAX_REVISIONS, 2);
        assert_eq!(MAX_RESEARCH_ATTEMPTS, 2);
    }
}
