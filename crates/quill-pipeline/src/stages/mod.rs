//! Stage handler trait, dynamic dispatch wrapper, and stage registry.
//!
//! Each stage of the content workflow is a [`StageHandler`]. Handlers mutate
//! the [`WorkflowState`] in place and degrade to local fallback content when
//! a collaborator fails; an `Err` means the stage could not produce anything
//! usable and the runner routes to the error stage.

mod assembly;
mod planning;
mod research;
mod review;
mod seo;
mod setup;
mod writing;

pub use assembly::{CompletionStage, ErrorStage, FinalAssemblyStage};
pub use planning::PlanningStage;
pub use research::{AnalyzeStage, ResearchStage, TRACKED_KEYWORDS};
pub use review::{QualityStage, ReviewStage, RevisionPlanningStage};
pub use seo::{meta_description, optimize, SeoStage};
pub use setup::InitializeStage;
pub use writing::{fallback_article, ContentRevisionStage, WritingStage};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use quill_llm::{
    GenerationSettings, LlmGenerator, SearchChain, SearchProvider, TemplateSearch, TextGenerator,
    UnconfiguredGenerator,
};
use quill_types::{ContentType, Result, Stage, WorkflowState};

// ---------------------------------------------------------------------------
// StageHandler trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StageHandler: Send + Sync {
    /// The stage this handler runs.
    fn stage(&self) -> Stage;

    /// Execute the stage against the run state.
    async fn execute(&self, state: &mut WorkflowState) -> Result<()>;
}

// ---------------------------------------------------------------------------
// DynStage: object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynStage(Box<dyn StageHandler>);

impl DynStage {
    pub fn new(handler: impl StageHandler + 'static) -> Self {
        Self(Box::new(handler))
    }

    pub fn stage(&self) -> Stage {
        self.0.stage()
    }

    pub async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        self.0.execute(state).await
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the stages call into.
#[derive(Clone)]
pub struct Collaborators {
    pub writer: Arc<dyn TextGenerator>,
    pub search: Arc<dyn SearchProvider>,
}

impl Collaborators {
    pub fn new(writer: impl TextGenerator + 'static, search: impl SearchProvider + 'static) -> Self {
        Self {
            writer: Arc::new(writer),
            search: Arc::new(search),
        }
    }

    /// No text generator and templated search results.
    pub fn offline() -> Self {
        Self::new(UnconfiguredGenerator, TemplateSearch::new())
    }

    /// Providers from the environment. A missing LLM key leaves the writer
    /// unconfigured so writing stages use their local fallback.
    pub fn from_env(settings: GenerationSettings) -> Self {
        let writer: Arc<dyn TextGenerator> = match LlmGenerator::from_env(settings) {
            Ok(generator) => Arc::new(generator),
            Err(e) => {
                tracing::warn!(error = %e, "No LLM provider configured, using fallback content");
                Arc::new(UnconfiguredGenerator)
            }
        };
        Self {
            writer,
            search: Arc::new(SearchChain::from_env()),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::offline()
    }
}

// ---------------------------------------------------------------------------
// StageRegistry
// ---------------------------------------------------------------------------

pub struct StageRegistry {
    handlers: HashMap<Stage, DynStage>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous handler for its stage.
    pub fn register(&mut self, handler: impl StageHandler + 'static) {
        let stage = handler.stage();
        self.handlers.insert(stage, DynStage::new(handler));
    }

    pub fn get(&self, stage: Stage) -> Option<&DynStage> {
        self.handlers.get(&stage)
    }

    pub fn has(&self, stage: Stage) -> bool {
        self.handlers.contains_key(&stage)
    }

    /// Handlers for all thirteen stages.
    pub fn standard(collaborators: Collaborators) -> Self {
        let mut reg = Self::new();
        reg.register(InitializeStage);
        reg.register(ResearchStage::new(collaborators.search.clone()));
        reg.register(AnalyzeStage);
        reg.register(PlanningStage);
        reg.register(WritingStage::new(collaborators.writer.clone()));
        reg.register(ReviewStage);
        reg.register(SeoStage);
        reg.register(QualityStage);
        reg.register(RevisionPlanningStage);
        reg.register(ContentRevisionStage::new(collaborators.writer));
        reg.register(FinalAssemblyStage);
        reg.register(CompletionStage);
        reg.register(ErrorStage);
        reg
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Target word range for the run: the recorded setup, else the profile.
pub(crate) fn word_range(state: &WorkflowState) -> (usize, usize) {
    match &state.setup {
        Some(setup) => (setup.min_words, setup.max_words),
        None => {
            let profile = state.content_type().profile();
            (profile.min_words, profile.max_words)
        }
    }
}

pub(crate) fn writing_style(state: &WorkflowState) -> String {
    state
        .plan
        .as_ref()
        .map(|p| p.writing_style.clone())
        .or_else(|| state.setup.as_ref().map(|s| s.style.clone()))
        .unwrap_or_else(|| state.content_type().profile().style.to_string())
}

pub(crate) fn audience(state: &WorkflowState) -> &str {
    state
        .target_audience()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or("technology professionals")
}

/// Last `n` characters, lowercased.
pub(crate) fn tail_lower(text: &str, n: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    chars[chars.len().saturating_sub(n)..]
        .iter()
        .collect::<String>()
        .to_lowercase()
}

/// First `n` characters, lowercased.
pub(crate) fn head_lower(text: &str, n: usize) -> String {
    text.chars().take(n).collect::<String>().to_lowercase()
}

pub(crate) fn content_type_label(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::BlogPost => "blog post",
        ContentType::SocialMedia => "social media post",
        ContentType::WebsiteCopy => "website copy",
    }
}
