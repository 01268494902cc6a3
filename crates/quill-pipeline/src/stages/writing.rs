use std::sync::Arc;

use async_trait::async_trait;

use quill_llm::TextGenerator;
use quill_types::{count_words, Draft, QuillError, Result, Stage, WorkflowState};

use super::{audience, content_type_label, word_range, writing_style, StageHandler};

/// Generated text at or below this many characters counts as a failed generation.
const MIN_GENERATED_CHARS: usize = 100;

/// Below this many words a locally revised draft gets an extra sentence.
const MIN_REVISED_WORDS: usize = 300;

fn usable(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (trimmed.chars().count() > MIN_GENERATED_CHARS).then(|| trimmed.to_string())
}

fn section_titles(state: &WorkflowState) -> Vec<String> {
    if let Some(plan) = state.plan.as_ref().filter(|p| !p.sections.is_empty()) {
        return plan.sections.clone();
    }
    if let Some(setup) = state.setup.as_ref().filter(|s| !s.sections.is_empty()) {
        return setup.sections.clone();
    }
    state
        .content_type()
        .profile()
        .sections
        .iter()
        .map(|s| s.title.to_string())
        .collect()
}

fn fallback_section(title: &str, topic: &str, audience: &str) -> String {
    let key = title.to_lowercase();
    if ["introduction", "hook", "headline"].iter().any(|k| key.contains(k)) {
        format!(
            "Understanding {topic} is crucial in today's rapidly evolving landscape. This \
             comprehensive guide explores the key aspects and practical applications that \
             matter most to professionals and organizations."
        )
    } else if ["conclusion", "call to action", "cta"].iter().any(|k| key.contains(k)) {
        format!(
            "In conclusion, {topic} represents a significant opportunity for growth and \
             improvement. By understanding the key principles and implementing best practices, \
             organizations can achieve substantial benefits and competitive advantages."
        )
    } else if key.contains("benefit") || key.contains("value") {
        format!(
            "The primary benefits of {topic} include improved efficiency, enhanced productivity, \
             and competitive advantages. Organizations that adopt this approach typically see \
             measurable improvements in their operations."
        )
    } else if key.contains("main") {
        format!(
            "The implementation of {topic} involves several critical considerations. Research \
             indicates that successful adoption requires careful planning, appropriate \
             resources, and strategic alignment with organizational goals."
        )
    } else {
        format!(
            "This section provides important information about {topic} that is relevant to \
             {audience}. It connects the wider picture to decisions readers face today."
        )
    }
}

/// Templated article used when no text generator produces a usable draft.
pub fn fallback_article(state: &WorkflowState) -> String {
    let topic = state.topic().trim();
    let audience = audience(state);
    let mut article = format!("# {topic}");
    for title in section_titles(state) {
        article.push_str(&format!(
            "\n\n## {title}\n\n{}",
            fallback_section(&title, topic, audience)
        ));
    }
    article
}

// ---------------------------------------------------------------------------
// content_writing
// ---------------------------------------------------------------------------

/// Drafts the article with the configured text generator.
pub struct WritingStage {
    writer: Arc<dyn TextGenerator>,
}

impl WritingStage {
    pub fn new(writer: Arc<dyn TextGenerator>) -> Self {
        Self { writer }
    }

    fn prompt(state: &WorkflowState) -> String {
        let (min, max) = word_range(state);
        let outline = state
            .plan
            .as_ref()
            .map(|p| p.outline.clone())
            .unwrap_or_default();
        let summary = state
            .enrichment
            .writing_context
            .as_ref()
            .map(|c| c.research_summary.clone())
            .or_else(|| state.research.as_ref().map(|r| r.summary.clone()))
            .unwrap_or_default();

        format!(
            "Write a {label} about \"{topic}\".\n\n\
             Target audience: {audience}\n\
             Writing style: {style}\n\
             Length: {min}-{max} words\n\
             Keywords to include naturally: {keywords}\n\n\
             Outline:\n{outline}\n\n\
             Research summary:\n{summary}\n\n\
             Open with an introduction and close with a conclusion. Use markdown headings for \
             each section.",
            label = content_type_label(state.content_type()),
            topic = state.topic().trim(),
            audience = audience(state),
            style = writing_style(state),
            keywords = state.primary_keywords().join(", "),
        )
    }
}

#[async_trait]
impl StageHandler for WritingStage {
    fn stage(&self) -> Stage {
        Stage::Writing
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let prompt = Self::prompt(state);
        let generated = match self.writer.generate(&prompt).await {
            Ok(text) => usable(&text).ok_or_else(|| "Generated draft was too short".to_string()),
            Err(e) => Err(format!("Draft generation failed: {e}")),
        };

        let draft = match generated {
            Ok(text) => Draft::new(text, false),
            Err(reason) => {
                tracing::warn!(writer = self.writer.name(), reason = %reason, "Using fallback draft");
                state.record_failure(Stage::Writing, reason, true);
                Draft::new(fallback_article(state), true)
            }
        };

        tracing::info!(
            words = draft.word_count(),
            fallback = draft.fallback,
            "Draft written"
        );
        state.draft = Some(draft);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// content_revision
// ---------------------------------------------------------------------------

/// Rewrites the current content against the QA feedback and revision plan.
pub struct ContentRevisionStage {
    writer: Arc<dyn TextGenerator>,
}

impl ContentRevisionStage {
    pub fn new(writer: Arc<dyn TextGenerator>) -> Self {
        Self { writer }
    }

    fn prompt(state: &WorkflowState, content: &str) -> String {
        let (min, max) = word_range(state);
        let mut guidance: Vec<String> = state
            .quality
            .as_ref()
            .map(|q| q.feedback.clone())
            .unwrap_or_default();
        if let Some(plan) = &state.revision {
            guidance.extend(plan.strategies.iter().cloned());
        }
        if let Some(strategy) = &state.enrichment.revision_strategy {
            guidance.extend(strategy.specific_actions.iter().cloned());
        }
        let guidance = if guidance.is_empty() {
            "- Improve clarity, structure, and keyword integration".to_string()
        } else {
            guidance
                .iter()
                .map(|g| format!("- {g}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "Revise the following {label} about \"{topic}\".\n\n\
             Apply these improvements:\n{guidance}\n\n\
             Keywords to include naturally: {keywords}\n\
             Length: {min}-{max} words\n\n\
             Current content:\n{content}",
            label = content_type_label(state.content_type()),
            topic = state.topic().trim(),
            keywords = state.primary_keywords().join(", "),
        )
    }

    /// Extends the content locally when the generator is unavailable.
    fn extend(content: &str, topic: &str) -> String {
        let mut revised = content.to_string();
        let lower = content.to_lowercase();
        if !lower.contains("conclusion") && !lower.contains("summary") {
            revised.push_str(&format!(
                "\n\nIn conclusion, {topic} offers significant value and opportunities."
            ));
        }
        if count_words(&revised) < MIN_REVISED_WORDS {
            revised.push_str(&format!(
                " This comprehensive overview of {topic} provides essential insights for \
                 implementation and success."
            ));
        }
        revised
    }
}

#[async_trait]
impl StageHandler for ContentRevisionStage {
    fn stage(&self) -> Stage {
        Stage::ContentRevision
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let content = state
            .best_content()
            .map(str::to_string)
            .ok_or_else(|| QuillError::stage(Stage::ContentRevision, "No content to revise"))?;

        let prompt = Self::prompt(state, &content);
        let generated = match self.writer.generate(&prompt).await {
            Ok(text) => usable(&text).ok_or_else(|| "Revised draft was too short".to_string()),
            Err(e) => Err(format!("Revision generation failed: {e}")),
        };

        let draft = match generated {
            Ok(text) => Draft::new(text, false),
            Err(reason) => {
                tracing::warn!(writer = self.writer.name(), reason = %reason, "Revising locally");
                state.record_failure(Stage::ContentRevision, reason, true);
                Draft::new(Self::extend(&content, state.topic().trim()), true)
            }
        };

        tracing::info!(
            revision = state.revision_count,
            words_before = count_words(&content),
            words_after = draft.word_count(),
            "Content revised"
        );
        state.draft = Some(draft);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_llm::UnconfiguredGenerator;
    use quill_types::{ContentRequest, ContentType};
    use std::sync::Mutex;

    struct Canned {
        text: String,
        prompts: Mutex<Vec<String>>,
    }

    impl Canned {
        fn new(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, prompt: &str) -> std::result::Result<String, QuillError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.text.clone())
        }
    }

    fn state() -> WorkflowState {
        WorkflowState::new(
            ContentRequest::new("AI automation", ContentType::BlogPost).with_keywords(["workflow"]),
        )
    }

    #[tokio::test]
    async fn generated_draft_is_kept() {
        let text = "Introduction to AI automation. ".repeat(10);
        let writer = Canned::new(&text);
        let stage = WritingStage::new(writer.clone());
        let mut state = state();
        stage.execute(&mut state).await.unwrap();

        let draft = state.draft.as_ref().unwrap();
        assert!(!draft.fallback);
        assert_eq!(draft.content, text.trim());
        assert!(state.stage_failures.is_empty());

        let prompts = writer.prompts.lock().unwrap();
        assert!(prompts[0].contains("Write a blog post about \"AI automation\""));
        assert!(prompts[0].contains("Target audience: technology professionals"));
    }

    #[tokio::test]
    async fn short_output_falls_back_to_template() {
        let stage = WritingStage::new(Canned::new("Too short."));
        let mut state = state();
        stage.execute(&mut state).await.unwrap();

        let draft = state.draft.as_ref().unwrap();
        assert!(draft.fallback);
        assert!(draft.content.starts_with("# AI automation"));
        assert!(draft.word_count() > 100);
        assert_eq!(state.stage_failures.len(), 1);
        assert_eq!(state.stage_failures[0].stage, Stage::Writing);
        assert!(!state.has_errors());
    }

    #[test]
    fn fallback_article_has_one_heading_per_section() {
        let state = WorkflowState::new(ContentRequest::new("AI automation", ContentType::WebsiteCopy));
        let article = fallback_article(&state);
        assert_eq!(article.matches("\n## ").count(), 4);
        assert!(article.contains("## CTA\n\nIn conclusion, AI automation"));
    }

    #[tokio::test]
    async fn revision_uses_generator_output() {
        let revised = "A fully revised article about AI automation with a proper conclusion. ".repeat(3);
        let writer = Canned::new(&revised);
        let stage = ContentRevisionStage::new(writer.clone());
        let mut state = state();
        state.draft = Some(Draft::new("Original text.", false));
        stage.execute(&mut state).await.unwrap();

        assert_eq!(state.draft.as_ref().unwrap().content, revised.trim());
        assert!(writer.prompts.lock().unwrap()[0].contains("Current content:\nOriginal text."));
    }

    #[tokio::test]
    async fn revision_extends_locally_without_generator() {
        let stage = ContentRevisionStage::new(Arc::new(UnconfiguredGenerator));
        let mut state = state();
        state.draft = Some(Draft::new("Short draft about AI.", false));
        stage.execute(&mut state).await.unwrap();

        let content = &state.draft.as_ref().unwrap().content;
        assert!(content.contains("In conclusion, AI automation offers significant value"));
        assert!(content.ends_with("essential insights for implementation and success."));
        assert_eq!(state.stage_failures.len(), 1);
    }

    #[tokio::test]
    async fn revision_without_content_fails() {
        let stage = ContentRevisionStage::new(Arc::new(UnconfiguredGenerator));
        let mut state = state();
        assert!(stage.execute(&mut state).await.is_err());
    }
}
