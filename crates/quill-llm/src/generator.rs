//! Text-generation collaborator used by the writing and revision stages.
//!
//! [`TextGenerator`] is the narrow `prompt -> text` seam the pipeline depends
//! on. [`LlmGenerator`] backs it with the provider client; when no provider
//! is configured [`UnconfiguredGenerator`] fails every call so that stages
//! fall back to local templates.

use async_trait::async_trait;

use quill_types::QuillError;

use crate::{LlmClient, LoggingMiddleware, Message, Request, TokenUsageMiddleware};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, QuillError>;
}

// ---------------------------------------------------------------------------
// GenerationSettings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    /// `None` uses the default model of the first registered provider.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 1500,
            temperature: 0.7,
            system_prompt: "You are an expert content writer who produces well-structured, \
                            engaging marketing content."
                .to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// LlmGenerator
// ---------------------------------------------------------------------------

pub struct LlmGenerator {
    client: LlmClient,
    settings: GenerationSettings,
    usage: TokenUsageMiddleware,
}

impl LlmGenerator {
    pub fn new(client: LlmClient, settings: GenerationSettings) -> Self {
        let usage = TokenUsageMiddleware::new();
        Self {
            client: client
                .with_middleware(LoggingMiddleware)
                .with_middleware(usage.clone()),
            settings,
            usage,
        }
    }

    /// Register every provider whose API key is present in the environment.
    pub fn from_env(settings: GenerationSettings) -> Result<Self, QuillError> {
        Ok(Self::new(LlmClient::from_env()?, settings))
    }

    pub fn usage(&self) -> &TokenUsageMiddleware {
        &self.usage
    }

    fn build_request(&self, prompt: &str) -> Request {
        let model = self
            .settings
            .model
            .clone()
            .or_else(|| self.client.default_model().map(String::from))
            .unwrap_or_default();
        let mut request = Request::prompt(model, prompt)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);
        if !self.settings.system_prompt.is_empty() {
            request
                .messages
                .insert(0, Message::system(self.settings.system_prompt.clone()));
        }
        request
    }
}

#[async_trait]
impl TextGenerator for LlmGenerator {
    fn name(&self) -> &str {
        self.client
            .provider_names()
            .first()
            .map(String::as_str)
            .unwrap_or("llm")
    }

    async fn generate(&self, prompt: &str) -> Result<String, QuillError> {
        let request = self.build_request(prompt);
        let response = self.client.complete(&request).await?;
        Ok(response.text.trim().to_string())
    }
}

// ---------------------------------------------------------------------------
// UnconfiguredGenerator
// ---------------------------------------------------------------------------

/// Stand-in for runs without credentials. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, QuillError> {
        Err(QuillError::ProviderUnavailable(
            "no text generation provider configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, ProviderAdapter, Response, Role, Usage};
    use std::sync::{Arc, Mutex};

    struct RecordingProvider {
        seen: Arc<Mutex<Vec<Request>>>,
    }

    #[async_trait]
    impl ProviderAdapter for RecordingProvider {
        async fn complete(&self, request: &Request) -> Result<Response, QuillError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Response {
                id: "r1".into(),
                text: "  Generated body.  ".into(),
                usage: Usage::new(5, 7),
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn default_model(&self) -> &str {
            "recording-model"
        }
    }

    #[tokio::test]
    async fn llm_generator_sends_system_and_user_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut client = LlmClient::new();
        client.register_provider(RecordingProvider { seen: seen.clone() });

        let generator = LlmGenerator::new(client, GenerationSettings::default());
        let text = generator.generate("Write about Rust").await.unwrap();
        assert_eq!(text, "Generated body.");
        assert_eq!(generator.name(), "recording");
        assert_eq!(generator.usage().total_output_tokens(), 7);

        let requests = seen.lock().unwrap();
        let req = &requests[0];
        assert_eq!(req.model, "recording-model");
        assert_eq!(req.max_tokens, Some(1500));
        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.messages[1].content, "Write about Rust");
    }

    #[tokio::test]
    async fn unconfigured_generator_always_fails() {
        let err = UnconfiguredGenerator.generate("anything").await.unwrap_err();
        assert!(matches!(err, QuillError::ProviderUnavailable(_)));
        assert!(err.is_terminal());
    }
}
