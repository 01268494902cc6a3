use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use quill_types::QuillError;

use crate::{DynProvider, ProviderAdapter, Request, Response};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut Response) {}
}

// ---------------------------------------------------------------------------
// Built-in middleware: LoggingMiddleware
// ---------------------------------------------------------------------------

pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "LLM request"
        );
    }

    fn after(&self, _request: &Request, response: &mut Response) {
        tracing::info!(
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            finish = ?response.finish_reason,
            "LLM response"
        );
    }
}

// ---------------------------------------------------------------------------
// Built-in middleware: TokenUsageMiddleware
// ---------------------------------------------------------------------------

/// Accumulates token usage across calls. Clones share the same counters, so
/// keep one clone to read totals after handing the other to the client.
#[derive(Clone, Default)]
pub struct TokenUsageMiddleware {
    requests: Arc<AtomicU64>,
    total_input: Arc<AtomicU64>,
    total_output: Arc<AtomicU64>,
}

impl TokenUsageMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.total_input.load(Ordering::Relaxed)
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.total_output.load(Ordering::Relaxed)
    }
}

impl Middleware for TokenUsageMiddleware {
    fn after(&self, _request: &Request, response: &mut Response) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_input
            .fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.total_output
            .fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// ModelInfo / ModelCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub context_window: usize,
}

pub struct ModelCatalog {
    models: HashMap<String, ModelInfo>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        let mut models = HashMap::new();

        let known = [
            ("claude-sonnet-4-5-20250929", "anthropic", 200_000),
            ("claude-haiku-4-5-20251001", "anthropic", 200_000),
            ("gpt-4o", "openai", 128_000),
            ("gpt-4o-mini", "openai", 128_000),
            ("gpt-3.5-turbo", "openai", 16_385),
        ];
        for (id, provider, ctx) in known {
            models.insert(
                id.to_string(),
                ModelInfo {
                    id: id.to_string(),
                    provider: provider.to_string(),
                    context_window: ctx,
                },
            );
        }

        Self { models }
    }

    pub fn lookup(&self, model: &str) -> Option<&ModelInfo> {
        self.models.get(model)
    }

    pub fn provider_for_model(&self, model: &str) -> Option<&str> {
        self.models.get(model).map(|m| m.provider.as_str())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

pub struct LlmClient {
    providers: HashMap<String, DynProvider>,
    /// Registration order, used when neither provider nor catalog decide.
    order: Vec<String>,
    model_catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            order: Vec::new(),
            model_catalog: ModelCatalog::new(),
            middleware: Vec::new(),
        }
    }

    pub fn register_provider(&mut self, provider: impl ProviderAdapter + 'static) {
        let name = provider.name().to_string();
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.providers.insert(name, DynProvider::new(provider));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub fn model_catalog(&self) -> &ModelCatalog {
        &self.model_catalog
    }

    pub fn provider_names(&self) -> &[String] {
        &self.order
    }

    /// Default model of the provider that would serve an unrouted request.
    pub fn default_model(&self) -> Option<&str> {
        self.order
            .first()
            .and_then(|name| self.providers.get(name))
            .map(DynProvider::default_model)
    }

    pub async fn complete(&self, request: &Request) -> Result<Response, QuillError> {
        let provider = self.resolve_provider(request)?;
        let mut req = request.clone();

        for m in &self.middleware {
            m.before(&mut req);
        }

        let mut resp = provider.complete(&req).await?;

        for m in &self.middleware {
            m.after(&req, &mut resp);
        }

        Ok(resp)
    }

    fn resolve_provider(&self, request: &Request) -> Result<&DynProvider, QuillError> {
        // 1. Explicit provider field
        if let Some(ref provider_name) = request.provider {
            return self.providers.get(provider_name).ok_or_else(|| {
                QuillError::ProviderUnavailable(format!(
                    "provider '{provider_name}' not registered"
                ))
            });
        }

        // 2. Model catalog lookup
        if let Some(provider_name) = self.model_catalog.provider_for_model(&request.model) {
            if let Some(provider) = self.providers.get(provider_name) {
                return Ok(provider);
            }
        }

        // 3. First registered provider
        self.order
            .first()
            .and_then(|name| self.providers.get(name))
            .ok_or_else(|| QuillError::ProviderUnavailable("no providers registered".into()))
    }

    /// Create from environment variables (detect available API keys).
    pub fn from_env() -> Result<Self, QuillError> {
        let mut client = Self::new();

        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            client.register_provider(adapter);
        }

        if let Ok(adapter) = crate::AnthropicAdapter::from_env() {
            client.register_provider(adapter);
        }

        if client.order.is_empty() {
            return Err(QuillError::ProviderUnavailable(
                "no LLM provider API keys found in environment".to_string(),
            ));
        }

        Ok(client)
    }
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FinishReason, ProviderAdapter, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct MockProvider {
        name: &'static str,
        call_count: Arc<AtomicUsize>,
    }

    impl MockProvider {
        fn named(name: &'static str) -> Self {
            Self {
                name,
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockProvider {
        async fn complete(&self, request: &Request) -> Result<Response, QuillError> {
            self.call_count.fetch_add(1, Ordering::Relaxed);
            Ok(Response {
                id: format!("{}-resp", self.name),
                text: format!("Hello from {}", self.name),
                usage: Usage::new(10, 20),
                model: request.model.clone(),
                finish_reason: FinishReason::EndTurn,
            })
        }

        fn name(&self) -> &str {
            self.name
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }
    }

    // Test 1: register_provider and resolve
    #[tokio::test]
    async fn register_provider_and_complete() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("mock"));

        let mut req = Request::prompt("mock-model", "hello");
        req.provider = Some("mock".into());
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "mock-resp");
        assert_eq!(resp.text, "Hello from mock");
    }

    // Test 2: provider resolution by model name (via catalog)
    #[tokio::test]
    async fn resolve_provider_by_model_name() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("openai"));
        client.register_provider(MockProvider::named("anthropic"));

        let req = Request::prompt("claude-sonnet-4-5-20250929", "hello");
        let resp = client.complete(&req).await.unwrap();
        assert_eq!(resp.id, "anthropic-resp");
    }

    // Test 3: unknown model falls back to the first registered provider
    #[tokio::test]
    async fn resolve_provider_fallback_to_first_registered() {
        let mut client = LlmClient::new();
        client.register_provider(MockProvider::named("openai"));
        client.register_provider(MockProvider::named("anthropic"));

        let resp = client
            .complete(&Request::prompt("unknown-model", "hi"))
            .await
            .unwrap();
        assert_eq!(resp.id, "openai-resp");
        assert_eq!(client.default_model(), Some("mock-model"));
    }

    // Test 4: explicit unknown provider is an error
    #[test]
    fn resolve_provider_unknown_returns_error() {
        let client = LlmClient::new();
        let mut req = Request::prompt("some-model", "hi");
        req.provider = Some("nonexistent".into());
        let err = client.resolve_provider(&req).err().unwrap();
        assert!(matches!(err, QuillError::ProviderUnavailable(_)));
    }

    // Test 5: no providers registered
    #[test]
    fn no_providers_returns_error() {
        let client = LlmClient::new();
        let err = client
            .resolve_provider(&Request::prompt("some-model", "hi"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("no providers registered"));
    }

    // Test 6: middleware before/after called
    #[tokio::test]
    async fn middleware_before_after_called() {
        let before_count = Arc::new(AtomicUsize::new(0));
        let after_count = Arc::new(AtomicUsize::new(0));

        struct CountingMiddleware {
            before_count: Arc<AtomicUsize>,
            after_count: Arc<AtomicUsize>,
        }

        impl Middleware for CountingMiddleware {
            fn before(&self, request: &mut Request) {
                request.temperature = Some(0.1);
                self.before_count.fetch_add(1, Ordering::Relaxed);
            }
            fn after(&self, request: &Request, _response: &mut Response) {
                assert_eq!(request.temperature, Some(0.1));
                self.after_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut client = LlmClient::new().with_middleware(CountingMiddleware {
            before_count: before_count.clone(),
            after_count: after_count.clone(),
        });
        client.register_provider(MockProvider::named("mock"));

        client
            .complete(&Request::prompt("mock-model", "hello"))
            .await
            .unwrap();

        assert_eq!(before_count.load(Ordering::Relaxed), 1);
        assert_eq!(after_count.load(Ordering::Relaxed), 1);
    }

    // Test 7: token usage accumulates across calls
    #[tokio::test]
    async fn token_usage_middleware_accumulates() {
        let usage = TokenUsageMiddleware::new();
        let mut client = LlmClient::new().with_middleware(usage.clone());
        client.register_provider(MockProvider::named("mock"));

        let req = Request::prompt("mock-model", "hello");
        client.complete(&req).await.unwrap();
        assert_eq!(usage.total_input_tokens(), 10);
        assert_eq!(usage.total_output_tokens(), 20);

        client.complete(&req).await.unwrap();
        assert_eq!(usage.requests(), 2);
        assert_eq!(usage.total_input_tokens(), 20);
        assert_eq!(usage.total_output_tokens(), 40);
    }

    #[test]
    fn model_catalog_lookup() {
        let catalog = ModelCatalog::new();
        let info = catalog.lookup("gpt-4o").unwrap();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.context_window, 128_000);
        assert_eq!(
            catalog.provider_for_model("claude-haiku-4-5-20251001"),
            Some("anthropic")
        );
        assert_eq!(catalog.provider_for_model("unknown"), None);
    }
}
