//! Web-search collaborator used by the research stage.
//!
//! [`SerpApiSearch`] queries Google through SerpAPI. [`TemplateSearch`] builds
//! deterministic results from the query alone so runs work offline.
//! [`SearchChain`] tries providers in order and treats an empty result list as
//! a miss.

use std::sync::Arc;

use async_trait::async_trait;

use quill_types::{QuillError, SearchHit};

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, QuillError>;
}

// ---------------------------------------------------------------------------
// SerpApiSearch
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    num_results: usize,
}

impl SerpApiSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            client: crate::openai::build_http_client(),
            api_key,
            base_url: "https://serpapi.com".to_string(),
            num_results: 5,
        }
    }

    pub fn from_env() -> Result<Self, QuillError> {
        let key = std::env::var("SERPAPI_API_KEY").map_err(|_| QuillError::AuthError {
            provider: "serpapi".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    fn error(&self, message: impl Into<String>) -> QuillError {
        QuillError::SearchError {
            engine: "serpapi".into(),
            message: message.into(),
        }
    }
}

fn parse_organic_results(body: &serde_json::Value, limit: usize) -> Vec<SearchHit> {
    body["organic_results"]
        .as_array()
        .map(|results| {
            results
                .iter()
                .take(limit)
                .map(|r| SearchHit {
                    title: r["title"].as_str().unwrap_or("").to_string(),
                    snippet: r["snippet"].as_str().unwrap_or("").to_string(),
                    link: r["link"].as_str().unwrap_or("").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for SerpApiSearch {
    fn name(&self) -> &str {
        "serpapi"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, QuillError> {
        let num = self.num_results.to_string();
        let url = reqwest::Url::parse_with_params(
            &format!("{}/search", self.base_url),
            &[
                ("engine", "google"),
                ("q", query),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ],
        )
        .map_err(|e| self.error(e.to_string()))?;

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(self.error(format!("HTTP {}", status.as_u16())));
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| self.error(e.to_string()))?;
        if let Some(message) = body["error"].as_str() {
            return Err(self.error(message));
        }

        let hits = parse_organic_results(&body, self.num_results);
        tracing::debug!(query, results = hits.len(), "SerpAPI search");
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// TemplateSearch
// ---------------------------------------------------------------------------

/// Deterministic results built from the query text.
#[derive(Debug, Clone, Copy)]
pub struct TemplateSearch {
    results: usize,
}

impl TemplateSearch {
    pub fn new() -> Self {
        Self { results: 5 }
    }

    pub fn with_results(results: usize) -> Self {
        Self {
            results: results.min(5),
        }
    }
}

impl Default for TemplateSearch {
    fn default() -> Self {
        Self::new()
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn template_hits(query: &str) -> Vec<SearchHit> {
    let title = title_case(query);
    let slug = query.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-");
    vec![
        SearchHit {
            title: format!("Comprehensive Analysis: {title}"),
            link: format!("https://research-insights.com/{slug}"),
            snippet: format!(
                "In-depth analysis of {query} covering market trends, industry insights, and \
                 strategic implications. Expert research and data-driven conclusions about \
                 {query} developments."
            ),
        },
        SearchHit {
            title: format!("{title} - Industry Report 2024"),
            link: format!("https://industry-reports.org/{slug}-2024"),
            snippet: format!(
                "Latest industry report on {query} including market size, growth projections, \
                 competitive landscape, and emerging trends. Comprehensive data and analysis \
                 for {query}."
            ),
        },
        SearchHit {
            title: format!("Best Practices and Implementation Guide for {title}"),
            link: format!("https://implementation-guide.com/{slug}"),
            snippet: format!(
                "Practical implementation guide for {query} with proven strategies, case \
                 studies, and expert recommendations. Step-by-step approach to {query} success."
            ),
        },
        SearchHit {
            title: format!("{title} Technology and Innovation Trends"),
            link: format!("https://tech-innovation.net/{slug}"),
            snippet: format!(
                "Exploring the latest technology and innovation trends in {query}. Future \
                 outlook, emerging technologies, and disruptive developments in the {query} space."
            ),
        },
        SearchHit {
            title: format!("Case Studies: Successful {title} Implementation"),
            link: format!("https://case-studies.business/{slug}"),
            snippet: format!(
                "Real-world case studies of successful {query} implementation across various \
                 industries. Lessons learned, ROI analysis, and implementation strategies for \
                 {query}."
            ),
        },
    ]
}

#[async_trait]
impl SearchProvider for TemplateSearch {
    fn name(&self) -> &str {
        "template"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, QuillError> {
        let mut hits = template_hits(query.trim());
        hits.truncate(self.results);
        Ok(hits)
    }
}

// ---------------------------------------------------------------------------
// SearchChain
// ---------------------------------------------------------------------------

/// Tries each provider in order until one returns results.
#[derive(Clone, Default)]
pub struct SearchChain {
    providers: Vec<Arc<dyn SearchProvider>>,
}

impl SearchChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl SearchProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// SerpAPI when `SERPAPI_API_KEY` is set, then the offline templates.
    pub fn from_env() -> Self {
        let chain = Self::new();
        let chain = match SerpApiSearch::from_env() {
            Ok(serp) => chain.with(serp),
            Err(_) => chain,
        };
        chain.with(TemplateSearch::new())
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

#[async_trait]
impl SearchProvider for SearchChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, QuillError> {
        let mut failures = Vec::new();
        for provider in &self.providers {
            match provider.search(query).await {
                Ok(hits) if !hits.is_empty() => return Ok(hits),
                Ok(_) => {
                    tracing::warn!(engine = provider.name(), "Search returned no results");
                    failures.push(format!("{}: no results", provider.name()));
                }
                Err(e) => {
                    tracing::warn!(engine = provider.name(), error = %e, "Search failed");
                    failures.push(format!("{}: {e}", provider.name()));
                }
            }
        }
        Err(QuillError::SearchError {
            engine: "chain".into(),
            message: if failures.is_empty() {
                "no search providers configured".into()
            } else {
                failures.join("; ")
            },
        })
    }
}
