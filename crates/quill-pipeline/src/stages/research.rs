use std::sync::Arc;

use async_trait::async_trait;

use quill_llm::SearchProvider;
use quill_types::{
    QuillError, ResearchAnalysis, ResearchOutput, Result, SearchHit, Stage, WorkflowState,
};

use super::StageHandler;

/// Terms the research stage looks for in search results.
pub const TRACKED_KEYWORDS: [&str; 9] = [
    "ai",
    "artificial intelligence",
    "automation",
    "digital transformation",
    "machine learning",
    "startup",
    "technology",
    "innovation",
    "saas",
];

const FALLBACK_CONFIDENCE: f64 = 0.3;

fn research_query(state: &WorkflowState) -> String {
    let mut query = format!(
        "{} trends 2024 digital marketing technology startups",
        state.topic().trim()
    );
    if let Some(audience) = state.target_audience().filter(|a| !a.trim().is_empty()) {
        query.push_str(&format!(" for {}", audience.trim()));
    }
    query
}

fn tracked_in(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TRACKED_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .map(|k| k.to_string())
        .collect()
}

fn summarize(results: usize, keywords: &[String]) -> String {
    let top: Vec<&str> = keywords.iter().take(5).map(String::as_str).collect();
    format!(
        "Found {results} relevant sources. Key topics include: {}",
        top.join(", ")
    )
}

// ---------------------------------------------------------------------------
// research_agent
// ---------------------------------------------------------------------------

/// Searches the web for the topic and extracts keywords from the results.
pub struct ResearchStage {
    search: Arc<dyn SearchProvider>,
}

impl ResearchStage {
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }

    fn from_hits(query: String, hits: Vec<SearchHit>, source: &str) -> ResearchOutput {
        let text = hits
            .iter()
            .map(|h| format!("{} {}", h.title, h.snippet))
            .collect::<Vec<_>>()
            .join(" ");
        let keywords = tracked_in(&text);
        ResearchOutput {
            confidence: (hits.len() as f64 / 5.0).min(1.0),
            summary: summarize(hits.len(), &keywords),
            query,
            results: hits,
            keywords,
            source: source.to_string(),
        }
    }

    /// One synthetic source built from the topic.
    fn fallback(query: String, topic: &str) -> ResearchOutput {
        let mut keywords = tracked_in(topic);
        if keywords.is_empty() {
            keywords = topic
                .split_whitespace()
                .filter(|w| w.chars().count() > 3)
                .map(str::to_lowercase)
                .collect();
        }
        let hit = SearchHit {
            title: format!("{topic} overview"),
            snippet: format!("Background on {topic} assembled without live search results."),
            link: String::new(),
        };
        ResearchOutput {
            summary: summarize(1, &keywords),
            query,
            results: vec![hit],
            confidence: FALLBACK_CONFIDENCE,
            keywords,
            source: "fallback".into(),
        }
    }
}

#[async_trait]
impl StageHandler for ResearchStage {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let query = research_query(state);
        tracing::info!(query = %query, engine = self.search.name(), "Searching");

        let output = match self.search.search(&query).await {
            Ok(hits) if !hits.is_empty() => Self::from_hits(query, hits, self.search.name()),
            outcome => {
                let reason = match outcome {
                    Err(e) => format!("Research search failed: {e}"),
                    Ok(_) => "Research search returned no results".to_string(),
                };
                tracing::warn!(reason = %reason, "Using fallback research");
                state.record_failure(Stage::Research, reason, true);
                Self::fallback(query, state.topic().trim())
            }
        };

        tracing::info!(
            sources = output.results.len(),
            confidence = output.confidence,
            keywords = output.keywords.len(),
            "Research completed"
        );
        state.research = Some(output);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// analyze_research
// ---------------------------------------------------------------------------

/// Scores the research and picks trending topics.
pub struct AnalyzeStage;

#[async_trait]
impl StageHandler for AnalyzeStage {
    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let research = state
            .research
            .as_ref()
            .ok_or_else(|| QuillError::stage(Stage::Analyze, "No research output to analyze"))?;

        let trending_topics = match state.enrichment.trend_signals.as_ref() {
            Some(signals) if !signals.is_empty() => signals.iter().take(5).cloned().collect(),
            _ => research
                .results
                .iter()
                .filter(|hit| {
                    let title = hit.title.to_lowercase();
                    ["2024", "trend", "future", "new"]
                        .iter()
                        .any(|w| title.contains(w))
                })
                .take(5)
                .map(|hit| hit.title.clone())
                .collect(),
        };

        let analysis = ResearchAnalysis {
            sufficient_sources: research.results.len() >= 3,
            sufficient_keywords: research.keywords.len() >= 3,
            high_confidence: research.confidence >= 0.6,
            trending_topics,
        };
        tracing::info!(
            sufficient_sources = analysis.sufficient_sources,
            sufficient_keywords = analysis.sufficient_keywords,
            high_confidence = analysis.high_confidence,
            trending = analysis.trending_topics.len(),
            "Research analyzed"
        );
        state.analysis = Some(analysis);
        Ok(())
    }
}
