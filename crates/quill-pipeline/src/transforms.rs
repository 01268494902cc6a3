//! Per-edge state transformations applied during a handoff.
//!
//! Every edge key maps to an ordered list of [`TransformRule`]s. Each rule
//! runs against a scratch copy of the state that is committed only when the
//! rule succeeds, so a skipped rule leaves no partial writes. The outcome of
//! every rule is reported as a [`TransformResult`].
//!
//! Rules recompute their output from the state alone, so running a list a
//! second time over its own output changes nothing observable.

use std::collections::{BTreeMap, HashMap};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use quill_types::{
    count_words, BasicMetrics, ContentCharacteristics, ContentMetrics, ContentStrategy,
    ContentStructure, ContentTargets, ContentType, FinalMetrics, FinalOutput, HandoffStatus,
    ImprovementPriorities, KeywordData, KeywordPlan, KeywordPriority, QaContext, QualityCriteria,
    QualityGaps, QuillError, ResearchMetrics, Result, RevisionStrategy, SectionTarget,
    SeoContext, Stage, SuccessSummary, WorkflowState, WritingContext, MAX_REVISIONS,
};

use crate::validation::edge_key;

// ---------------------------------------------------------------------------
// Rule and outcome types
// ---------------------------------------------------------------------------

pub type TransformFn = fn(&mut WorkflowState) -> Result<()>;

#[derive(Clone, Copy)]
pub struct TransformRule {
    pub name: &'static str,
    apply: TransformFn,
}

impl TransformRule {
    pub fn new(name: &'static str, apply: TransformFn) -> Self {
        Self { name, apply }
    }
}

impl std::fmt::Debug for TransformRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOutcome {
    Applied,
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformResult {
    pub name: String,
    pub outcome: TransformOutcome,
}

impl TransformResult {
    pub fn is_applied(&self) -> bool {
        self.outcome == TransformOutcome::Applied
    }
}

fn skip(transform: &str, message: &str) -> QuillError {
    QuillError::TransformFailed {
        transform: transform.to_string(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TransformRuleSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TransformRuleSet {
    rules: HashMap<String, Vec<TransformRule>>,
}

impl TransformRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: Stage, target: Stage, rules: Vec<TransformRule>) {
        self.rules.insert(edge_key(source, target), rules);
    }

    pub fn rules_for(&self, source: Stage, target: Stage) -> &[TransformRule] {
        self.rules
            .get(&edge_key(source, target))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edge keys with their rules, sorted by key.
    pub fn entries(&self) -> Vec<(&str, &[TransformRule])> {
        let mut entries: Vec<(&str, &[TransformRule])> = self
            .rules
            .iter()
            .map(|(key, rules)| (key.as_str(), rules.as_slice()))
            .collect();
        entries.sort_unstable_by_key(|(key, _)| *key);
        entries
    }

    /// Run the edge's rules in order. Failing rules are skipped and the
    /// remaining rules still run.
    pub fn apply(
        &self,
        state: &mut WorkflowState,
        source: Stage,
        target: Stage,
    ) -> Vec<TransformResult> {
        self.rules_for(source, target)
            .iter()
            .map(|rule| {
                let mut scratch = state.clone();
                let outcome = match (rule.apply)(&mut scratch) {
                    Ok(()) => {
                        *state = scratch;
                        TransformOutcome::Applied
                    }
                    Err(e) => {
                        tracing::warn!(transform = rule.name, error = %e, "Transformation skipped");
                        TransformOutcome::Skipped(e.to_string())
                    }
                };
                TransformResult {
                    name: rule.name.to_string(),
                    outcome,
                }
            })
            .collect()
    }

    pub fn standard() -> Self {
        let mut set = Self::new();
        set.insert(
            Stage::Research,
            Stage::Analyze,
            vec![
                TransformRule::new("normalize_search_results", normalize_search_results),
                TransformRule::new("calculate_research_metrics", calculate_research_metrics),
                TransformRule::new("extract_trend_signals", extract_trend_signals),
            ],
        );
        set.insert(
            Stage::Analyze,
            Stage::Planning,
            vec![
                TransformRule::new("prioritize_keywords", prioritize_keywords),
                TransformRule::new("prepare_content_strategy", prepare_content_strategy),
                TransformRule::new("calculate_content_targets", calculate_content_targets),
            ],
        );
        set.insert(
            Stage::Planning,
            Stage::Writing,
            vec![
                TransformRule::new("prepare_writing_context", prepare_writing_context),
                TransformRule::new("distribute_section_words", distribute_section_words),
                TransformRule::new("prepare_keyword_plan", prepare_keyword_plan),
            ],
        );
        set.insert(
            Stage::Writing,
            Stage::Review,
            vec![
                TransformRule::new("calculate_content_metrics", calculate_content_metrics),
                TransformRule::new("calculate_basic_metrics", calculate_basic_metrics),
                TransformRule::new("extract_characteristics", extract_characteristics),
            ],
        );
        set.insert(
            Stage::Review,
            Stage::Seo,
            vec![
                TransformRule::new("prepare_seo_context", prepare_seo_context),
                TransformRule::new("analyze_structure", analyze_structure),
                TransformRule::new("prepare_keyword_data", prepare_keyword_data),
            ],
        );
        set.insert(
            Stage::Seo,
            Stage::QualityAssurance,
            vec![
                TransformRule::new("prepare_qa_context", prepare_qa_context),
                TransformRule::new("consolidate_content", consolidate_content),
                TransformRule::new("prepare_quality_criteria", prepare_quality_criteria),
            ],
        );
        set.insert(
            Stage::QualityAssurance,
            Stage::RevisionPlanning,
            vec![
                TransformRule::new("analyze_quality_gaps", analyze_quality_gaps),
                TransformRule::new("prioritize_improvements", prioritize_improvements),
                TransformRule::new("prepare_revision_strategy", prepare_revision_strategy),
            ],
        );
        set.insert(
            Stage::FinalAssembly,
            Stage::Completion,
            vec![
                TransformRule::new("prepare_final_output", prepare_final_output),
                TransformRule::new("calculate_final_metrics", calculate_final_metrics),
                TransformRule::new("prepare_success_summary", prepare_success_summary),
            ],
        );
        set
    }
}

// ---------------------------------------------------------------------------
// research_agent -> analyze_research
// ---------------------------------------------------------------------------

fn normalize_search_results(state: &mut WorkflowState) -> Result<()> {
    let research = state
        .research
        .as_mut()
        .filter(|r| !r.results.is_empty())
        .ok_or_else(|| skip("normalize_search_results", "no search results"))?;
    for hit in &mut research.results {
        hit.title = hit.title.trim().to_string();
        hit.snippet = hit.snippet.trim().to_string();
    }
    Ok(())
}

fn calculate_research_metrics(state: &mut WorkflowState) -> Result<()> {
    let research = state
        .research
        .as_ref()
        .ok_or_else(|| skip("calculate_research_metrics", "no research output"))?;
    let total = research.results.len();
    let total_len: usize = research.results.iter().map(|r| r.snippet.chars().count()).sum();
    state.enrichment.research_metrics = Some(ResearchMetrics {
        total_sources: total,
        total_content_length: total_len,
        avg_snippet_length: if total > 0 {
            total_len as f64 / total as f64
        } else {
            0.0
        },
        quality_sources: research
            .results
            .iter()
            .filter(|r| r.snippet.chars().count() > 100)
            .count(),
    });
    Ok(())
}

fn extract_trend_signals(state: &mut WorkflowState) -> Result<()> {
    let research = state
        .research
        .as_ref()
        .filter(|r| !r.results.is_empty())
        .ok_or_else(|| skip("extract_trend_signals", "no search results"))?;
    let year = chrono::Utc::now().year().to_string();
    let indicators = [year.as_str(), "trend", "emerging", "future", "new", "latest"];

    let mut signals: Vec<(String, usize)> = research
        .results
        .iter()
        .filter_map(|hit| {
            let text = format!("{}{}", hit.title, hit.snippet).to_lowercase();
            if !indicators.iter().any(|i| text.contains(i)) {
                return None;
            }
            let strength = ["trend", "emerging", "future"]
                .iter()
                .filter(|i| text.contains(*i))
                .count();
            Some((hit.title.clone(), strength))
        })
        .collect();
    signals.sort_by(|a, b| b.1.cmp(&a.1));

    state.enrichment.trend_signals =
        Some(signals.into_iter().take(5).map(|(title, _)| title).collect());
    Ok(())
}

// ---------------------------------------------------------------------------
// analyze_research -> content_planning
// ---------------------------------------------------------------------------

fn prioritize_keywords(state: &mut WorkflowState) -> Result<()> {
    let research = state
        .research
        .as_ref()
        .filter(|r| !r.keywords.is_empty())
        .ok_or_else(|| skip("prioritize_keywords", "no extracted keywords"))?;
    let topic = state.topic().to_lowercase();

    let mut scored: Vec<KeywordPriority> = research
        .keywords
        .iter()
        .map(|k| {
            let topic_boost = if topic.contains(&k.to_lowercase()) { 2.0 } else { 0.0 };
            KeywordPriority {
                keyword: k.clone(),
                score: 1.0 + topic_boost + research.confidence,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(5);

    state.enrichment.keyword_priorities = Some(scored);
    Ok(())
}

fn prepare_content_strategy(state: &mut WorkflowState) -> Result<()> {
    let confidence = state.research_confidence().unwrap_or(0.5);
    let (approach, depth) = if confidence >= 0.8 {
        ("comprehensive", "detailed")
    } else if confidence >= 0.6 {
        ("balanced", "moderate")
    } else {
        ("focused", "concise")
    };
    state.enrichment.content_strategy = Some(ContentStrategy {
        approach: approach.into(),
        depth: depth.into(),
        research_confidence: confidence,
    });
    Ok(())
}

fn calculate_content_targets(state: &mut WorkflowState) -> Result<()> {
    let profile = state.content_type().profile();
    state.enrichment.content_targets = Some(ContentTargets {
        min_words: profile.min_words,
        max_words: profile.max_words,
        sections: profile.sections.len(),
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// content_planning -> content_writing
// ---------------------------------------------------------------------------

fn prepare_writing_context(state: &mut WorkflowState) -> Result<()> {
    state.enrichment.writing_context = Some(WritingContext {
        topic: state.topic().to_string(),
        content_type: state.content_type(),
        target_audience: state.target_audience().unwrap_or("professionals").to_string(),
        primary_keywords: state.primary_keywords().to_vec(),
        research_summary: state
            .research
            .as_ref()
            .map(|r| r.summary.clone())
            .unwrap_or_default(),
    });
    Ok(())
}

/// `"Benefits/Applications"` -> `"benefits"`, `"Main Content"` -> `"main_content"`.
fn section_key(title: &str) -> String {
    title
        .split('/')
        .next()
        .unwrap_or(title)
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn distribute_section_words(state: &mut WorkflowState) -> Result<()> {
    let sections = state
        .plan
        .as_ref()
        .map(|p| p.sections.clone())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| skip("distribute_section_words", "no content sections"))?;
    let total = state
        .enrichment
        .content_targets
        .map(|t| t.max_words)
        .unwrap_or(1000) as f64;
    let even = 1.0 / sections.len() as f64;

    let targets = sections
        .into_iter()
        .map(|section| {
            let weight = match section_key(&section).as_str() {
                "introduction" => 0.15,
                "main_content" => 0.50,
                "benefits" => 0.20,
                "conclusion" => 0.15,
                _ => even,
            };
            SectionTarget {
                section,
                target_words: (total * weight) as usize,
            }
        })
        .collect();
    state.enrichment.section_targets = Some(targets);
    Ok(())
}

fn prepare_keyword_plan(state: &mut WorkflowState) -> Result<()> {
    let keywords = state.primary_keywords();
    if keywords.is_empty() {
        return Err(skip("prepare_keyword_plan", "no primary keywords"));
    }
    let primary = keywords.iter().take(3).cloned().collect();
    let secondary = keywords.iter().skip(3).take(4).cloned().collect();
    state.enrichment.keyword_plan = Some(KeywordPlan { primary, secondary });
    Ok(())
}

// ---------------------------------------------------------------------------
// content_writing -> content_review
// ---------------------------------------------------------------------------

fn draft_text<'a>(state: &'a WorkflowState, transform: &str) -> Result<&'a str> {
    state
        .draft
        .as_ref()
        .map(|d| d.content.as_str())
        .ok_or_else(|| skip(transform, "no draft content"))
}

fn paragraph_count(text: &str) -> usize {
    text.split("\n\n").filter(|p| !p.trim().is_empty()).count()
}

fn calculate_content_metrics(state: &mut WorkflowState) -> Result<()> {
    let content = draft_text(state, "calculate_content_metrics")?;
    let words = count_words(content);
    let sentences = content.split('.').filter(|s| !s.trim().is_empty()).count();
    let paragraphs = paragraph_count(content);
    state.enrichment.content_metrics = Some(ContentMetrics {
        word_count: words,
        sentence_count: sentences,
        paragraph_count: paragraphs,
        avg_words_per_sentence: if sentences > 0 {
            words as f64 / sentences as f64
        } else {
            0.0
        },
        avg_sentences_per_paragraph: if paragraphs > 0 {
            sentences as f64 / paragraphs as f64
        } else {
            0.0
        },
    });
    Ok(())
}

fn calculate_basic_metrics(state: &mut WorkflowState) -> Result<()> {
    let content = draft_text(state, "calculate_basic_metrics")?;
    let metrics = BasicMetrics {
        character_count: content.chars().count(),
        character_count_no_spaces: content.chars().filter(|c| *c != ' ').count(),
        reading_time_minutes: (count_words(content) as f64 / 200.0).max(1.0),
    };
    state.enrichment.basic_metrics = Some(metrics);
    Ok(())
}

fn extract_characteristics(state: &mut WorkflowState) -> Result<()> {
    let content = draft_text(state, "extract_characteristics")?.to_lowercase();
    let count = |words: &[&str]| words.iter().filter(|w| content.contains(*w)).count();
    let characteristics = ContentCharacteristics {
        has_questions: content.contains('?'),
        has_lists: ["\n-", "\n*", "\n1.", "\n2."].iter().any(|i| content.contains(i)),
        has_technical_terms: count(&["api", "system", "process", "technology", "implementation"]) > 0,
        formal_markers: count(&["furthermore", "therefore", "consequently"]),
        casual_markers: count(&["you", "your", "we", "our"]),
        technical_markers: count(&["configure", "optimize", "implement"]),
    };
    state.enrichment.content_characteristics = Some(characteristics);
    Ok(())
}

// ---------------------------------------------------------------------------
// content_review -> seo_optimization
// ---------------------------------------------------------------------------

fn prepare_seo_context(state: &mut WorkflowState) -> Result<()> {
    let description: String = state
        .research
        .as_ref()
        .map(|r| r.summary.chars().take(160).collect())
        .unwrap_or_default();
    state.enrichment.seo_context = Some(SeoContext {
        content_length: state.word_count(),
        primary_keywords: state.primary_keywords().to_vec(),
        content_type: state.content_type(),
        target_audience: state.target_audience().map(String::from),
        existing_title: state.topic().to_string(),
        existing_description: description,
    });
    Ok(())
}

fn heading_count(content: &str, marker: &str) -> usize {
    content.matches(&format!("\n{marker}")).count() + usize::from(content.starts_with(marker))
}

fn analyze_structure(state: &mut WorkflowState) -> Result<()> {
    let content = draft_text(state, "analyze_structure")?;
    let lower = content.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    let head: String = chars.iter().take(200).collect();
    let tail: String = chars[chars.len().saturating_sub(200)..].iter().collect();

    let structure = ContentStructure {
        h1: heading_count(content, "# "),
        h2: heading_count(content, "## "),
        h3: heading_count(content, "### "),
        paragraph_count: paragraph_count(content),
        has_introduction: ["introduction", "overview"].iter().any(|w| head.contains(w)),
        has_conclusion: ["conclusion", "summary"].iter().any(|w| tail.contains(w)),
    };
    state.enrichment.structure_analysis = Some(structure);
    Ok(())
}

fn prepare_keyword_data(state: &mut WorkflowState) -> Result<()> {
    let primary: Vec<String> = state.primary_keywords().iter().take(3).cloned().collect();
    let secondary = state
        .research
        .as_ref()
        .map(|r| r.keywords.iter().skip(5).take(5).cloned().collect())
        .unwrap_or_default();
    let topic = state.topic().to_lowercase();
    let long_tail = if topic.is_empty() {
        Vec::new()
    } else {
        vec![
            format!("how to {topic}"),
            format!("{topic} benefits"),
            format!("best {topic} practices"),
        ]
    };
    let variations: BTreeMap<String, Vec<String>> = primary
        .iter()
        .map(|k| {
            let variant = match k.strip_suffix('s') {
                Some(stem) => stem.to_string(),
                None => format!("{k}s"),
            };
            (k.clone(), vec![variant])
        })
        .collect();

    state.enrichment.keyword_data = Some(KeywordData {
        primary,
        secondary,
        long_tail,
        variations,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// seo_optimization -> quality_assurance
// ---------------------------------------------------------------------------

fn prepare_qa_context(state: &mut WorkflowState) -> Result<()> {
    state.enrichment.qa_context = Some(QaContext {
        content_length: state.word_count(),
        seo_score: state.seo_score(),
        min_word_count: 300,
        min_seo_score: 70.0,
        required_elements: vec!["introduction".into(), "conclusion".into()],
        max_revision_cycles: MAX_REVISIONS,
        revision_count: state.revision_count,
    });
    Ok(())
}

fn consolidate_content(state: &mut WorkflowState) -> Result<()> {
    let content = state
        .best_content()
        .map(String::from)
        .ok_or_else(|| skip("consolidate_content", "no content to consolidate"))?;
    state.enrichment.consolidated_content = Some(content);
    Ok(())
}

fn prepare_quality_criteria(state: &mut WorkflowState) -> Result<()> {
    let criteria = match state.content_type() {
        ContentType::BlogPost => QualityCriteria {
            min_word_count: 800,
            max_word_count: 1500,
            required_sections: vec!["introduction".into(), "main_content".into(), "conclusion".into()],
            min_seo_score: 75.0,
            keyword_density: "1-2%".into(),
        },
        ContentType::SocialMedia => QualityCriteria {
            min_word_count: 50,
            max_word_count: 280,
            required_sections: vec!["hook".into(), "value".into(), "cta".into()],
            min_seo_score: 60.0,
            keyword_density: "2-3%".into(),
        },
        ContentType::WebsiteCopy => QualityCriteria {
            min_word_count: 200,
            max_word_count: 500,
            required_sections: vec!["headline".into(), "benefits".into(), "cta".into()],
            min_seo_score: 70.0,
            keyword_density: "1.5-2.5%".into(),
        },
    };
    state.enrichment.quality_criteria = Some(criteria);
    Ok(())
}

// ---------------------------------------------------------------------------
// quality_assurance -> revision_planning
// ---------------------------------------------------------------------------

fn analyze_quality_gaps(state: &mut WorkflowState) -> Result<()> {
    let quality = state
        .quality
        .as_ref()
        .ok_or_else(|| skip("analyze_quality_gaps", "no quality report"))?;
    let mut gaps = QualityGaps::default();

    for feedback in &quality.feedback {
        let lower = feedback.to_lowercase();
        let has = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));
        if has(&["structure", "section", "heading"]) {
            gaps.structure.push(feedback.clone());
        } else if has(&["keyword", "seo", "optimization"]) {
            gaps.seo.push(feedback.clone());
        } else if has(&["length", "word", "sentence"]) {
            gaps.readability.push(feedback.clone());
        } else {
            gaps.content.push(feedback.clone());
        }
    }

    if quality.score < 60.0 {
        gaps.priority = gaps.structure.iter().chain(&gaps.content).cloned().collect();
    } else if quality.score < 75.0 {
        gaps.priority = gaps.seo.iter().chain(&gaps.readability).cloned().collect();
    }

    state.enrichment.gap_analysis = Some(gaps);
    Ok(())
}

fn prioritize_improvements(state: &mut WorkflowState) -> Result<()> {
    let gaps = state
        .enrichment
        .gap_analysis
        .as_ref()
        .ok_or_else(|| skip("prioritize_improvements", "no gap analysis"))?;
    let mut priorities = ImprovementPriorities::default();

    if !gaps.seo.is_empty() {
        priorities.high_impact_low_effort.push("Fix keyword integration".into());
    }
    if !gaps.readability.is_empty() {
        priorities.high_impact_low_effort.push("Improve paragraph structure".into());
    }
    if !gaps.structure.is_empty() {
        priorities.high_impact_high_effort.push("Restructure content sections".into());
    }
    if gaps.content.iter().any(|g| g.to_lowercase().contains("length")) {
        priorities.high_impact_high_effort.push("Expand content significantly".into());
    }
    if state.quality_score().unwrap_or(100.0) < 50.0 {
        priorities.critical_fixes = gaps.content.iter().chain(&gaps.structure).cloned().collect();
    }

    state.enrichment.improvement_priorities = Some(priorities);
    Ok(())
}

fn prepare_revision_strategy(state: &mut WorkflowState) -> Result<()> {
    let priorities = state.enrichment.improvement_priorities.clone().unwrap_or_default();
    let mut focus_areas = Vec::new();
    let mut effort = "medium";
    if !priorities.critical_fixes.is_empty() {
        focus_areas.extend(["critical_issues".to_string(), "structural_problems".to_string()]);
        effort = "high";
    }
    if !priorities.high_impact_low_effort.is_empty() {
        focus_areas.extend(["quick_wins".to_string(), "optimization_tweaks".to_string()]);
    }

    let current = state.quality_score().unwrap_or(0.0);
    let improvement = if current < 60.0 { 20.0 } else { 10.0 };

    state.enrichment.revision_strategy = Some(RevisionStrategy {
        revision_type: if state.revision_count == 0 { "targeted" } else { "comprehensive" }.into(),
        focus_areas,
        specific_actions: vec![
            "Address critical quality issues".into(),
            "Improve content structure and flow".into(),
            "Enhance keyword integration".into(),
            "Optimize readability and engagement".into(),
        ],
        estimated_effort: effort.into(),
        min_quality_improvement: improvement,
        target_quality_score: (current + improvement).min(100.0),
        max_revision_cycles: MAX_REVISIONS,
    });
    Ok(())
}

// ---------------------------------------------------------------------------
// final_assembly -> workflow_completion
// ---------------------------------------------------------------------------

fn prepare_final_output(state: &mut WorkflowState) -> Result<()> {
    let content = state
        .final_content
        .clone()
        .ok_or_else(|| skip("prepare_final_output", "no final content"))?;
    let seo = state.seo.as_ref();
    state.enrichment.final_output = Some(FinalOutput {
        word_count: count_words(&content),
        content,
        quality_score: state.quality_score(),
        seo_score: state.seo_score(),
        meta_description: seo.map(|s| s.meta_description.clone()),
        title_suggestions: seo.map(|s| s.title_suggestions.clone()).unwrap_or_default(),
        primary_keywords: state.primary_keywords().to_vec(),
    });
    Ok(())
}

fn calculate_final_metrics(state: &mut WorkflowState) -> Result<()> {
    let history = &state.handoff_history;
    let total = history.len();
    let successful = history
        .iter()
        .filter(|h| h.status == HandoffStatus::Success)
        .count();
    state.enrichment.final_metrics = Some(FinalMetrics {
        total_processing_time: history.iter().map(|h| h.processing_time).sum(),
        total_handoffs: total,
        successful_handoffs: successful,
        workflow_efficiency: if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        },
        revision_cycles: state.revision_count,
        final_quality_score: state.quality_score(),
    });
    Ok(())
}

fn prepare_success_summary(state: &mut WorkflowState) -> Result<()> {
    let metrics = state
        .enrichment
        .final_metrics
        .as_ref()
        .ok_or_else(|| skip("prepare_success_summary", "no final metrics"))?;
    let quality = metrics.final_quality_score.unwrap_or(0.0);
    state.enrichment.success_summary = Some(SuccessSummary {
        quality_achievement: if quality >= 85.0 { "excellent" } else { "good" }.into(),
        efficiency_rating: if metrics.workflow_efficiency >= 90.0 { "high" } else { "medium" }.into(),
        content_delivered: state
            .final_content
            .as_deref()
            .is_some_and(|c| !c.is_empty()),
        seo_optimized: state.seo_score().unwrap_or(0.0) >= 70.0,
        revision_cycles_used: metrics.revision_cycles,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::{
        ContentPlan, ContentRequest, ContentReview, Draft, QualityReport, ResearchOutput,
        SearchHit, SeoOutput,
    };

    fn hit(title: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            snippet: snippet.into(),
            link: "https://example.com".into(),
        }
    }

    fn researched_state() -> WorkflowState {
        let mut state = WorkflowState::new(ContentRequest::new("AI automation", ContentType::BlogPost));
        state.research = Some(ResearchOutput {
            query: "AI automation trends".into(),
            results: vec![
                hit("  Emerging AI trends  ", &"x".repeat(120)),
                hit("Plain guide", "short"),
                hit("The future trend of automation", "emerging tools"),
            ],
            confidence: 0.6,
            keywords: vec!["automation".into(), "saas".into(), "ai".into()],
            summary: "Found 3 relevant sources. Key topics include: automation, saas, ai".into(),
            source: "test".into(),
        });
        state
    }

    #[test]
    fn research_edge_computes_metrics_and_signals() {
        let set = TransformRuleSet::standard();
        let mut state = researched_state();
        let results = set.apply(&mut state, Stage::Research, Stage::Analyze);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(TransformResult::is_applied));

        let research = state.research.as_ref().unwrap();
        assert_eq!(research.results[0].title, "Emerging AI trends");

        let metrics = state.enrichment.research_metrics.as_ref().unwrap();
        assert_eq!(metrics.total_sources, 3);
        assert_eq!(metrics.quality_sources, 1);

        let signals = state.enrichment.trend_signals.as_ref().unwrap();
        assert_eq!(signals[0], "The future trend of automation");
        assert_eq!(signals.len(), 2);
    }

    #[test]
    fn keywords_in_topic_rank_first() {
        let set = TransformRuleSet::standard();
        let mut state = researched_state();
        set.apply(&mut state, Stage::Analyze, Stage::Planning);

        let ranked = state.enrichment.keyword_priorities.as_ref().unwrap();
        assert_eq!(ranked[0].keyword, "automation");
        assert!((ranked[0].score - 3.6).abs() < 1e-9);
        assert_eq!(ranked[2].keyword, "saas");

        let strategy = state.enrichment.content_strategy.as_ref().unwrap();
        assert_eq!(strategy.approach, "balanced");
        assert_eq!(state.enrichment.content_targets.unwrap().max_words, 1500);
    }

    #[test]
    fn missing_input_is_skipped_without_partial_writes() {
        let set = TransformRuleSet::standard();
        let mut state = WorkflowState::new(ContentRequest::new("AI automation", ContentType::BlogPost));
        let before = state.clone();
        let results = set.apply(&mut state, Stage::Writing, Stage::Review);

        assert_eq!(results.len(), 3);
        for result in &results {
            match &result.outcome {
                TransformOutcome::Skipped(reason) => assert!(reason.contains("no draft content")),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(state, before);
    }

    #[test]
    fn section_targets_use_named_weights() {
        let set = TransformRuleSet::standard();
        let mut state = researched_state();
        state.enrichment.content_targets = Some(ContentTargets {
            min_words: 800,
            max_words: 1000,
            sections: 5,
        });
        state.plan = Some(ContentPlan {
            outline: "outline".into(),
            sections: vec![
                "Introduction".into(),
                "Main Content".into(),
                "Benefits/Applications".into(),
                "Future Outlook".into(),
                "Conclusion".into(),
            ],
            primary_keywords: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            writing_style: "informative".into(),
        });
        set.apply(&mut state, Stage::Planning, Stage::Writing);

        let targets = state.enrichment.section_targets.as_ref().unwrap();
        let words: Vec<usize> = targets.iter().map(|t| t.target_words).collect();
        assert_eq!(words, vec![150, 500, 200, 200, 150]);

        let plan = state.enrichment.keyword_plan.as_ref().unwrap();
        assert_eq!(plan.primary, vec!["a", "b", "c"]);
        assert_eq!(plan.secondary, vec!["d"]);
        assert_eq!(
            state.enrichment.writing_context.as_ref().unwrap().target_audience,
            "professionals"
        );
    }

    #[test]
    fn structure_analysis_counts_headings() {
        let mut state = researched_state();
        state.draft = Some(Draft::new(
            "# Title\n\nIntroduction to the topic.\n\n## Part\n\nBody text.\n\n## Conclusion\n\nIn conclusion, done.",
            false,
        ));
        analyze_structure(&mut state).unwrap();
        let s = state.enrichment.structure_analysis.unwrap();
        assert_eq!((s.h1, s.h2, s.h3), (1, 2, 0));
        assert!(s.has_introduction);
        assert!(s.has_conclusion);
    }

    #[test]
    fn quality_gaps_feed_revision_strategy() {
        let set = TransformRuleSet::standard();
        let mut state = researched_state();
        state.quality = Some(QualityReport {
            checks: BTreeMap::new(),
            score: 55.0,
            feedback: vec![
                "Content length needs adjustment".into(),
                "Include more target keywords".into(),
                "Add a stronger conclusion".into(),
            ],
            revision_needed: true,
        });
        let results = set.apply(&mut state, Stage::QualityAssurance, Stage::RevisionPlanning);
        assert!(results.iter().all(TransformResult::is_applied));

        let gaps = state.enrichment.gap_analysis.as_ref().unwrap();
        assert_eq!(gaps.readability.len(), 1);
        assert_eq!(gaps.seo.len(), 1);
        assert_eq!(gaps.content, vec!["Add a stronger conclusion".to_string()]);
        assert_eq!(gaps.priority, vec!["Add a stronger conclusion".to_string()]);

        let strategy = state.enrichment.revision_strategy.as_ref().unwrap();
        assert_eq!(strategy.revision_type, "targeted");
        assert_eq!(strategy.focus_areas, vec!["quick_wins", "optimization_tweaks"]);
        assert_eq!(strategy.target_quality_score, 75.0);
    }

    /// A state carrying every stage output, so no edge's rules are skipped
    /// for lack of input.
    fn complete_state() -> WorkflowState {
        let mut state = researched_state();
        let content = "# AI automation\n\nIntroduction to automation for small teams.\n\n\
                       ## Benefits\n\nAutomation saves time.\n\n\
                       ## Conclusion\n\nIn conclusion, start small.";
        state.plan = Some(ContentPlan {
            outline: "1. Introduction: Hook and overview".into(),
            sections: vec!["Introduction".into(), "Benefits".into(), "Conclusion".into()],
            primary_keywords: vec!["automation".into(), "ai".into()],
            writing_style: "informative".into(),
        });
        state.draft = Some(Draft::new(content, false));
        state.review = Some(ContentReview {
            criteria: BTreeMap::new(),
            score: 60.0,
        });
        state.seo = Some(SeoOutput {
            optimized_content: content.into(),
            score: 72.0,
            meta_description: "Introduction to automation for small teams.".into(),
            title_suggestions: vec!["AI automation guide".into()],
            keywords: vec!["automation".into()],
        });
        state.quality = Some(QualityReport {
            checks: BTreeMap::new(),
            score: 55.0,
            feedback: vec!["Content length needs adjustment".into()],
            revision_needed: true,
        });
        state.final_content = Some(content.into());
        state
    }

    #[test]
    fn transformations_are_idempotent_on_every_edge() {
        let set = TransformRuleSet::standard();
        let mut edges: Vec<(Stage, Stage)> = set
            .entries()
            .iter()
            .map(|(key, _)| {
                let (source, target) = key.split_once("->").unwrap();
                (source.parse().unwrap(), target.parse().unwrap())
            })
            .collect();
        edges.sort();
        assert_eq!(edges.len(), 8);

        // Edges only read outputs of earlier edges, so one pass in workflow
        // order reaches the point where every rule's target already holds.
        let mut state = complete_state();
        for &(source, target) in &edges {
            set.apply(&mut state, source, target);
        }

        for &(source, target) in &edges {
            let once = state.clone();
            let results = set.apply(&mut state, source, target);
            assert!(!results.is_empty());
            assert_eq!(state, once, "{source} -> {target} changed on re-application");
        }
    }

    #[test]
    fn edges_without_rules_do_nothing() {
        let set = TransformRuleSet::standard();
        let mut state = researched_state();
        assert!(set.apply(&mut state, Stage::Initialize, Stage::Research).is_empty());
    }

    #[test]
    fn entries_are_sorted_by_edge_key() {
        let set = TransformRuleSet::standard();
        let entries = set.entries();
        assert!(!entries.is_empty());
        assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(entries
            .iter()
            .any(|(key, _)| *key == "research_agent->analyze_research"));
    }
}
