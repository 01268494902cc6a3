//! Typed outputs of the handoff transformations.
//!
//! Each transformation writes exactly one of these slots. The stages that
//! follow read them where they help (the writing prompt uses
//! [`WritingContext`], planning ranks keywords by [`KeywordPriority`]) and the
//! rest ride along in the final result for audit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ContentType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_metrics: Option<ResearchMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_signals: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_priorities: Option<Vec<KeywordPriority>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_strategy: Option<ContentStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_targets: Option<ContentTargets>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writing_context: Option<WritingContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_targets: Option<Vec<SectionTarget>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_plan: Option<KeywordPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_metrics: Option<ContentMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_metrics: Option<BasicMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_characteristics: Option<ContentCharacteristics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_context: Option<SeoContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_analysis: Option<ContentStructure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_data: Option<KeywordData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qa_context: Option<QaContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidated_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_criteria: Option<QualityCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_analysis: Option<QualityGaps>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub improvement_priorities: Option<ImprovementPriorities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_strategy: Option<RevisionStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_output: Option<FinalOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_metrics: Option<FinalMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_summary: Option<SuccessSummary>,
}

// ---------------------------------------------------------------------------
// research -> analyze
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchMetrics {
    pub total_sources: usize,
    pub total_content_length: usize,
    pub avg_snippet_length: f64,
    /// Sources whose snippet is longer than 100 characters.
    pub quality_sources: usize,
}

// ---------------------------------------------------------------------------
// analyze -> planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordPriority {
    pub keyword: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentStrategy {
    pub approach: String,
    pub depth: String,
    pub research_confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTargets {
    pub min_words: usize,
    pub max_words: usize,
    pub sections: usize,
}

// ---------------------------------------------------------------------------
// planning -> writing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingContext {
    pub topic: String,
    pub content_type: ContentType,
    pub target_audience: String,
    pub primary_keywords: Vec<String>,
    pub research_summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionTarget {
    pub section: String,
    pub target_words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordPlan {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
}

// ---------------------------------------------------------------------------
// writing -> review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetrics {
    pub word_count: usize,
    pub sentence_count: usize,
    pub paragraph_count: usize,
    pub avg_words_per_sentence: f64,
    pub avg_sentences_per_paragraph: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicMetrics {
    pub character_count: usize,
    pub character_count_no_spaces: usize,
    pub reading_time_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentCharacteristics {
    pub has_questions: bool,
    pub has_lists: bool,
    pub has_technical_terms: bool,
    pub formal_markers: usize,
    pub casual_markers: usize,
    pub technical_markers: usize,
}

// ---------------------------------------------------------------------------
// review -> seo
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeoContext {
    pub content_length: usize,
    pub primary_keywords: Vec<String>,
    pub content_type: ContentType,
    pub target_audience: Option<String>,
    pub existing_title: String,
    pub existing_description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStructure {
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
    pub paragraph_count: usize,
    pub has_introduction: bool,
    pub has_conclusion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordData {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub long_tail: Vec<String>,
    pub variations: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// seo -> qa
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaContext {
    pub content_length: usize,
    pub seo_score: Option<f64>,
    pub min_word_count: usize,
    pub min_seo_score: f64,
    pub required_elements: Vec<String>,
    pub max_revision_cycles: u32,
    pub revision_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCriteria {
    pub min_word_count: usize,
    pub max_word_count: usize,
    pub required_sections: Vec<String>,
    pub min_seo_score: f64,
    pub keyword_density: String,
}

// ---------------------------------------------------------------------------
// qa -> revision planning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityGaps {
    pub structure: Vec<String>,
    pub content: Vec<String>,
    pub seo: Vec<String>,
    pub readability: Vec<String>,
    pub priority: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementPriorities {
    pub high_impact_low_effort: Vec<String>,
    pub high_impact_high_effort: Vec<String>,
    pub critical_fixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionStrategy {
    /// `targeted` on the first pass, `comprehensive` afterwards.
    pub revision_type: String,
    pub focus_areas: Vec<String>,
    pub specific_actions: Vec<String>,
    pub estimated_effort: String,
    pub min_quality_improvement: f64,
    pub target_quality_score: f64,
    pub max_revision_cycles: u32,
}

// ---------------------------------------------------------------------------
// final assembly -> completion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutput {
    pub content: String,
    pub word_count: usize,
    pub quality_score: Option<f64>,
    pub seo_score: Option<f64>,
    pub meta_description: Option<String>,
    pub title_suggestions: Vec<String>,
    pub primary_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalMetrics {
    pub total_processing_time: f64,
    pub total_handoffs: usize,
    pub successful_handoffs: usize,
    /// Percentage of handoffs that finished with `success`.
    pub workflow_efficiency: f64,
    pub revision_cycles: u32,
    pub final_quality_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessSummary {
    pub quality_achievement: String,
    pub efficiency_rating: String,
    pub content_delivered: bool,
    pub seo_optimized: bool,
    pub revision_cycles_used: u32,
}
