use std::collections::HashMap;

use async_trait::async_trait;

use quill_types::{QuillError, Result, SeoOutput, Stage, WorkflowState};

use super::StageHandler;

const MAX_META_CHARS: usize = 160;
const HEADING_MAX_CHARS: usize = 60;
const FREQUENT_TERMS: usize = 5;

/// Promotes short lines that mention a frequent term or keyword to `##`
/// headings. Lines that already start with `#` are left alone.
pub fn optimize(content: &str, keywords: &[String]) -> String {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in content.split_whitespace() {
        if word.chars().count() > 4 {
            *counts.entry(word.to_lowercase()).or_insert(0) += 1;
        }
    }
    let mut frequent: Vec<(String, usize)> = counts.into_iter().collect();
    frequent.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let terms: Vec<String> = frequent
        .into_iter()
        .take(FREQUENT_TERMS)
        .map(|(word, _)| word)
        .chain(
            keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty()),
        )
        .collect();

    content
        .split('\n')
        .map(|line| {
            let lower = line.to_lowercase();
            let promote = !line.trim().is_empty()
                && !line.starts_with('#')
                && line.chars().count() < HEADING_MAX_CHARS
                && terms.iter().any(|t| lower.contains(t.as_str()));
            if promote {
                format!("## {line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First two sentences, cut to 157 characters plus `...` when longer than 160.
pub fn meta_description(content: &str) -> String {
    let lead = content
        .split(". ")
        .take(2)
        .collect::<Vec<_>>()
        .join(". ");
    if lead.chars().count() > MAX_META_CHARS {
        let cut: String = lead.chars().take(MAX_META_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        lead
    }
}

fn title_suggestions(topic: &str) -> Vec<String> {
    vec![
        format!("{topic}: Complete Guide for 2024"),
        format!("How {topic} is Transforming Business"),
        format!("The Ultimate Guide to {topic}"),
        format!("{topic}: Benefits and Implementation"),
    ]
}

fn seo_score(content: &str, keywords: &[String], meta: &str, titles: &[String], topic: &str) -> f64 {
    let lower = content.to_lowercase();
    let occurrences: usize = keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| lower.matches(k.as_str()).count())
        .sum();
    let density = (occurrences as f64 / keywords.len().max(1) as f64).min(1.0);

    let meta_len = meta.chars().count();
    let meta_factor = if (120..=MAX_META_CHARS).contains(&meta_len) {
        1.0
    } else {
        0.5
    };

    let title_factor = match titles.first() {
        Some(title) if title.to_lowercase().contains(&topic.to_lowercase()) => 1.0,
        _ => 0.5,
    };

    (density + meta_factor + title_factor) / 3.0 * 100.0
}

/// Optimizes the draft for search and scores the result.
pub struct SeoStage;

#[async_trait]
impl StageHandler for SeoStage {
    fn stage(&self) -> Stage {
        Stage::Seo
    }

    async fn execute(&self, state: &mut WorkflowState) -> Result<()> {
        let draft = state
            .draft
            .as_ref()
            .map(|d| d.content.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| QuillError::stage(Stage::Seo, "No draft to optimize"))?;

        let topic = state.topic().trim().to_string();
        let keywords = state.primary_keywords().to_vec();
        let optimized_content = optimize(&draft, &keywords);
        let meta = meta_description(&draft);
        let titles = title_suggestions(&topic);
        let score = seo_score(&optimized_content, &keywords, &meta, &titles, &topic);

        tracing::info!(
            score,
            meta_chars = meta.chars().count(),
            changed = optimized_content != draft,
            "SEO optimized"
        );
        state.seo = Some(SeoOutput {
            optimized_content,
            score,
            meta_description: meta,
            title_suggestions: titles,
            keywords,
        });
        Ok(())
    }
}
