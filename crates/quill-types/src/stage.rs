use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::QuillError;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A named unit of work in the content workflow graph.
///
/// The serialized names double as the keys of the handoff rule tables
/// (`"research_agent->analyze_research"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "initialize_workflow")]
    Initialize,
    #[serde(rename = "research_agent")]
    Research,
    #[serde(rename = "analyze_research")]
    Analyze,
    #[serde(rename = "content_planning")]
    Planning,
    #[serde(rename = "content_writing")]
    Writing,
    #[serde(rename = "content_review")]
    Review,
    #[serde(rename = "seo_optimization")]
    Seo,
    #[serde(rename = "quality_assurance")]
    QualityAssurance,
    #[serde(rename = "revision_planning")]
    RevisionPlanning,
    #[serde(rename = "content_revision")]
    ContentRevision,
    #[serde(rename = "final_assembly")]
    FinalAssembly,
    #[serde(rename = "workflow_completion")]
    Completion,
    #[serde(rename = "error_handling")]
    Error,
}

impl Stage {
    pub const ALL: [Stage; 13] = [
        Stage::Initialize,
        Stage::Research,
        Stage::Analyze,
        Stage::Planning,
        Stage::Writing,
        Stage::Review,
        Stage::Seo,
        Stage::QualityAssurance,
        Stage::RevisionPlanning,
        Stage::ContentRevision,
        Stage::FinalAssembly,
        Stage::Completion,
        Stage::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialize => "initialize_workflow",
            Stage::Research => "research_agent",
            Stage::Analyze => "analyze_research",
            Stage::Planning => "content_planning",
            Stage::Writing => "content_writing",
            Stage::Review => "content_review",
            Stage::Seo => "seo_optimization",
            Stage::QualityAssurance => "quality_assurance",
            Stage::RevisionPlanning => "revision_planning",
            Stage::ContentRevision => "content_revision",
            Stage::FinalAssembly => "final_assembly",
            Stage::Completion => "workflow_completion",
            Stage::Error => "error_handling",
        }
    }

    /// The agent role responsible for the stage.
    pub fn agent(&self) -> &'static str {
        match self {
            Stage::Initialize => "system_coordinator",
            Stage::Research => "research_specialist",
            Stage::Analyze => "research_analyst",
            Stage::Planning => "content_strategist",
            Stage::Writing => "content_writer",
            Stage::Review => "content_editor",
            Stage::Seo => "seo_specialist",
            Stage::QualityAssurance => "qa_specialist",
            Stage::RevisionPlanning => "revision_planner",
            Stage::ContentRevision => "content_revisor",
            Stage::FinalAssembly => "content_assembler",
            Stage::Completion => "workflow_manager",
            Stage::Error => "error_handler",
        }
    }

    /// Coarse workflow phase reported alongside the stage.
    pub fn phase(&self) -> &'static str {
        match self {
            Stage::Initialize => "initialization",
            Stage::Research | Stage::Analyze => "research",
            Stage::Planning => "planning",
            Stage::Writing | Stage::ContentRevision => "writing",
            Stage::Review => "review",
            Stage::Seo => "optimization",
            Stage::QualityAssurance | Stage::RevisionPlanning => "quality_assurance",
            Stage::FinalAssembly => "assembly",
            Stage::Completion => "completed",
            Stage::Error => "error",
        }
    }

    /// `completion` and `error` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completion | Stage::Error)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| QuillError::InvalidInput(format!("unknown stage '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// ContentType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    BlogPost,
    SocialMedia,
    WebsiteCopy,
}

/// One planned section of a content piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpec {
    pub title: &'static str,
    pub purpose: &'static str,
}

/// Length, style and structure expectations for a content type.
#[derive(Debug, Clone, Copy)]
pub struct ContentProfile {
    pub min_words: usize,
    pub max_words: usize,
    pub style: &'static str,
    pub sections: &'static [SectionSpec],
}

const BLOG_SECTIONS: &[SectionSpec] = &[
    SectionSpec { title: "Introduction", purpose: "Hook and overview" },
    SectionSpec { title: "Main Content", purpose: "Core information and insights" },
    SectionSpec { title: "Benefits/Applications", purpose: "Practical value" },
    SectionSpec { title: "Future Outlook", purpose: "Trends and predictions" },
    SectionSpec { title: "Conclusion", purpose: "Summary and call-to-action" },
];

const SOCIAL_SECTIONS: &[SectionSpec] = &[
    SectionSpec { title: "Hook", purpose: "Attention grabber" },
    SectionSpec { title: "Value Proposition", purpose: "Key benefit" },
    SectionSpec { title: "Call to Action", purpose: "Engagement driver" },
];

const WEBSITE_SECTIONS: &[SectionSpec] = &[
    SectionSpec { title: "Headline", purpose: "Value proposition" },
    SectionSpec { title: "Benefits", purpose: "Key advantages" },
    SectionSpec { title: "Social Proof", purpose: "Credibility" },
    SectionSpec { title: "CTA", purpose: "Conversion driver" },
];

const BLOG_PROFILE: ContentProfile = ContentProfile {
    min_words: 800,
    max_words: 1500,
    style: "informative",
    sections: BLOG_SECTIONS,
};

const SOCIAL_PROFILE: ContentProfile = ContentProfile {
    min_words: 50,
    max_words: 280,
    style: "engaging",
    sections: SOCIAL_SECTIONS,
};

const WEBSITE_PROFILE: ContentProfile = ContentProfile {
    min_words: 200,
    max_words: 500,
    style: "persuasive",
    sections: WEBSITE_SECTIONS,
};

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::BlogPost,
        ContentType::SocialMedia,
        ContentType::WebsiteCopy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::BlogPost => "blog_post",
            ContentType::SocialMedia => "social_media",
            ContentType::WebsiteCopy => "website_copy",
        }
    }

    pub fn profile(&self) -> &'static ContentProfile {
        match self {
            ContentType::BlogPost => &BLOG_PROFILE,
            ContentType::SocialMedia => &SOCIAL_PROFILE,
            ContentType::WebsiteCopy => &WEBSITE_PROFILE,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = QuillError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .copied()
            .find(|ct| ct.as_str() == s)
            .ok_or_else(|| {
                QuillError::InvalidInput(format!(
                    "unknown content type '{s}' (expected blog_post, social_media or website_copy)"
                ))
            })
    }
}
