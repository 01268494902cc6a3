//! Declarative field validation for stage-to-stage handoffs.
//!
//! Each edge key (`"research_agent->analyze_research"`) maps to an ordered
//! list of [`ValidationRule`]s that are checked against the named field view
//! of a [`WorkflowState`]. A missing required field, a type mismatch, a value
//! outside the allowed set or a failed predicate makes the report invalid.
//! Length bounds and predicates that cannot evaluate their input only warn.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quill_types::{ContentType, Stage, WorkflowState, MAX_REVISIONS};

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Bool,
    List,
    Map,
}

impl FieldKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::Text => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Map => value.is_object(),
        }
    }

    pub fn of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(n) if n.is_f64() => "float",
            Value::Number(_) => "integer",
            Value::String(_) => "text",
            Value::Array(_) => "list",
            Value::Object(_) => "map",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
            FieldKind::Map => "map",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of a value for bound checks: characters for text, entries for
/// lists and maps. Other kinds have no length.
fn value_len(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(a) => Some(a.len()),
        Value::Object(o) => Some(o.len()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ValidationRule
// ---------------------------------------------------------------------------

/// `Ok(false)` fails the rule; `Err` means the predicate could not evaluate
/// the value and is reported as a warning.
pub type Predicate = Arc<dyn Fn(&Value) -> Result<bool, String> + Send + Sync>;

/// Normalises a value before it is checked.
pub type Coercion = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

#[derive(Clone)]
pub struct ValidationRule {
    pub field: String,
    pub required: bool,
    pub kind: FieldKind,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub allowed: Option<Vec<Value>>,
    predicate: Option<Predicate>,
    coerce: Option<Coercion>,
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("field", &self.field)
            .field("required", &self.required)
            .field("kind", &self.kind)
            .field("min_len", &self.min_len)
            .field("max_len", &self.max_len)
            .field("allowed", &self.allowed)
            .field("predicate", &self.predicate.is_some())
            .field("coerce", &self.coerce.is_some())
            .finish()
    }
}

impl ValidationRule {
    pub fn required(field: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field: field.into(),
            required: true,
            kind,
            min_len: None,
            max_len: None,
            allowed: None,
            predicate: None,
            coerce: None,
        }
    }

    pub fn optional(field: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            required: false,
            ..Self::required(field, kind)
        }
    }

    pub fn min_len(mut self, n: usize) -> Self {
        self.min_len = Some(n);
        self
    }

    pub fn max_len(mut self, n: usize) -> Self {
        self.max_len = Some(n);
        self
    }

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn predicate(
        mut self,
        f: impl Fn(&Value) -> Result<bool, String> + Send + Sync + 'static,
    ) -> Self {
        self.predicate = Some(Arc::new(f));
        self
    }

    /// Numeric predicate; non-numeric values cannot be evaluated.
    pub fn number(self, f: impl Fn(f64) -> bool + Send + Sync + 'static) -> Self {
        self.predicate(move |v| {
            v.as_f64()
                .map(&f)
                .ok_or_else(|| format!("expected a number, got {}", FieldKind::of(v)))
        })
    }

    pub fn coerce(mut self, f: impl Fn(&Value) -> Value + Send + Sync + 'static) -> Self {
        self.coerce = Some(Arc::new(f));
        self
    }

    /// Check one rule against the field view, appending to `report`.
    fn check(&self, view: &serde_json::Map<String, Value>, report: &mut ValidationReport) {
        report.checked_fields.push(self.field.clone());
        let field = &self.field;

        let raw = match view.get(field).filter(|v| !v.is_null()) {
            Some(v) => v,
            None => {
                if self.required {
                    report.fail(format!("Required field '{field}' is missing"));
                }
                return;
            }
        };
        let coerced;
        let value = match &self.coerce {
            Some(f) => {
                coerced = f(raw);
                &coerced
            }
            None => raw,
        };

        if !self.kind.matches(value) {
            report.fail(format!(
                "Field '{field}' has wrong type. Expected {}, got {}",
                self.kind,
                FieldKind::of(value)
            ));
            return;
        }

        if let (Some(min), Some(len)) = (self.min_len, value_len(value)) {
            if len < min {
                report.warn(format!(
                    "Field '{field}' is too short. Minimum length: {min}"
                ));
            }
        }
        if let (Some(max), Some(len)) = (self.max_len, value_len(value)) {
            if len > max {
                report.warn(format!(
                    "Field '{field}' is very long. Maximum recommended: {max}"
                ));
            }
        }

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(value) {
                let list = allowed
                    .iter()
                    .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                report.fail(format!("Field '{field}' has invalid value. Allowed: [{list}]"));
            }
        }

        if let Some(predicate) = &self.predicate {
            match predicate(value) {
                Ok(true) => {}
                Ok(false) => report.fail(format!("Field '{field}' failed custom validation")),
                Err(e) => report.warn(format!("Custom validation failed for '{field}': {e}")),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub checked_fields: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            checked_fields: Vec::new(),
        }
    }

    pub fn fail(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }

    pub fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// ValidationRuleSet
// ---------------------------------------------------------------------------

/// Edge key used by the rule tables.
pub fn edge_key(source: Stage, target: Stage) -> String {
    format!("{}->{}", source.as_str(), target.as_str())
}

#[derive(Debug, Clone, Default)]
pub struct ValidationRuleSet {
    rules: HashMap<String, Vec<ValidationRule>>,
}

impl ValidationRuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register rules under an explicit key. `"any->{target}"` applies to
    /// every edge into `target` that has no exact entry.
    pub fn insert(&mut self, key: impl Into<String>, rules: Vec<ValidationRule>) {
        self.rules.insert(key.into(), rules);
    }

    pub fn rules_for(&self, source: Stage, target: Stage) -> &[ValidationRule] {
        self.rules
            .get(&edge_key(source, target))
            .or_else(|| self.rules.get(&format!("any->{}", target.as_str())))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn validate(&self, state: &WorkflowState, source: Stage, target: Stage) -> ValidationReport {
        let view = state.field_view();
        let mut report = ValidationReport::new();
        for rule in self.rules_for(source, target) {
            rule.check(&view, &mut report);
        }
        report
    }

    /// Rule tables for the standard content workflow.
    pub fn standard() -> Self {
        use FieldKind::*;
        use ValidationRule as R;

        let mut set = Self::new();
        let key = edge_key;

        set.insert(
            key(Stage::Initialize, Stage::Research),
            vec![
                R::required("topic", Text)
                    .min_len(5)
                    .max_len(200)
                    .coerce(|v| match v.as_str() {
                        Some(s) => Value::String(s.trim().to_string()),
                        None => v.clone(),
                    }),
                R::required("content_type", Text)
                    .allowed(ContentType::ALL.iter().map(|c| c.as_str())),
                R::optional("target_audience", Text).max_len(100),
                R::required("metadata", Map),
                R::required("workflow_stage", Text).allowed([Stage::Initialize.phase()]),
            ],
        );
        set.insert(
            key(Stage::Research, Stage::Analyze),
            vec![
                R::required("research_query", Text).min_len(10),
                R::required("search_results", List),
                R::required("research_confidence", Float).number(|c| (0.0..=1.0).contains(&c)),
                R::required("extracted_keywords", List),
                R::required("research_summary", Text).min_len(20),
            ],
        );
        set.insert(
            key(Stage::Analyze, Stage::Planning),
            vec![
                R::required("trending_topics", List),
                R::required("research_confidence", Float).number(|c| c >= 0.3),
                R::required("metadata", Map),
            ],
        );
        set.insert(
            key(Stage::Planning, Stage::Writing),
            vec![
                R::required("content_outline", Text).min_len(50),
                R::required("content_sections", List).min_len(2),
                R::required("primary_keywords", List).min_len(1),
                R::required("metadata", Map),
            ],
        );
        set.insert(
            key(Stage::Writing, Stage::Review),
            vec![
                R::required("draft_content", Text).min_len(100),
                R::required("word_count", Integer).number(|n| n >= 50.0),
                R::required("content_sections", List),
            ],
        );
        set.insert(
            key(Stage::Review, Stage::Seo),
            vec![
                R::required("draft_content", Text).min_len(100),
                R::required("word_count", Integer).number(|n| n >= 100.0),
                R::required("primary_keywords", List).min_len(1),
            ],
        );
        set.insert(
            key(Stage::Seo, Stage::QualityAssurance),
            vec![
                R::required("optimized_content", Text).min_len(100),
                R::required("seo_score", Float).number(|s| (0.0..=100.0).contains(&s)),
                R::required("meta_description", Text).min_len(120).max_len(160),
                R::required("title_suggestions", List).min_len(1),
            ],
        );
        set.insert(
            key(Stage::QualityAssurance, Stage::FinalAssembly),
            vec![
                R::required("quality_score", Float).number(|q| q >= 70.0),
                R::required("optimized_content", Text).min_len(200),
                R::required("quality_checks", Map),
            ],
        );
        set.insert(
            key(Stage::QualityAssurance, Stage::RevisionPlanning),
            vec![
                R::required("quality_score", Float).number(|q| q < 80.0),
                R::required("quality_feedback", List).min_len(1),
                R::required("revision_count", Integer)
                    .number(|n| n < f64::from(MAX_REVISIONS)),
            ],
        );
        set.insert(
            key(Stage::RevisionPlanning, Stage::ContentRevision),
            vec![
                R::required("metadata", Map),
                R::required("quality_feedback", List).min_len(1),
                R::required("revision_count", Integer),
            ],
        );
        set.insert(
            key(Stage::ContentRevision, Stage::Review),
            vec![
                R::required("draft_content", Text).min_len(100),
                R::required("word_count", Integer).number(|n| n >= 100.0),
                R::required("revision_count", Integer)
                    .number(|n| n <= f64::from(MAX_REVISIONS)),
            ],
        );
        set.insert(
            key(Stage::FinalAssembly, Stage::Completion),
            vec![
                R::required("final_content", Text).min_len(200),
                R::required("quality_score", Float).number(|q| q >= 70.0),
                R::required("metadata", Map),
            ],
        );
        set.insert(
            format!("any->{}", Stage::Error.as_str()),
            vec![
                R::required("error_messages", List).min_len(1),
                R::required("current_agent", Text),
                R::required("workflow_stage", Text),
            ],
        );

        set
    }
}
