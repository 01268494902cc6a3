//! The handoff manager: every stage-to-stage transition goes through
//! validate, snapshot, transform, post-validate and stamp.
//!
//! [`HandoffManager::execute`] never panics or returns `Err`. Its result is a
//! [`Handoff`] sum type so the caller has to decide what a rejected or failed
//! transition means for the run. A [`HandoffRecord`] is produced and kept in
//! the manager's history for every call.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use quill_types::{
    HandoffStatus, HandoffSummary, QuillError, Result, RollbackSnapshot, Stage, WorkflowState,
};

use crate::requirements::{NodeRequirements, PostValidation};
use crate::transforms::{TransformOutcome, TransformResult, TransformRuleSet};
use crate::validation::{ValidationReport, ValidationRuleSet};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Field-level difference between the state before and after a handoff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTransfer {
    pub fields_added: Vec<String>,
    pub fields_removed: Vec<String>,
    pub fields_modified: Vec<String>,
    pub total_fields: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub id: String,
    pub source: Stage,
    pub target: Stage,
    pub timestamp: DateTime<Utc>,
    pub status: HandoffStatus,
    pub pre_validation: ValidationReport,
    pub post_validation: Option<PostValidation>,
    pub transformations: Vec<TransformResult>,
    pub transfer: Option<DataTransfer>,
    /// Bytes of the serialized state before transformation.
    pub data_size: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Seconds.
    pub processing_time: f64,
    pub checksum: Option<String>,
}

impl HandoffRecord {
    fn new(source: Stage, target: Stage) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        Self {
            id,
            source,
            target,
            timestamp: Utc::now(),
            status: HandoffStatus::Success,
            pre_validation: ValidationReport::new(),
            post_validation: None,
            transformations: Vec::new(),
            transfer: None,
            data_size: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
            processing_time: 0.0,
            checksum: None,
        }
    }

    pub fn transition(&self) -> String {
        format!("{}->{}", self.source, self.target)
    }

    pub fn applied_transformations(&self) -> Vec<&str> {
        self.transformations
            .iter()
            .filter(|t| t.is_applied())
            .map(|t| t.name.as_str())
            .collect()
    }

    fn summary(&self) -> HandoffSummary {
        HandoffSummary {
            id: self.id.clone(),
            source: self.source,
            target: self.target,
            timestamp: self.timestamp,
            status: self.status,
            processing_time: self.processing_time,
        }
    }
}

/// Outcome of one transition. Every variant carries the state to continue
/// with and the audit record.
#[must_use]
#[derive(Debug)]
pub enum Handoff {
    /// Pre-validation passed; the state carries transformations and stamps.
    /// The record status is `Success`, `Partial` or `Warning`.
    Accepted {
        state: WorkflowState,
        record: HandoffRecord,
    },
    /// Pre-validation failed; the state is returned unchanged.
    Rejected {
        state: WorkflowState,
        record: HandoffRecord,
    },
    /// Stamping failed after transformation; the state is returned unchanged.
    Failed {
        state: WorkflowState,
        record: HandoffRecord,
        error: QuillError,
    },
}

impl Handoff {
    pub fn record(&self) -> &HandoffRecord {
        match self {
            Handoff::Accepted { record, .. }
            | Handoff::Rejected { record, .. }
            | Handoff::Failed { record, .. } => record,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Handoff::Accepted { .. })
    }

    pub fn into_parts(self) -> (WorkflowState, HandoffRecord) {
        match self {
            Handoff::Accepted { state, record }
            | Handoff::Rejected { state, record }
            | Handoff::Failed { state, record, .. } => (state, record),
        }
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffAnalytics {
    pub total_handoffs: usize,
    /// Fraction of handoffs with status `success`.
    pub success_rate: f64,
    pub average_processing_time: f64,
    /// `"source->target"` with counts, most frequent first.
    pub transitions: Vec<(String, usize)>,
    pub error_patterns: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall_health: HealthStatus,
    pub success_rate: f64,
    pub average_processing_time: f64,
    pub warning_indicators: Vec<String>,
    pub performance_issues: Vec<String>,
    pub recommendations: Vec<String>,
}

const HEALTH_WINDOW: usize = 10;

fn success_rate(records: &[HandoffRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let ok = records
        .iter()
        .filter(|r| r.status == HandoffStatus::Success)
        .count();
    ok as f64 / records.len() as f64
}

fn average_time(records: &[HandoffRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.processing_time).sum::<f64>() / records.len() as f64
}

pub fn analytics(records: &[HandoffRecord]) -> HandoffAnalytics {
    let mut transitions: Vec<(String, usize)> = Vec::new();
    for record in records {
        let key = record.transition();
        match transitions.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => transitions.push((key, 1)),
        }
    }
    transitions.sort_by(|a, b| b.1.cmp(&a.1));

    let mut error_patterns = BTreeMap::new();
    for record in records.iter().filter(|r| {
        matches!(r.status, HandoffStatus::Failure | HandoffStatus::ValidationError)
    }) {
        for error in &record.errors {
            *error_patterns.entry(error.clone()).or_insert(0) += 1;
        }
    }

    HandoffAnalytics {
        total_handoffs: records.len(),
        success_rate: success_rate(records),
        average_processing_time: average_time(records),
        transitions,
        error_patterns,
    }
}

pub fn health_report(records: &[HandoffRecord]) -> HealthReport {
    let recent = &records[records.len().saturating_sub(HEALTH_WINDOW)..];
    if recent.is_empty() {
        return HealthReport {
            overall_health: HealthStatus::NoData,
            success_rate: 0.0,
            average_processing_time: 0.0,
            warning_indicators: Vec::new(),
            performance_issues: Vec::new(),
            recommendations: Vec::new(),
        };
    }

    let rate = success_rate(recent);
    let avg = average_time(recent);
    let mut report = HealthReport {
        overall_health: HealthStatus::Healthy,
        success_rate: rate,
        average_processing_time: avg,
        warning_indicators: Vec::new(),
        performance_issues: Vec::new(),
        recommendations: Vec::new(),
    };

    if rate < 0.8 {
        report.overall_health = HealthStatus::Warning;
        report.warning_indicators.push("Low success rate".into());
    }
    if avg > 5.0 {
        report.performance_issues.push("High processing times".into());
    }
    if rate < 0.9 {
        report
            .recommendations
            .push("Review validation rules for frequent failures".into());
    }
    if avg > 3.0 {
        report
            .recommendations
            .push("Optimize transformation functions for better performance".into());
    }
    report
}

// ---------------------------------------------------------------------------
// Checksums and diffs
// ---------------------------------------------------------------------------

/// First 16 hex chars of SHA-256 over the key-sorted JSON of the state.
pub fn state_checksum(state: &WorkflowState) -> Result<String> {
    // `serde_json::Map` is ordered by key, so the encoding is canonical.
    let canonical = serde_json::to_string(&serde_json::to_value(state)?)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest)[..16].to_string())
}

fn diff_fields(before: &WorkflowState, after: &WorkflowState) -> DataTransfer {
    let old = before.field_view();
    let new = after.field_view();
    DataTransfer {
        fields_added: new.keys().filter(|k| !old.contains_key(*k)).cloned().collect(),
        fields_removed: old.keys().filter(|k| !new.contains_key(*k)).cloned().collect(),
        fields_modified: new
            .iter()
            .filter(|(k, v)| old.get(*k).is_some_and(|o| o != *v))
            .map(|(k, _)| k.clone())
            .collect(),
        total_fields: new.len(),
    }
}

// ---------------------------------------------------------------------------
// HandoffManager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HandoffManager {
    validation: ValidationRuleSet,
    transforms: TransformRuleSet,
    requirements: NodeRequirements,
    history: Vec<HandoffRecord>,
}

impl HandoffManager {
    pub fn new(
        validation: ValidationRuleSet,
        transforms: TransformRuleSet,
        requirements: NodeRequirements,
    ) -> Self {
        Self {
            validation,
            transforms,
            requirements,
            history: Vec::new(),
        }
    }

    pub fn standard() -> Self {
        Self::new(
            ValidationRuleSet::standard(),
            TransformRuleSet::standard(),
            NodeRequirements::standard(),
        )
    }

    /// Same rules, empty history.
    pub fn fresh(&self) -> Self {
        Self::new(
            self.validation.clone(),
            self.transforms.clone(),
            self.requirements.clone(),
        )
    }

    pub fn validation_rules(&self) -> &ValidationRuleSet {
        &self.validation
    }

    pub fn transform_rules(&self) -> &TransformRuleSet {
        &self.transforms
    }

    pub fn history(&self) -> &[HandoffRecord] {
        &self.history
    }

    pub fn into_history(self) -> Vec<HandoffRecord> {
        self.history
    }

    pub fn analytics(&self) -> HandoffAnalytics {
        analytics(&self.history)
    }

    pub fn health_report(&self) -> HealthReport {
        health_report(&self.history)
    }

    pub fn execute(&mut self, state: WorkflowState, source: Stage, target: Stage) -> Handoff {
        let started = Instant::now();
        let mut record = HandoffRecord::new(source, target);
        tracing::debug!(source = %source, target = %target, id = %record.id, "Executing handoff");

        let handoff = self.run_steps(state, &mut record, started);
        record.processing_time = started.elapsed().as_secs_f64();

        tracing::info!(
            source = %source,
            target = %target,
            status = ?record.status,
            transforms = record.applied_transformations().len(),
            "Handoff finished"
        );
        self.history.push(record.clone());

        match handoff {
            Steps::Accepted(state) => Handoff::Accepted { state, record },
            Steps::Rejected(state) => Handoff::Rejected { state, record },
            Steps::Failed(state, error) => Handoff::Failed {
                state,
                record,
                error,
            },
        }
    }

    fn run_steps(&self, state: WorkflowState, record: &mut HandoffRecord, started: Instant) -> Steps {
        let (source, target) = (record.source, record.target);

        // 1. Pre-validation.
        record.pre_validation = self.validation.validate(&state, source, target);
        record.warnings.extend(record.pre_validation.warnings.iter().cloned());
        if !record.pre_validation.valid {
            record.status = HandoffStatus::ValidationError;
            record.errors.extend(record.pre_validation.errors.iter().cloned());
            return Steps::Rejected(state);
        }

        // 2. Snapshot.
        match serde_json::to_string(&state) {
            Ok(json) => record.data_size = json.len(),
            Err(e) => tracing::warn!(error = %e, "State snapshot could not be serialized"),
        }
        let mut next = state.clone();
        next.rollback_snapshots.insert(
            format!("pre_{}", target.as_str()),
            RollbackSnapshot {
                timestamp: Utc::now(),
                stage: source,
                draft: state.draft.clone(),
                quality_score: state.quality_score(),
                error_count: state.error_messages.len(),
            },
        );

        // 3. Transform.
        record.transformations = self.transforms.apply(&mut next, source, target);
        for t in &record.transformations {
            if let TransformOutcome::Skipped(reason) = &t.outcome {
                record.warnings.push(format!("Transformation '{}' skipped: {reason}", t.name));
            }
        }

        // 4. Post-validation.
        let post = self.requirements.check(&next, target);
        record.warnings.extend(post.missing.iter().cloned());
        record.warnings.extend(post.quality_warnings.iter().cloned());
        record.status = if !post.is_complete() {
            HandoffStatus::Warning
        } else if record.transformations.iter().any(|t| !t.is_applied()) {
            HandoffStatus::Partial
        } else {
            HandoffStatus::Success
        };
        record.post_validation = Some(post);

        // 5. Stamp.
        match self.stamp(&mut next, record, started) {
            Ok(()) => {
                record.transfer = Some(diff_fields(&state, &next));
                Steps::Accepted(next)
            }
            Err(e) => {
                record.status = HandoffStatus::Failure;
                record.errors.push(format!("Handoff execution failed: {e}"));
                Steps::Failed(state, e)
            }
        }
    }

    fn stamp(&self, state: &mut WorkflowState, record: &mut HandoffRecord, started: Instant) -> Result<()> {
        let mut summary = record.summary();
        summary.processing_time = started.elapsed().as_secs_f64();
        state.handoff_history.push(summary);
        state.metadata.current_node = Some(record.target);
        state.metadata.last_handoff = Some(record.id.clone());

        let checksum = state_checksum(state)?;
        tracing::debug!(id = %record.id, checksum = %checksum, "State checksum");
        state.metadata.last_checksum = Some(checksum.clone());
        record.checksum = Some(checksum);
        Ok(())
    }
}

impl Default for HandoffManager {
    fn default() -> Self {
        Self::standard()
    }
}

enum Steps {
    Accepted(WorkflowState),
    Rejected(WorkflowState),
    Failed(WorkflowState, QuillError),
}
