//! Workflow graph lint: rules and diagnostics.
//!
//! Provides six built-in rules that check the structure of a
//! [`WorkflowGraph`]. Call [`lint`] for advisory diagnostics or
//! [`lint_or_raise`] to fail on any `Error`-severity issue.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use quill_types::{QuillError, Stage};

use crate::graph::WorkflowGraph;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub stage: Option<Stage>,
    pub edge: Option<(Stage, Stage)>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct EntryStageRule;
impl LintRule for EntryStageRule {
    fn name(&self) -> &str {
        "entry_stage"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        let entry = graph.entry();
        let incoming: Vec<_> = graph.all_edges().iter().filter(|e| e.to == entry).collect();
        if entry.is_terminal() {
            vec![Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Entry stage '{entry}' is a terminal stage"),
                stage: Some(entry),
                edge: None,
                fix: Some("Start the workflow at a working stage".into()),
            }]
        } else {
            incoming
                .into_iter()
                .map(|e| Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!("Entry stage '{entry}' has an incoming edge from '{}'", e.from),
                    stage: Some(entry),
                    edge: Some((e.from, e.to)),
                    fix: Some(format!("Remove the edge {} -> {}", e.from, e.to)),
                })
                .collect()
        }
    }
}

struct TerminalStageRule;
impl LintRule for TerminalStageRule {
    fn name(&self) -> &str {
        "terminal_stage"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for terminal in [Stage::Completion, Stage::Error] {
            if !graph.has_stage(terminal) {
                diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!("Workflow has no '{terminal}' stage"),
                    stage: Some(terminal),
                    edge: None,
                    fix: Some(format!("Add the '{terminal}' stage")),
                });
            }
            for e in graph.outgoing_edges(terminal) {
                diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!("Terminal stage '{terminal}' has an outgoing edge to '{}'", e.to),
                    stage: Some(terminal),
                    edge: Some((e.from, e.to)),
                    fix: Some(format!("Remove the edge {} -> {}", e.from, e.to)),
                });
            }
        }
        diags
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str {
        "reachability"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        visited.insert(graph.entry());
        queue.push_back(graph.entry());

        while let Some(current) = queue.pop_front() {
            for edge in graph.outgoing_edges(current) {
                if visited.insert(edge.to) {
                    queue.push_back(edge.to);
                }
            }
        }

        let mut diags: Vec<_> = graph
            .stages()
            .iter()
            .filter(|s| !visited.contains(*s))
            .map(|stage| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Stage '{stage}' is not reachable from the entry stage"),
                stage: Some(*stage),
                edge: None,
                fix: Some(format!("Add an edge leading to '{stage}' or remove it")),
            })
            .collect();

        diags.extend(
            graph
                .all_edges()
                .iter()
                .filter(|e| !graph.has_stage(e.from) || !graph.has_stage(e.to))
                .map(|e| Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Error,
                    message: format!("Edge {} -> {} references an undeclared stage", e.from, e.to),
                    stage: None,
                    edge: Some((e.from, e.to)),
                    fix: Some("Declare both stages with add_stage".into()),
                }),
        );
        diags
    }
}

struct GateCoverageRule;
impl LintRule for GateCoverageRule {
    fn name(&self) -> &str {
        "gate_coverage"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        for (stage, gate) in graph.gates() {
            for label in gate.labels() {
                if graph.route(stage, label).is_none() {
                    diags.push(Diagnostic {
                        rule: self.name().into(),
                        severity: Severity::Error,
                        message: format!(
                            "Gate '{}' on '{stage}' can choose '{label}' but no edge carries it",
                            gate.as_str()
                        ),
                        stage: Some(stage),
                        edge: None,
                        fix: Some(format!("Add a route '{label}' leaving '{stage}'")),
                    });
                }
            }
        }
        for e in graph.all_edges() {
            let Some(label) = e.label.as_deref() else { continue };
            let known = graph
                .gate(e.from)
                .is_some_and(|g| g.labels().contains(&label));
            if !known {
                diags.push(Diagnostic {
                    rule: self.name().into(),
                    severity: Severity::Warning,
                    message: format!("Route '{label}' on {} -> {} is never chosen", e.from, e.to),
                    stage: Some(e.from),
                    edge: Some((e.from, e.to)),
                    fix: None,
                });
            }
        }
        diags
    }
}

struct DanglingStageRule;
impl LintRule for DanglingStageRule {
    fn name(&self) -> &str {
        "dangling_stage"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        graph
            .stages()
            .iter()
            .filter(|s| !s.is_terminal() && graph.gate(**s).is_none())
            .filter(|s| graph.next(**s).is_none())
            .map(|stage| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Stage '{stage}' has no gate and no unconditional edge"),
                stage: Some(*stage),
                edge: None,
                fix: Some(format!("Add an edge leaving '{stage}'")),
            })
            .collect()
    }
}

/// Every cycle must contain at least one edge with a traversal limit:
/// dropping the guarded edges has to leave an acyclic graph.
struct CycleGuardRule;
impl LintRule for CycleGuardRule {
    fn name(&self) -> &str {
        "cycle_guard"
    }
    fn apply(&self, graph: &WorkflowGraph) -> Vec<Diagnostic> {
        let unguarded: Vec<_> = graph
            .all_edges()
            .iter()
            .filter(|e| e.max_traversals.is_none())
            .collect();

        let mut in_degree: HashMap<Stage, usize> =
            graph.stages().iter().map(|s| (*s, 0)).collect();
        for e in &unguarded {
            *in_degree.entry(e.to).or_insert(0) += 1;
        }

        let mut queue: VecDeque<Stage> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(s, _)| *s)
            .collect();
        while let Some(stage) = queue.pop_front() {
            for e in unguarded.iter().filter(|e| e.from == stage) {
                if let Some(d) = in_degree.get_mut(&e.to) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(e.to);
                    }
                }
            }
        }

        let mut looping: HashSet<Stage> = in_degree
            .into_iter()
            .filter(|(_, d)| *d > 0)
            .map(|(s, _)| s)
            .collect();

        // Drop stages that are only downstream of a cycle.
        loop {
            let leaves: Vec<Stage> = looping
                .iter()
                .copied()
                .filter(|s| {
                    !unguarded
                        .iter()
                        .any(|e| e.from == *s && looping.contains(&e.to))
                })
                .collect();
            if leaves.is_empty() {
                break;
            }
            for leaf in leaves {
                looping.remove(&leaf);
            }
        }

        let mut looping: Vec<Stage> = looping.into_iter().collect();
        looping.sort();
        looping
            .into_iter()
            .map(|stage| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Error,
                message: format!("Stage '{stage}' lies on a cycle without a traversal guard"),
                stage: Some(stage),
                edge: None,
                fix: Some("Use add_guarded_route for the back edge".into()),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn lint(graph: &WorkflowGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(EntryStageRule),
        Box::new(TerminalStageRule),
        Box::new(ReachabilityRule),
        Box::new(GateCoverageRule),
        Box::new(DanglingStageRule),
        Box::new(CycleGuardRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn lint_or_raise(graph: &WorkflowGraph) -> quill_types::Result<Vec<Diagnostic>> {
    let diagnostics = lint(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();
    if !errors.is_empty() {
        let messages: Vec<_> = errors.iter().map(|d| d.message.clone()).collect();
        return Err(QuillError::GraphError(messages.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Gate;

    fn linear() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new("linear", Stage::Initialize);
        graph
            .add_stage(Stage::Writing)
            .add_stage(Stage::Completion)
            .add_stage(Stage::Error)
            .add_edge(Stage::Initialize, Stage::Writing)
            .add_edge(Stage::Writing, Stage::Completion)
            .add_edge(Stage::Initialize, Stage::Error);
        graph
    }

    fn has(diags: &[Diagnostic], rule: &str, severity: Severity) -> bool {
        diags.iter().any(|d| d.rule == rule && d.severity == severity)
    }

    #[test]
    fn standard_graph_passes() {
        let diags = lint(&WorkflowGraph::standard());
        assert!(diags.is_empty(), "Expected no diagnostics, got: {diags:?}");
        assert!(lint_or_raise(&WorkflowGraph::standard()).is_ok());
    }

    #[test]
    fn linear_graph_passes() {
        let diags = lint(&linear());
        let errors: Vec<_> = diags.iter().filter(|d| d.severity == Severity::Error).collect();
        assert!(errors.is_empty(), "Expected no errors, got: {errors:?}");
    }

    #[test]
    fn entry_with_incoming_edge_error() {
        let mut graph = linear();
        graph.add_edge(Stage::Writing, Stage::Initialize);
        assert!(has(&lint(&graph), "entry_stage", Severity::Error));
    }

    #[test]
    fn missing_terminal_error() {
        let mut graph = WorkflowGraph::new("g", Stage::Initialize);
        graph.add_stage(Stage::Completion).add_edge(Stage::Initialize, Stage::Completion);
        let diags = lint(&graph);
        assert!(diags
            .iter()
            .any(|d| d.rule == "terminal_stage" && d.message.contains("error_handling")));
    }

    #[test]
    fn terminal_with_outgoing_edge_error() {
        let mut graph = linear();
        graph.add_edge(Stage::Completion, Stage::Writing);
        assert!(has(&lint(&graph), "terminal_stage", Severity::Error));
    }

    #[test]
    fn unreachable_stage_error() {
        let mut graph = linear();
        graph.add_stage(Stage::Seo).add_edge(Stage::Seo, Stage::Completion);
        let diags = lint(&graph);
        assert!(
            diags.iter().any(|d| d.rule == "reachability" && d.stage == Some(Stage::Seo)),
            "Expected unreachable diagnostic for seo, got: {diags:?}"
        );
    }

    #[test]
    fn undeclared_edge_target_error() {
        let mut graph = linear();
        graph.add_edge(Stage::Writing, Stage::Review);
        assert!(lint(&graph)
            .iter()
            .any(|d| d.rule == "reachability" && d.edge == Some((Stage::Writing, Stage::Review))));
    }

    #[test]
    fn uncovered_gate_label_error() {
        let mut graph = linear();
        graph
            .add_stage(Stage::Review)
            .set_gate(Stage::Review, Gate::Content)
            .add_edge(Stage::Writing, Stage::Review)
            .add_route(Stage::Review, "seo", Stage::Completion)
            .add_route(Stage::Review, "error", Stage::Error);
        let diags = lint(&graph);
        assert!(diags.iter().any(|d| d.rule == "gate_coverage"
            && d.severity == Severity::Error
            && d.message.contains("'revise'")));
    }

    #[test]
    fn unknown_route_label_warning() {
        let mut graph = linear();
        graph.add_route(Stage::Writing, "maybe", Stage::Error);
        assert!(has(&lint(&graph), "gate_coverage", Severity::Warning));
    }

    #[test]
    fn dangling_stage_error() {
        let mut graph = linear();
        graph.add_stage(Stage::Seo).add_edge(Stage::Writing, Stage::Seo);
        let diags = lint(&graph);
        assert!(diags.iter().any(|d| d.rule == "dangling_stage" && d.stage == Some(Stage::Seo)));
    }

    #[test]
    fn unguarded_cycle_error() {
        let mut graph = WorkflowGraph::standard();
        graph.add_edge(Stage::Review, Stage::Writing);
        let diags = lint(&graph);
        assert!(diags
            .iter()
            .any(|d| d.rule == "cycle_guard" && d.stage == Some(Stage::Writing)));

        let result = lint_or_raise(&graph);
        match result {
            Err(QuillError::GraphError(msg)) => assert!(msg.contains("traversal guard")),
            other => panic!("unexpected lint result: {other:?}"),
        }
    }
}
