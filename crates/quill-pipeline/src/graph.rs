//! The workflow graph: named stages, unconditional edges and labeled edges
//! chosen by a stage's [`Gate`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use quill_types::{Stage, MAX_RESEARCH_ATTEMPTS, MAX_REVISIONS};

/// Decision function attached to a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Research,
    Content,
    Final,
}

impl Gate {
    /// Every label the gate can return.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            Gate::Research => &["proceed", "proceed_with_caution", "retry", "error"],
            Gate::Content => &["seo", "revise", "error"],
            Gate::Final => &["finalize", "revise", "error"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Research => "research_quality",
            Gate::Content => "content_quality",
            Gate::Final => "final_quality",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub from: Stage,
    pub to: Stage,
    /// `None` for unconditional edges.
    pub label: Option<String>,
    /// Traversals allowed per run. Exceeding it routes to the error stage.
    pub max_traversals: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    pub name: String,
    entry: Stage,
    stages: Vec<Stage>,
    gates: HashMap<Stage, Gate>,
    edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>, entry: Stage) -> Self {
        Self {
            name: name.into(),
            entry,
            stages: vec![entry],
            gates: HashMap::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_stage(&mut self, stage: Stage) -> &mut Self {
        if !self.stages.contains(&stage) {
            self.stages.push(stage);
        }
        self
    }

    pub fn add_edge(&mut self, from: Stage, to: Stage) -> &mut Self {
        self.edges.push(WorkflowEdge {
            from,
            to,
            label: None,
            max_traversals: None,
        });
        self
    }

    pub fn add_route(&mut self, from: Stage, label: &str, to: Stage) -> &mut Self {
        self.edges.push(WorkflowEdge {
            from,
            to,
            label: Some(label.to_string()),
            max_traversals: None,
        });
        self
    }

    pub fn add_guarded_route(
        &mut self,
        from: Stage,
        label: &str,
        to: Stage,
        max_traversals: u32,
    ) -> &mut Self {
        self.edges.push(WorkflowEdge {
            from,
            to,
            label: Some(label.to_string()),
            max_traversals: Some(max_traversals),
        });
        self
    }

    pub fn set_gate(&mut self, stage: Stage, gate: Gate) -> &mut Self {
        self.gates.insert(stage, gate);
        self
    }

    /// The content workflow: research with retry, writing with a review and
    /// revision loop, QA with a revision-planning loop, and two terminals.
    pub fn standard() -> Self {
        use Stage::*;

        let mut graph = Self::new("content_workflow", Initialize);
        for stage in Stage::ALL {
            graph.add_stage(stage);
        }
        graph
            .add_edge(Initialize, Research)
            .add_edge(Research, Analyze)
            .set_gate(Analyze, Gate::Research)
            .add_route(Analyze, "proceed", Planning)
            .add_route(Analyze, "proceed_with_caution", Planning)
            .add_guarded_route(Analyze, "retry", Research, MAX_RESEARCH_ATTEMPTS)
            .add_route(Analyze, "error", Error)
            .add_edge(Planning, Writing)
            .add_edge(Writing, Review)
            .set_gate(Review, Gate::Content)
            .add_route(Review, "seo", Seo)
            .add_guarded_route(Review, "revise", ContentRevision, MAX_REVISIONS)
            .add_route(Review, "error", Error)
            .add_edge(Seo, QualityAssurance)
            .set_gate(QualityAssurance, Gate::Final)
            .add_route(QualityAssurance, "finalize", FinalAssembly)
            .add_guarded_route(QualityAssurance, "revise", RevisionPlanning, MAX_REVISIONS)
            .add_route(QualityAssurance, "error", Error)
            .add_edge(RevisionPlanning, ContentRevision)
            .add_edge(ContentRevision, Review)
            .add_edge(FinalAssembly, Completion);
        graph
    }

    pub fn entry(&self) -> Stage {
        self.entry
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn has_stage(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn gate(&self, stage: Stage) -> Option<Gate> {
        self.gates.get(&stage).copied()
    }

    pub fn gates(&self) -> impl Iterator<Item = (Stage, Gate)> + '_ {
        self.gates.iter().map(|(s, g)| (*s, *g))
    }

    pub fn all_edges(&self) -> &[WorkflowEdge] {
        &self.edges
    }

    pub fn outgoing_edges(&self, stage: Stage) -> impl Iterator<Item = &WorkflowEdge> {
        self.edges.iter().filter(move |e| e.from == stage)
    }

    /// The unconditional edge leaving `stage`, if any.
    pub fn next(&self, stage: Stage) -> Option<&WorkflowEdge> {
        self.outgoing_edges(stage).find(|e| e.label.is_none())
    }

    /// The edge leaving `stage` with `label`.
    pub fn route(&self, stage: Stage, label: &str) -> Option<&WorkflowEdge> {
        self.outgoing_edges(stage)
            .find(|e| e.label.as_deref() == Some(label))
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::standard()
    }
}
