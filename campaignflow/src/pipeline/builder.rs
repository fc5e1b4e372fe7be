//! Workflow graph builder with validation.

use super::graph::{Edge, FanOutRouter, Next, Router, WorkflowGraph};
use crate::context::RunContext;
use crate::errors::{ContractErrorInfo, GraphValidationError};
use crate::stages::Stage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Builder for creating validated workflow graphs.
#[derive(Debug)]
pub struct GraphBuilder {
    name: String,
    entry: Option<String>,
    stages: HashMap<String, Arc<dyn Stage>>,
    edges: HashMap<String, Edge>,
    stage_order: Vec<String>,
}

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            stages: HashMap::new(),
            edges: HashMap::new(),
            stage_order: Vec::new(),
        }
    }

    /// Adds a stage under its own name.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage with the same name was already added.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, GraphValidationError> {
        let name = stage.name().to_string();
        if self.stages.contains_key(&name) {
            return Err(GraphValidationError::new(format!("Duplicate stage '{name}'"))
                .with_stages(vec![name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-DUPLICATE-STAGE",
                        format!("Stage '{name}' is registered twice"),
                    )
                    .with_fix_hint("Give every stage a unique name."),
                ));
        }
        self.stage_order.push(name.clone());
        self.stages.insert(name, stage);
        Ok(self)
    }

    /// Sets the stage the traversal starts at.
    #[must_use]
    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Adds an unconditional edge.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` already has an outgoing edge.
    pub fn edge(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self, GraphValidationError> {
        self.add_edge(from.into(), Edge::Static(to.into()))
    }

    /// Adds a conditional edge whose router may name any of `targets`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` already has an outgoing edge.
    pub fn conditional<F>(
        self,
        from: impl Into<String>,
        targets: &[&str],
        router: F,
    ) -> Result<Self, GraphValidationError>
    where
        F: Fn(&RunContext) -> Next + Send + Sync + 'static,
    {
        let router: Router = Arc::new(router);
        self.add_edge(
            from.into(),
            Edge::Conditional {
                router,
                targets: targets.iter().map(|t| (*t).to_string()).collect(),
            },
        )
    }

    /// Adds a fan-out edge dispatching a dynamic subset of `branches`,
    /// each of which must reach `join` through unconditional edges.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` already has an outgoing edge.
    pub fn fan_out<F>(
        self,
        from: impl Into<String>,
        branches: &[&str],
        join: impl Into<String>,
        router: F,
    ) -> Result<Self, GraphValidationError>
    where
        F: Fn(&RunContext) -> Vec<String> + Send + Sync + 'static,
    {
        let router: FanOutRouter = Arc::new(router);
        self.add_edge(
            from.into(),
            Edge::FanOut {
                router,
                branches: branches.iter().map(|b| (*b).to_string()).collect(),
                join: join.into(),
            },
        )
    }

    fn add_edge(mut self, from: String, edge: Edge) -> Result<Self, GraphValidationError> {
        if self.edges.contains_key(&from) {
            return Err(
                GraphValidationError::new(format!("Stage '{from}' already has an outgoing edge"))
                    .with_stages(vec![from.clone()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "GRAPH-DUPLICATE-EDGE",
                            format!("Stage '{from}' has more than one outgoing edge"),
                        )
                        .with_fix_hint("Use a conditional edge to choose between successors."),
                    ),
            );
        }
        self.edges.insert(from, edge);
        Ok(self)
    }

    /// Returns the graph name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Validates and builds the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph is empty, has no valid entry, names an
    /// unknown stage, leaves a stage without an outgoing edge, or has a
    /// fan-out branch that does not reach its join.
    pub fn build(self) -> Result<WorkflowGraph, GraphValidationError> {
        if self.stages.is_empty() {
            return Err(GraphValidationError::new("Graph has no stages").with_error_info(
                ContractErrorInfo::new("GRAPH-EMPTY", "Cannot build an empty graph")
                    .with_fix_hint("Add at least one stage before building."),
            ));
        }

        let entry = match &self.entry {
            Some(entry) if self.stages.contains_key(entry) => entry.clone(),
            other => {
                let named = other.clone().unwrap_or_default();
                return Err(GraphValidationError::new(format!(
                    "Graph '{}' has no valid entry stage",
                    self.name
                ))
                .with_stages(vec![named.clone()])
                .with_error_info(
                    ContractErrorInfo::new("GRAPH-NO-ENTRY", "Entry stage missing or unknown")
                        .with_fix_hint("Call entry() with the name of a registered stage.")
                        .with_context_entry("entry", named),
                ));
            }
        };

        for name in &self.stage_order {
            let Some(edge) = self.edges.get(name) else {
                return Err(GraphValidationError::new(format!(
                    "Stage '{name}' has no outgoing edge"
                ))
                .with_stages(vec![name.clone()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-DANGLING-STAGE",
                        format!("Stage '{name}' does not lead anywhere"),
                    )
                    .with_fix_hint("Route terminal paths through a conditional edge that ends the run."),
                ));
            };
            for target in edge_targets(edge) {
                self.require_known(name, target)?;
            }
        }
        for from in self.edges.keys() {
            self.require_known(from, from)?;
        }

        for (from, edge) in &self.edges {
            if let Edge::FanOut { branches, join, .. } = edge {
                for branch in branches {
                    self.require_reaches(from, branch, join)?;
                }
            }
        }

        Ok(WorkflowGraph::new(
            self.name,
            entry,
            self.stages,
            self.edges,
            self.stage_order,
        ))
    }

    fn require_known(&self, from: &str, target: &str) -> Result<(), GraphValidationError> {
        if self.stages.contains_key(target) {
            return Ok(());
        }
        Err(
            GraphValidationError::new(format!("Edge from '{from}' targets unknown stage '{target}'"))
                .with_stages(vec![from.to_string(), target.to_string()])
                .with_error_info(
                    ContractErrorInfo::new(
                        "GRAPH-UNKNOWN-TARGET",
                        format!("Stage '{target}' not found"),
                    )
                    .with_fix_hint("Register every stage an edge refers to."),
                ),
        )
    }

    fn require_reaches(
        &self,
        from: &str,
        branch: &str,
        join: &str,
    ) -> Result<(), GraphValidationError> {
        let mut visited = HashSet::new();
        let mut current = branch.to_string();
        while current != join {
            let next = match self.edges.get(&current) {
                Some(Edge::Static(next)) if visited.insert(current.clone()) => next.clone(),
                _ => {
                    return Err(GraphValidationError::new(format!(
                        "Branch '{branch}' of '{from}' does not reach join '{join}'"
                    ))
                    .with_stages(vec![branch.to_string(), join.to_string()])
                    .with_error_info(
                        ContractErrorInfo::new(
                            "GRAPH-BRANCH-UNJOINED",
                            format!("Branch '{branch}' stops at '{current}'"),
                        )
                        .with_fix_hint("Connect every branch stage to the join with unconditional edges."),
                    ))
                }
            };
            current = next;
        }
        Ok(())
    }
}

fn edge_targets(edge: &Edge) -> Vec<&str> {
    match edge {
        Edge::Static(next) => vec![next.as_str()],
        Edge::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        Edge::FanOut { branches, join, .. } => branches
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(join.as_str()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageOutput, Terminal};
    use crate::stages::StageContext;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl Stage for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _ctx: &StageContext) -> StageOutput {
            StageOutput::ok_empty()
        }
    }

    fn stage(name: &'static str) -> Arc<dyn Stage> {
        Arc::new(Named(name))
    }

    fn end(_: &RunContext) -> Next {
        Next::End(Terminal::Done)
    }

    #[test]
    fn test_empty_graph_rejected() {
        let err = GraphBuilder::new("empty").build().unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-EMPTY"));
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let err = GraphBuilder::new("dup")
            .stage(stage("a"))
            .unwrap()
            .stage(stage("a"))
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-DUPLICATE-STAGE"));
    }

    #[test]
    fn test_missing_entry_rejected() {
        let err = GraphBuilder::new("g")
            .stage(stage("a"))
            .unwrap()
            .conditional("a", &[], end)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-NO-ENTRY"));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let err = GraphBuilder::new("g")
            .stage(stage("a"))
            .unwrap()
            .entry("a")
            .edge("a", "ghost")
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-UNKNOWN-TARGET"));
        assert_eq!(err.stages, vec!["a".to_string(), "ghost".to_string()]);
    }

    #[test]
    fn test_dangling_stage_rejected() {
        let err = GraphBuilder::new("g")
            .stage(stage("a"))
            .unwrap()
            .stage(stage("b"))
            .unwrap()
            .entry("a")
            .edge("a", "b")
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-DANGLING-STAGE"));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let err = GraphBuilder::new("g")
            .stage(stage("a"))
            .unwrap()
            .edge("a", "a")
            .unwrap()
            .edge("a", "a")
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-DUPLICATE-EDGE"));
    }

    #[test]
    fn test_unjoined_branch_rejected() {
        let err = GraphBuilder::new("g")
            .stage(stage("start"))
            .unwrap()
            .stage(stage("branch"))
            .unwrap()
            .stage(stage("join"))
            .unwrap()
            .entry("start")
            .fan_out("start", &["branch"], "join", |_| vec!["branch".to_string()])
            .unwrap()
            .conditional("branch", &["start"], end)
            .unwrap()
            .conditional("join", &[], end)
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-BRANCH-UNJOINED"));
    }

    #[test]
    fn test_valid_graph_builds() {
        let graph = GraphBuilder::new("g")
            .stage(stage("start"))
            .unwrap()
            .stage(stage("left"))
            .unwrap()
            .stage(stage("right"))
            .unwrap()
            .stage(stage("join"))
            .unwrap()
            .entry("start")
            .fan_out("start", &["left", "right"], "join", |_| Vec::new())
            .unwrap()
            .edge("left", "join")
            .unwrap()
            .edge("right", "join")
            .unwrap()
            .conditional("join", &[], end)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(graph.name(), "g");
        assert_eq!(graph.entry(), "start");
        assert_eq!(graph.stage_count(), 4);
        assert_eq!(graph.stage_names()[0], "start");
    }
}
