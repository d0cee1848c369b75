// src/dag/graph.rs

use std::collections::{HashMap, VecDeque};

use petgraph::graphmap::DiGraphMap;

use crate::errors::PlanRunnerError;
use crate::plan::PlanSpec;

/// Internal node structure: stores immediate deps and dependents by task id.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<String>,
    dependents: Vec<String>,
}

/// In-memory DAG representation keyed by task id.
///
/// Reference integrity is assumed to already hold (the plan loader checks
/// `depends_on` referents exist); this type only adds adjacency/in-degree
/// bookkeeping and the acyclicity check.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: HashMap<String, DagNode>,
}

impl DagGraph {
    /// Build a DAG from a validated [`PlanSpec`], rejecting cycles.
    ///
    /// Cycle detection is a Kahn-style reduction: repeatedly strip
    /// zero-in-degree nodes; whatever remains when no more nodes can be
    /// stripped is the offending cycle (possibly spanning several
    /// interlocking cycles), which is reported in full rather than just
    /// naming a single node on it.
    pub fn build(plan: &PlanSpec) -> Result<Self, PlanRunnerError> {
        let mut nodes: HashMap<String, DagNode> = HashMap::new();

        for task in &plan.tasks {
            nodes.insert(task.id.clone(), DagNode {
                deps: task.depends_on.clone(),
                dependents: Vec::new(),
            });
        }

        let ids: Vec<String> = nodes.keys().cloned().collect();
        for id in &ids {
            let deps = nodes.get(id).map(|n| n.deps.clone()).unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(id.clone());
                }
            }
        }

        check_acyclic(&nodes)?;

        Ok(Self { nodes })
    }

    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.nodes.get(id).map(|n| n.deps.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// A topological order of task ids (used for `--dry-run` output).
    ///
    /// `build` already proved the graph acyclic, so this always succeeds.
    pub fn topological_order(&self) -> Vec<String> {
        let mut ids: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in &ids {
            graph.add_node(*id);
        }
        for id in &ids {
            let mut deps = self.nodes[*id].deps.clone();
            deps.sort_unstable();
            for dep in &deps {
                graph.add_edge(dep.as_str(), id, ());
            }
        }

        petgraph::algo::toposort(&graph, None)
            .expect("acyclicity already verified in build()")
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

fn check_acyclic(nodes: &HashMap<String, DagNode>) -> Result<(), PlanRunnerError> {
    let mut in_degree: HashMap<&str, usize> = nodes
        .keys()
        .map(|id| (id.as_str(), nodes[id].deps.len()))
        .collect();

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut removed = 0usize;

    while let Some(id) = queue.pop_front() {
        removed += 1;
        for dependent in &nodes[id].dependents {
            let deg = in_degree.get_mut(dependent.as_str()).expect("known node");
            *deg -= 1;
            if *deg == 0 {
                queue.push_back(dependent.as_str());
            }
        }
    }

    if removed != nodes.len() {
        let mut residual: Vec<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg > 0)
            .map(|(id, _)| *id)
            .collect();
        residual.sort_unstable();

        return Err(PlanRunnerError::Plan(format!(
            "cycle detected among tasks: [{}]",
            residual.join(", ")
        )));
    }

    Ok(())
}
