//! Dependency graph and graph validation
//!
//! Blocks form a graph through their input references. The runtime never
//! walks this graph on its own (re-running is always explicit), but callers
//! use it to find blocks made stale by a run, to order a full refresh, and to
//! report dangling references and cycles before running anything.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::core::block::Block;
use crate::core::BlockId;

// ── Result types ────────────────────────────────────────────────────────────

/// A single validation finding with optional location and suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Block where the problem was found (if applicable).
    pub block_id: Option<BlockId>,
    /// Human-readable description.
    pub message: String,
    /// Optional suggestion for how to fix it.
    pub suggestion: Option<String>,
}

/// Overall validation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl GraphValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn add_error(&mut self, block_id: Option<BlockId>, message: impl Into<String>, suggestion: Option<&str>) {
        self.valid = false;
        self.errors.push(ValidationIssue {
            block_id,
            message: message.into(),
            suggestion: suggestion.map(|s| s.to_string()),
        });
    }

    fn add_warning(&mut self, block_id: Option<BlockId>, message: impl Into<String>, suggestion: Option<&str>) {
        self.warnings.push(ValidationIssue {
            block_id,
            message: message.into(),
            suggestion: suggestion.map(|s| s.to_string()),
        });
    }
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// A data edge: `to` reads `variable` from `from`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub variable: String,
}

/// Snapshot of the block dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Blocks in document order.
    nodes: Vec<BlockId>,
    /// Edges whose source block exists.
    edges: Vec<Edge>,
    /// Inputs whose source block does not exist: (consumer, source, variable).
    dangling: Vec<(BlockId, BlockId, String)>,
    /// Outputs currently declared by each block.
    outputs: HashMap<BlockId, HashSet<String>>,
}

impl DependencyGraph {
    /// Build the graph from blocks in document order.
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let nodes: Vec<BlockId> = blocks.iter().map(|b| b.id).collect();
        let known: HashSet<BlockId> = nodes.iter().copied().collect();
        let outputs = blocks
            .iter()
            .map(|b| (b.id, b.outputs.iter().map(|v| v.name.clone()).collect()))
            .collect();

        let mut edges = Vec::new();
        let mut dangling = Vec::new();
        for block in blocks {
            for input in &block.inputs {
                if known.contains(&input.source) {
                    edges.push(Edge {
                        from: input.source,
                        to: block.id,
                        variable: input.name.clone(),
                    });
                } else {
                    dangling.push((block.id, input.source, input.name.clone()));
                }
            }
        }

        Self {
            nodes,
            edges,
            dangling,
            outputs,
        }
    }

    /// All edges.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Blocks `id` reads from directly.
    pub fn upstream(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        for edge in self.edges.iter().filter(|e| e.to == id) {
            if !out.contains(&edge.from) {
                out.push(edge.from);
            }
        }
        out
    }

    /// Blocks reading from `id` directly.
    pub fn downstream(&self, id: BlockId) -> Vec<BlockId> {
        let mut out = Vec::new();
        for edge in self.edges.iter().filter(|e| e.from == id) {
            if !out.contains(&edge.to) {
                out.push(edge.to);
            }
        }
        out
    }

    /// Every block that transitively reads from `id`, nearest first.
    /// These are the blocks whose results are stale after `id` re-runs.
    pub fn dependents(&self, id: BlockId) -> Vec<BlockId> {
        let mut seen = HashSet::from([id]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(node) = queue.pop_front() {
            for next in self.downstream(node) {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }

    /// Topological order (Kahn's algorithm), ties broken by document order.
    ///
    /// Returns `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<BlockId>> {
        let (order, _) = self.kahn();
        if order.len() == self.nodes.len() {
            Some(order)
        } else {
            None
        }
    }

    /// Blocks involved in (or downstream of) a cycle, in document order.
    pub fn cyclic_blocks(&self) -> Vec<BlockId> {
        let (_, in_degree) = self.kahn();
        self.nodes
            .iter()
            .filter(|id| in_degree.get(*id).copied().unwrap_or(0) > 0)
            .copied()
            .collect()
    }

    fn kahn(&self) -> (Vec<BlockId>, HashMap<BlockId, usize>) {
        let mut in_degree: HashMap<BlockId, usize> = self.nodes.iter().map(|&id| (id, 0)).collect();
        let mut adj: HashMap<BlockId, Vec<BlockId>> = HashMap::new();

        let mut seen_pairs = HashSet::new();
        for edge in &self.edges {
            if seen_pairs.insert((edge.from, edge.to)) {
                adj.entry(edge.from).or_default().push(edge.to);
                *in_degree.entry(edge.to).or_default() += 1;
            }
        }

        let mut queue: VecDeque<BlockId> = self
            .nodes
            .iter()
            .filter(|id| in_degree[*id] == 0)
            .copied()
            .collect();

        let mut order = Vec::new();
        while let Some(node) = queue.pop_front() {
            order.push(node);
            if let Some(neighbors) = adj.get(&node) {
                for neighbor in neighbors {
                    if let Some(deg) = in_degree.get_mut(neighbor) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(*neighbor);
                        }
                    }
                }
            }
        }

        (order, in_degree)
    }

    /// Report dangling references, self-references, cycles, and inputs naming
    /// outputs their source does not (yet) declare.
    pub fn validate(&self) -> GraphValidationResult {
        let mut result = GraphValidationResult::ok();

        for (block, source, variable) in &self.dangling {
            result.add_error(
                Some(*block),
                format!("Input '{}' references missing block {}", variable, source),
                Some("Rewire the input or remove it"),
            );
        }

        for edge in &self.edges {
            if edge.from == edge.to {
                result.add_error(
                    Some(edge.to),
                    format!("Input '{}' reads from its own block", edge.variable),
                    Some("A block cannot consume its own outputs"),
                );
            } else if !self
                .outputs
                .get(&edge.from)
                .is_some_and(|names| names.contains(&edge.variable))
            {
                result.add_warning(
                    Some(edge.to),
                    format!(
                        "Input '{}' is not declared by block {}",
                        edge.variable, edge.from
                    ),
                    Some("Run the upstream block so its outputs are known"),
                );
            }
        }

        let cyclic = self.cyclic_blocks();
        if !cyclic.is_empty() {
            let ids: Vec<String> = cyclic.iter().map(|id| id.to_string()).collect();
            result.add_error(
                None,
                format!("Graph contains a cycle involving blocks: [{}]", ids.join(", ")),
                Some("Remove an input to break the cycle"),
            );
        }

        result
    }
}
