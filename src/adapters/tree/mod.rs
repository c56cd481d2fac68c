//! Binary decision trees stored as flat node arenas.
//!
//! Two growers share the arena: a Newton-step regression tree used as the
//! boosting stage learner, and a weighted-gini classification tree used by
//! the forests.

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::RecoveryError;

mod classification;
mod regression;

pub use classification::{ClassificationTree, Splitter};
pub use regression::RegressionTree;

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node<L> {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf(L),
}

/// Nodes are pushed children-first, so the root is always the last node.
///
/// Deserialization enforces that layout: at least one node, and every split
/// points at earlier nodes, so a leaf lookup always terminates in bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "ArenaNodes<L>")]
struct Arena<L> {
    nodes: Vec<Node<L>>,
}

#[derive(Deserialize)]
struct ArenaNodes<L> {
    nodes: Vec<Node<L>>,
}

impl<L> TryFrom<ArenaNodes<L>> for Arena<L> {
    type Error = RecoveryError;

    fn try_from(raw: ArenaNodes<L>) -> Result<Self, Self::Error> {
        if raw.nodes.is_empty() {
            return Err(RecoveryError::Validation("tree has no nodes".into()));
        }
        for (at, node) in raw.nodes.iter().enumerate() {
            if let Node::Split { left, right, .. } = node {
                if *left >= at || *right >= at {
                    return Err(RecoveryError::Validation(format!(
                        "tree node {at} points at children {left}/{right}"
                    )));
                }
            }
        }
        Ok(Self { nodes: raw.nodes })
    }
}

impl<L> Arena<L> {
    fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    fn push(&mut self, node: Node<L>) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn leaf(&self, row: &[f64]) -> &L {
        debug_assert!(!self.nodes.is_empty(), "leaf lookup on an empty tree");
        let mut at = self.nodes.len().saturating_sub(1);
        loop {
            match &self.nodes[at] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    at = if row[*feature] <= *threshold { *left } else { *right };
                }
                Node::Leaf(value) => return value,
            }
        }
    }

    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf(_)))
            .count()
    }
}

/// Stopping rules shared by both growers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthLimits {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per node
    pub max_features: usize,
}

impl GrowthLimits {
    fn may_split(&self, n_rows: usize, depth: usize) -> bool {
        depth < self.max_depth
            && n_rows >= self.min_samples_split
            && n_rows >= 2 * self.min_samples_leaf.max(1)
    }
}

/// Features to examine at one node, drawn without replacement.
fn candidate_features<R: Rng + ?Sized>(n_features: usize, max_features: usize, rng: &mut R) -> Vec<usize> {
    if max_features == 0 || max_features >= n_features {
        (0..n_features).collect()
    } else {
        index::sample(rng, n_features, max_features).into_vec()
    }
}

/// Midpoint between two adjacent distinct values, kept strictly below `hi`.
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= hi {
        lo
    } else {
        mid
    }
}
