//! In-memory knowledge graph: triples become a directed petgraph graph.
//!
//! Entities are nodes keyed by their exact text; each (subject, object)
//! pair holds one edge labelled with the predicate.

mod knowledge_graph;

pub use knowledge_graph::KnowledgeGraph;

use serde::{Deserialize, Serialize};

/// Summary numbers for a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub num_edges: usize,
    /// Weakly connected components (edge direction ignored)
    pub num_connected_components: usize,
    /// Mean of in-degree + out-degree
    pub avg_degree: f64,
    /// Edges over possible directed edges, n * (n - 1)
    pub density: f64,
}

/// A node with its degree centrality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralNode {
    pub name: String,
    pub score: f64,
}

/// A directed path: `relationships[i]` labels the hop `nodes[i] -> nodes[i + 1]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPath {
    pub nodes: Vec<String>,
    pub relationships: Vec<String>,
}

/// Node entry in [`GraphExport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeExport {
    pub id: String,
}

/// Edge entry in [`GraphExport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeExport {
    pub source: String,
    pub target: String,
    pub label: String,
}

/// Plain node/edge lists, the JSON shape handed to front ends
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}
