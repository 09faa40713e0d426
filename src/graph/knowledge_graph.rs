use petgraph::algo::{all_simple_paths, astar, connected_components};
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Ordering;
use std::collections::HashMap;

use super::{CentralNode, EdgeExport, GraphExport, GraphPath, GraphStats, NodeExport};
use crate::triple::Triple;

/// Directed knowledge graph built from triples
///
/// ```
/// use triplegraph::{KnowledgeGraph, Triple};
///
/// let kg = KnowledgeGraph::build(&[
///     Triple::new("Einstein", "won", "Nobel Prize"),
///     Triple::new("Nobel Prize", "awarded in", "1921"),
/// ]);
/// assert_eq!(kg.node_count(), 3);
/// assert_eq!(kg.find_paths("Einstein", "1921").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    graph: DiGraph<String, String>,
    index: HashMap<String, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from triples
    pub fn build(triples: &[Triple]) -> Self {
        let mut kg = Self::new();
        for triple in triples {
            kg.add_triple(triple);
        }
        kg
    }

    /// Add one triple. A repeated (subject, object) pair replaces the edge label.
    pub fn add_triple(&mut self, triple: &Triple) {
        let s = self.node(&triple.subject);
        let o = self.node(&triple.object);
        self.graph.update_edge(s, o, triple.predicate.clone());
    }

    fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Predicate on the edge `source -> target`, if any
    pub fn edge_label(&self, source: &str, target: &str) -> Option<&str> {
        let s = *self.index.get(source)?;
        let t = *self.index.get(target)?;
        let edge = self.graph.find_edge(s, t)?;
        Some(self.graph[edge].as_str())
    }

    fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
            + self.graph.edges_directed(node, Direction::Incoming).count()
    }

    /// Node/edge counts, weak components, average degree and density
    pub fn stats(&self) -> GraphStats {
        let n = self.graph.node_count();
        let e = self.graph.edge_count();
        let total_degree: usize = self.graph.node_indices().map(|i| self.degree(i)).sum();

        let density = if n > 1 {
            e as f64 / (n * (n - 1)) as f64
        } else {
            0.0
        };

        GraphStats {
            num_nodes: n,
            num_edges: e,
            num_connected_components: connected_components(&self.graph),
            avg_degree: total_degree as f64 / n.max(1) as f64,
            density,
        }
    }

    /// Top `top_n` nodes by degree centrality, highest first
    ///
    /// Centrality is (in + out) / (n - 1); a lone node scores 1.0. Ties keep
    /// insertion order.
    pub fn central_nodes(&self, top_n: usize) -> Vec<CentralNode> {
        let n = self.graph.node_count();
        if n == 0 {
            return Vec::new();
        }

        let scale = if n > 1 { 1.0 / (n - 1) as f64 } else { 1.0 };
        let mut nodes: Vec<CentralNode> = self
            .graph
            .node_indices()
            .map(|i| CentralNode {
                name: self.graph[i].clone(),
                score: if n > 1 { self.degree(i) as f64 * scale } else { 1.0 },
            })
            .collect();

        nodes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        nodes.truncate(top_n);
        nodes
    }

    /// Every simple directed path from `source` to `target`
    ///
    /// Unknown endpoints and `source == target` give no paths.
    pub fn find_paths(&self, source: &str, target: &str) -> Vec<Vec<String>> {
        let (Some(&s), Some(&t)) = (self.index.get(source), self.index.get(target)) else {
            return Vec::new();
        };
        if s == t {
            return Vec::new();
        }

        all_simple_paths::<Vec<NodeIndex>, _>(&self.graph, s, t, 0, None)
            .map(|path| path.into_iter().map(|i| self.graph[i].clone()).collect())
            .collect()
    }

    /// Fewest-hop directed path with its edge labels
    ///
    /// # Arguments
    ///
    /// * `source` - Start entity name
    /// * `target` - End entity name
    ///
    /// # Returns
    ///
    /// The path, or None when either endpoint is unknown or unreachable
    pub fn shortest_path(&self, source: &str, target: &str) -> Option<GraphPath> {
        let s = *self.index.get(source)?;
        let t = *self.index.get(target)?;

        let (_, path) = astar(&self.graph, s, |n| n == t, |_| 1usize, |_| 0usize)?;

        let relationships = path
            .windows(2)
            .filter_map(|pair| self.graph.find_edge(pair[0], pair[1]))
            .map(|edge| self.graph[edge].clone())
            .collect();

        Some(GraphPath {
            nodes: path.into_iter().map(|i| self.graph[i].clone()).collect(),
            relationships,
        })
    }

    /// Node and edge lists in insertion order
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .graph
            .node_indices()
            .map(|i| NodeExport {
                id: self.graph[i].clone(),
            })
            .collect();

        let edges = self
            .graph
            .edge_references()
            .map(|edge| EdgeExport {
                source: self.graph[edge.source()].clone(),
                target: self.graph[edge.target()].clone(),
                label: edge.weight().clone(),
            })
            .collect();

        GraphExport { nodes, edges }
    }

    /// Graphviz DOT rendering with predicates as edge labels
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}
