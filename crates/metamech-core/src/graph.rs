use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{EdgeId, NodeId, PortId};
use crate::layout::{Layout, NodeKind};
use crate::port::{PortResolver, distance, port_position};
use crate::validation::LayoutIssue;

/// Edges shorter than this (in metres) are traversed instantly.
pub const MIN_EDGE_LENGTH: f64 = 0.01;

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// Adjacency lists for a single node, in edge insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NodeAdjacency {
    inputs: Vec<EdgeId>,
    outputs: Vec<EdgeId>,
}

/// A node as seen by the running simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub name: String,
    pub kind: NodeKind,
    pub position: [f64; 3],
}

/// Resolved world-space geometry of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeGeometry {
    pub start: [f64; 3],
    pub end: [f64; 3],
    /// Distance between the two port positions, metres.
    pub length: Fixed64,
    /// True when the ports (nearly) coincide; traversal completes at once.
    pub degenerate: bool,
}

/// An edge as seen by the running simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub from: NodeId,
    pub from_port: PortId,
    pub to: NodeId,
    pub to_port: PortId,
    /// `None` when either port failed to resolve; products on such an edge
    /// do not advance.
    pub geometry: Option<EdgeGeometry>,
    /// Metres per second, set by the upstream node.
    pub travel_speed: Fixed64,
}

// ---------------------------------------------------------------------------
// FlowGraph
// ---------------------------------------------------------------------------

/// The immutable topology of one simulation run.
///
/// Keys are the host's own [`NodeId`]/[`EdgeId`] handles from the [`Layout`],
/// so snapshots and stats can be matched back to editor objects directly.
/// Only edges whose endpoints both exist are admitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowGraph {
    nodes: SecondaryMap<NodeId, NodeData>,
    edges: SecondaryMap<EdgeId, EdgeData>,
    adjacency: SecondaryMap<NodeId, NodeAdjacency>,
    /// Node stepping order.
    node_order: Vec<NodeId>,
    edge_order: Vec<EdgeId>,
}

impl FlowGraph {
    /// Resolve a layout into a runnable graph. Inconsistencies are returned
    /// alongside the graph rather than failing the build.
    pub fn build(
        layout: &Layout,
        resolver: &dyn PortResolver,
        default_travel_speed: Fixed64,
    ) -> (Self, Vec<LayoutIssue>) {
        let mut graph = FlowGraph::default();
        let mut issues = Vec::new();

        for (id, spec) in layout.nodes() {
            graph.nodes.insert(
                id,
                NodeData {
                    name: spec.name.clone(),
                    kind: spec.kind.clone(),
                    position: spec.position,
                },
            );
            graph.adjacency.insert(id, NodeAdjacency::default());
            graph.node_order.push(id);
        }

        for (edge_id, spec) in layout.edges() {
            let (Some(from), Some(to)) = (graph.nodes.get(spec.from), graph.nodes.get(spec.to))
            else {
                let missing = if graph.nodes.contains_key(spec.from) {
                    spec.to
                } else {
                    spec.from
                };
                issues.push(LayoutIssue::DanglingEdge {
                    edge: edge_id,
                    missing,
                });
                continue;
            };

            let from_port = resolver.find_port(&from.kind, &spec.from_port);
            let to_port = resolver.find_port(&to.kind, &spec.to_port);
            if from_port.is_none() {
                issues.push(LayoutIssue::UnknownPort {
                    edge: edge_id,
                    node: spec.from,
                    port: spec.from_port.clone(),
                });
            }
            if to_port.is_none() {
                issues.push(LayoutIssue::UnknownPort {
                    edge: edge_id,
                    node: spec.to,
                    port: spec.to_port.clone(),
                });
            }

            let geometry = match (from_port, to_port) {
                (Some(fp), Some(tp)) => {
                    let start = port_position(from.position, &fp);
                    let end = port_position(to.position, &tp);
                    let length = distance(start, end);
                    Some(EdgeGeometry {
                        start,
                        end,
                        length: f64_to_fixed64(length),
                        degenerate: length < MIN_EDGE_LENGTH,
                    })
                }
                _ => None,
            };

            let travel_speed = match &from.kind {
                NodeKind::Conveyor(params) => params.speed,
                _ => default_travel_speed,
            };

            graph.edges.insert(
                edge_id,
                EdgeData {
                    from: spec.from,
                    from_port: spec.from_port.clone(),
                    to: spec.to,
                    to_port: spec.to_port.clone(),
                    geometry,
                    travel_speed,
                },
            );
            graph.edge_order.push(edge_id);
            if let Some(adj) = graph.adjacency.get_mut(spec.from) {
                adj.outputs.push(edge_id);
            }
            if let Some(adj) = graph.adjacency.get_mut(spec.to) {
                adj.inputs.push(edge_id);
            }
        }

        for &node in &graph.node_order {
            let forwards = graph.nodes[node].kind.forwards();
            if forwards && graph.get_outputs(node).is_empty() {
                issues.push(LayoutIssue::NoOutputEdge { node });
            }
        }

        (graph, issues)
    }

    pub fn get_node(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes.get(node)
    }

    pub fn get_edge(&self, edge: EdgeId) -> Option<&EdgeData> {
        self.edges.get(edge)
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    /// Nodes in stepping order.
    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_order
    }

    /// Nodes with their data, in stepping order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeData)> {
        self.node_order.iter().map(|&id| (id, &self.nodes[id]))
    }

    /// Edges with their data, in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeData)> {
        self.edge_order.iter().map(|&id| (id, &self.edges[id]))
    }

    /// Edges leaving a node. Empty for unknown nodes.
    pub fn get_outputs(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.outputs.as_slice())
            .unwrap_or(&[])
    }

    /// Edges entering a node. Empty for unknown nodes.
    pub fn get_inputs(&self, node: NodeId) -> &[EdgeId] {
        self.adjacency
            .get(node)
            .map(|adj| adj.inputs.as_slice())
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_order.len()
    }
}
