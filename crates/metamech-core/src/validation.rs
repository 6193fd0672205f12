//! Layout consistency checks.
//!
//! None of these are fatal: the engine runs any layout, skipping what it
//! cannot resolve. [`validate_layout`] lets an editor surface the same
//! findings before a run starts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::graph::FlowGraph;
use crate::id::{EdgeId, NodeId, PortId};
use crate::layout::Layout;
use crate::port::PortResolver;

/// A topology inconsistency found while resolving a layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayoutIssue {
    /// An edge references a node that is not in the layout. The edge is
    /// ignored.
    DanglingEdge { edge: EdgeId, missing: NodeId },
    /// An edge names a port its node does not expose. Products sent onto the
    /// edge stay at progress zero.
    UnknownPort {
        edge: EdgeId,
        node: NodeId,
        port: PortId,
    },
    /// A stage that hands products on has nowhere to send them.
    NoOutputEdge { node: NodeId },
}

impl fmt::Display for LayoutIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutIssue::DanglingEdge { edge, missing } => {
                write!(f, "edge {edge:?} references missing node {missing:?}")
            }
            LayoutIssue::UnknownPort { edge, node, port } => {
                write!(f, "edge {edge:?} uses unknown port `{port}` on node {node:?}")
            }
            LayoutIssue::NoOutputEdge { node } => {
                write!(f, "node {node:?} has no output edge")
            }
        }
    }
}

/// Resolve a layout without running it and report every issue found.
pub fn validate_layout(layout: &Layout, resolver: &dyn PortResolver) -> Vec<LayoutIssue> {
    let (_, issues) = FlowGraph::build(layout, resolver, Fixed64::ONE);
    issues
}
