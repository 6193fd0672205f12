//! Live statistics computed on demand from station state and the product
//! registry. Nothing here is cached; every call reflects the current tick.

use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use crate::fixed::{Fixed64, SimTime, checked_div_64, clamp_unit};
use crate::graph::FlowGraph;
use crate::id::{NodeId, ProductId};
use crate::layout::NodeKind;
use crate::product::ProductRegistry;
use crate::station::StationState;

/// Per-node view for overlays and tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub name: String,
    /// The editor type tag (`"machine"`, `"buffer"`, ...).
    pub kind: String,
    pub throughput: u64,
    /// Busy fraction of elapsed time, in `[0, 1]`.
    pub utilization: Fixed64,
    pub queue_length: usize,
    pub processing: bool,
    pub current_product: Option<ProductId>,
    pub busy_time: Fixed64,
    pub elapsed_time: Fixed64,
    pub dropped: u64,
}

/// Line-wide figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Products completed at sinks.
    pub throughput_total: u64,
    pub throughput_per_minute: Fixed64,
    /// Mean seconds from spawn to completion.
    pub avg_cycle_time: Fixed64,
    /// Utilization of every node, in stepping order.
    pub utilization: Vec<(NodeId, Fixed64)>,
    /// The most utilized machine or pick-and-place cell. Ties go to the
    /// earliest node in stepping order.
    pub bottleneck: Option<NodeId>,
    /// Fill level (`queue / capacity`) of each buffer.
    pub buffer_levels: Vec<(NodeId, Fixed64)>,
    pub sim_time: SimTime,
    /// Products currently alive.
    pub product_count: usize,
    pub products_created: u64,
    pub products_completed: u64,
    pub products_dropped: u64,
}

impl AggregateStats {
    pub fn utilization_of(&self, node: NodeId) -> Option<Fixed64> {
        self.utilization
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, u)| *u)
    }

    pub fn buffer_level_of(&self, node: NodeId) -> Option<Fixed64> {
        self.buffer_levels
            .iter()
            .find(|(id, _)| *id == node)
            .map(|(_, l)| *l)
    }
}

/// Snapshot one node. `None` if the node has no state.
pub fn node_stats(
    graph: &FlowGraph,
    states: &SecondaryMap<NodeId, StationState>,
    node: NodeId,
) -> Option<NodeStats> {
    let data = graph.get_node(node)?;
    let state = states.get(node)?;
    Some(NodeStats {
        name: data.name.clone(),
        kind: data.kind.tag().to_owned(),
        throughput: state.throughput,
        utilization: state.utilization(),
        queue_length: state.queue.len(),
        processing: state.is_processing(),
        current_product: state.in_process.map(|job| job.product),
        busy_time: state.busy_time,
        elapsed_time: state.elapsed_time,
        dropped: state.dropped,
    })
}

/// Compute the line-wide figures.
pub fn aggregate(
    graph: &FlowGraph,
    states: &SecondaryMap<NodeId, StationState>,
    products: &ProductRegistry,
    sim_time: SimTime,
) -> AggregateStats {
    let mut stats = AggregateStats {
        sim_time,
        avg_cycle_time: products.avg_cycle_time(),
        product_count: products.len(),
        ..AggregateStats::default()
    };
    let counters = products.counters();
    stats.products_created = counters.created;
    stats.products_completed = counters.completed;
    stats.products_dropped = counters.dropped;

    let mut best: Option<(NodeId, Fixed64)> = None;
    for (id, data) in graph.nodes() {
        let Some(state) = states.get(id) else {
            continue;
        };
        let utilization = state.utilization();
        stats.utilization.push((id, utilization));

        match &data.kind {
            NodeKind::Sink => stats.throughput_total += state.throughput,
            NodeKind::Buffer(params) => {
                let level = checked_div_64(
                    Fixed64::saturating_from_num(state.queue.len()),
                    Fixed64::saturating_from_num(params.capacity),
                )
                .map(clamp_unit)
                .unwrap_or(Fixed64::ZERO);
                stats.buffer_levels.push((id, level));
            }
            _ => {}
        }

        if data.kind.is_processing() && best.is_none_or(|(_, u)| utilization > u) {
            best = Some((id, utilization));
        }
    }
    stats.bottleneck = best.map(|(id, _)| id);

    stats.throughput_per_minute = checked_div_64(
        Fixed64::saturating_from_num(stats.throughput_total).saturating_mul(Fixed64::from_num(60)),
        sim_time,
    )
    .unwrap_or(Fixed64::ZERO);

    stats
}
