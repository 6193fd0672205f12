use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

use crate::fixed::{Fixed64, SimTime};
use crate::id::{ColorIndex, EdgeId, NodeId, ProductId};

/// Cosmetic product colours as `0xRRGGBB`, assigned round-robin per spawn.
pub const PRODUCT_PALETTE: [u32; 6] = [0xef4444, 0xf59e0b, 0x10b981, 0x3b82f6, 0x8b5cf6, 0xec4899];

impl ColorIndex {
    /// The palette entry for this index.
    pub fn rgb(self) -> u32 {
        PRODUCT_PALETTE[self.0 as usize % PRODUCT_PALETTE.len()]
    }
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductState {
    /// Resting at a node, waiting for that node's next step.
    AtNode,
    /// Travelling along an edge.
    Moving,
    /// Occupying a machine's work slot.
    Processing,
    /// Waiting in a node's FIFO queue.
    Queued,
    Completed,
}

/// Where a product is. Exactly one of node or edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Node(NodeId),
    Edge(EdgeId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Creation order, starting at 1. Never reused.
    pub serial: u64,
    pub color: ColorIndex,
    pub product_type: String,
    pub state: ProductState,
    pub location: Location,
    /// Fraction of the current edge travelled, in `[0, 1]`.
    pub progress: Fixed64,
    pub created_at: SimTime,
    pub completed_at: Option<SimTime>,
}

impl Product {
    pub fn node(&self) -> Option<NodeId> {
        match self.location {
            Location::Node(node) => Some(node),
            Location::Edge(_) => None,
        }
    }

    pub fn edge(&self) -> Option<EdgeId> {
        match self.location {
            Location::Edge(edge) => Some(edge),
            Location::Node(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Lifetime counters since the last init or reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCounters {
    pub created: u64,
    /// Products retired as finished work, at a sink or a terminal machine.
    pub completed: u64,
    pub completed_at_sinks: u64,
    pub dropped: u64,
    /// Sum of `completed_at - created_at` over completed products.
    pub cycle_time_total: Fixed64,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Owns every live product. Nodes refer to products by [`ProductId`] only.
///
/// Completed and dropped products are removed at once; their effect survives
/// only in [`ProductCounters`]. Each node also has an arrival inbox, filled by
/// the motion pass and drained by the node's own step.
#[derive(Debug, Clone, Default)]
pub struct ProductRegistry {
    products: SlotMap<ProductId, Product>,
    arrivals: SecondaryMap<NodeId, Vec<ProductId>>,
    counters: ProductCounters,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every product and zero the counters. Ids restart from scratch,
    /// so a cleared registry hands out the same ids as a new one.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Create a product resting at `node`.
    pub fn spawn(&mut self, node: NodeId, product_type: &str, now: SimTime) -> ProductId {
        let serial = self.counters.created + 1;
        let color = ColorIndex(((serial - 1) % PRODUCT_PALETTE.len() as u64) as u8);
        self.counters.created += 1;
        self.products.insert(Product {
            serial,
            color,
            product_type: product_type.to_owned(),
            state: ProductState::AtNode,
            location: Location::Node(node),
            progress: Fixed64::ZERO,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn get(&self, id: ProductId) -> Option<&Product> {
        self.products.get(id)
    }

    pub fn contains(&self, id: ProductId) -> bool {
        self.products.contains_key(id)
    }

    /// Live products in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ProductId, &Product)> {
        self.products.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (ProductId, &mut Product)> {
        self.products.iter_mut()
    }

    /// Number of live products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn counters(&self) -> ProductCounters {
        self.counters
    }

    /// Mean cycle time of completed products, zero if none.
    pub fn avg_cycle_time(&self) -> Fixed64 {
        if self.counters.completed == 0 {
            return Fixed64::ZERO;
        }
        self.counters.cycle_time_total / Fixed64::saturating_from_num(self.counters.completed)
    }

    /// Set the state of a product resting at a node. Returns false for
    /// unknown ids.
    pub fn set_state(&mut self, id: ProductId, state: ProductState) -> bool {
        match self.products.get_mut(id) {
            Some(p) => {
                p.state = state;
                true
            }
            None => false,
        }
    }

    /// Put a product on an edge at progress zero.
    pub fn send(&mut self, id: ProductId, edge: EdgeId) -> bool {
        match self.products.get_mut(id) {
            Some(p) => {
                p.state = ProductState::Moving;
                p.location = Location::Edge(edge);
                p.progress = Fixed64::ZERO;
                true
            }
            None => false,
        }
    }

    /// Land a product at `node` and queue it in that node's inbox.
    pub fn arrive(&mut self, id: ProductId, node: NodeId) {
        if let Some(p) = self.products.get_mut(id) {
            p.state = ProductState::AtNode;
            p.location = Location::Node(node);
            p.progress = Fixed64::ONE;
            push_arrival(&mut self.arrivals, node, id);
        }
    }

    /// Take a node's pending arrivals, oldest first.
    pub fn take_arrivals(&mut self, node: NodeId) -> Vec<ProductId> {
        self.arrivals
            .get_mut(node)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Return unhandled arrivals to the front of a node's inbox.
    pub fn restore_arrivals(&mut self, node: NodeId, mut held: Vec<ProductId>) {
        if held.is_empty() {
            return;
        }
        if let Some(existing) = self.arrivals.get_mut(node) {
            held.append(existing);
        }
        self.arrivals.insert(node, held);
    }

    /// Products waiting in a node's inbox.
    pub fn pending_arrivals(&self, node: NodeId) -> &[ProductId] {
        self.arrivals.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Retire a product as finished work. Returns its cycle time.
    pub fn complete(&mut self, id: ProductId, now: SimTime, at_sink: bool) -> Option<Fixed64> {
        let mut product = self.products.remove(id)?;
        product.state = ProductState::Completed;
        product.completed_at = Some(now);
        let cycle_time = now - product.created_at;
        self.counters.completed += 1;
        if at_sink {
            self.counters.completed_at_sinks += 1;
        }
        self.counters.cycle_time_total = self.counters.cycle_time_total.saturating_add(cycle_time);
        Some(cycle_time)
    }

    /// Retire a product as lost. Returns false for unknown ids.
    pub fn discard(&mut self, id: ProductId) -> bool {
        if self.products.remove(id).is_none() {
            return false;
        }
        self.counters.dropped += 1;
        true
    }
}

fn push_arrival(arrivals: &mut SecondaryMap<NodeId, Vec<ProductId>>, node: NodeId, id: ProductId) {
    match arrivals.get_mut(node) {
        Some(inbox) => inbox.push(id),
        None => {
            arrivals.insert(node, vec![id]);
        }
    }
}
