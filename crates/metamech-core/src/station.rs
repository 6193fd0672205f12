//! Per-node runtime state and the step rule of every stage kind.
//!
//! Each node owns one [`StationState`]. During a tick the engine calls
//! [`step`] once per node in stepping order, handing it a [`StepContext`]
//! with shared access to the product registry and the event bus. A step
//! only ever mutates its own node's state.
//!
//! Arrivals are the products that the motion pass landed at this node since
//! its last step, in landing order. Products a step cannot place (no output
//! edge, or a full buffer under [`OverflowPolicy::Hold`]) go back to the
//! node's inbox and are offered again on the next step.

use std::collections::VecDeque;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, SimTime, checked_div_64};
use crate::id::{EdgeId, NodeId, ProductId};
use crate::layout::{
    BufferParams, MachineParams, NodeKind, OverflowPolicy, PalletizerParams, SourceParams,
};
use crate::product::{ProductRegistry, ProductState};
use crate::sim::TickResult;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The product occupying a machine's work slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProcess {
    pub product: ProductId,
    pub finish_at: SimTime,
}

/// Runtime state of one node. Fields a kind does not use stay at default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StationState {
    /// Products (or pallets, for palletizers) this node has handled.
    pub throughput: u64,
    pub busy_time: Fixed64,
    /// Simulated time this node has existed for, i.e. the clock at its last
    /// step.
    pub elapsed_time: Fixed64,
    pub queue: VecDeque<ProductId>,
    pub in_process: Option<InProcess>,
    /// Router: next output slot, taken modulo the output count.
    pub router_index: u64,
    /// Palletizer: products counted toward the next pallet.
    pub batch_count: u32,
    /// Source: time of the last emission.
    pub last_spawn: Option<SimTime>,
    /// Source: products emitted so far.
    pub emitted: u64,
    /// Buffer: arrivals discarded on overflow.
    pub dropped: u64,
}

impl StationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `busy_time / elapsed_time`, clamped to `[0, 1]`; zero before any time
    /// has passed.
    pub fn utilization(&self) -> Fixed64 {
        checked_div_64(self.busy_time, self.elapsed_time)
            .map(crate::fixed::clamp_unit)
            .unwrap_or(Fixed64::ZERO)
    }

    pub fn is_processing(&self) -> bool {
        self.in_process.is_some()
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a node's step may read or touch besides its own state.
pub struct StepContext<'a> {
    pub node: NodeId,
    /// The node's output edges in connection order.
    pub outputs: &'a [EdgeId],
    pub now: SimTime,
    /// Simulated seconds covered by this tick.
    pub elapsed: Fixed64,
    pub products: &'a mut ProductRegistry,
    pub events: &'a mut EventBus,
    pub tally: &'a mut TickResult,
}

impl StepContext<'_> {
    fn first_output(&self) -> Option<EdgeId> {
        self.outputs.first().copied()
    }

    fn send(&mut self, product: ProductId, edge: EdgeId) {
        if !self.products.send(product, edge) {
            debug!("node {:?}: product {:?} vanished before forwarding", self.node, product);
        }
    }

    fn complete(&mut self, product: ProductId, at_sink: bool) {
        if let Some(cycle_time) = self.products.complete(product, self.now, at_sink) {
            self.tally.completed += 1;
            self.events.emit(Event::ProductCompleted {
                product,
                node: self.node,
                cycle_time,
                time: self.now,
            });
        }
    }

    fn enqueue(&mut self, state: &mut StationState, product: ProductId) {
        self.products.set_state(product, ProductState::Queued);
        state.queue.push_back(product);
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one node's rule for the current tick.
pub fn step(kind: &NodeKind, state: &mut StationState, ctx: &mut StepContext<'_>) {
    state.elapsed_time = ctx.now;
    match kind {
        NodeKind::Source(params) => step_source(params, state, ctx),
        NodeKind::Sink => step_sink(state, ctx),
        NodeKind::Conveyor(_) => step_conveyor(state, ctx),
        NodeKind::Buffer(params) => step_buffer(params, state, ctx),
        NodeKind::Machine(params) | NodeKind::PickAndPlace(params) => {
            step_machine(params, state, ctx)
        }
        NodeKind::Router => step_router(state, ctx),
        NodeKind::Palletizer(params) => step_palletizer(params, state, ctx),
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

fn step_source(params: &SourceParams, state: &mut StationState, ctx: &mut StepContext<'_>) {
    if params
        .max_items
        .is_some_and(|max| state.emitted >= u64::from(max))
    {
        return;
    }
    let Some(edge) = ctx.first_output() else {
        trace!("source {:?}: no output edge", ctx.node);
        return;
    };
    let Some(interval) = checked_div_64(Fixed64::from_num(60), params.spawn_rate) else {
        return;
    };
    let due = match state.last_spawn {
        None => true,
        Some(last) => ctx.now - last >= interval,
    };
    if !due {
        return;
    }

    let product = ctx.products.spawn(ctx.node, &params.product_type, ctx.now);
    ctx.send(product, edge);
    state.last_spawn = Some(ctx.now);
    state.emitted += 1;
    state.throughput += 1;
    ctx.tally.spawned += 1;
    ctx.events.emit(Event::ProductSpawned {
        product,
        node: ctx.node,
        time: ctx.now,
    });
}

fn step_sink(state: &mut StationState, ctx: &mut StepContext<'_>) {
    for product in ctx.products.take_arrivals(ctx.node) {
        ctx.complete(product, true);
        state.throughput += 1;
    }
}

fn step_conveyor(state: &mut StationState, ctx: &mut StepContext<'_>) {
    let arrivals = ctx.products.take_arrivals(ctx.node);
    if arrivals.is_empty() {
        return;
    }
    state.busy_time = state.busy_time.saturating_add(ctx.elapsed);
    let Some(edge) = ctx.first_output() else {
        debug!("conveyor {:?}: no output edge, {} product(s) waiting", ctx.node, arrivals.len());
        ctx.products.restore_arrivals(ctx.node, arrivals);
        return;
    };
    for product in arrivals {
        ctx.send(product, edge);
        state.throughput += 1;
    }
}

fn step_buffer(params: &BufferParams, state: &mut StationState, ctx: &mut StepContext<'_>) {
    let mut held = Vec::new();
    for product in ctx.products.take_arrivals(ctx.node) {
        if state.queue.len() < params.capacity as usize {
            ctx.enqueue(state, product);
            continue;
        }
        match params.overflow {
            OverflowPolicy::Drop => {
                if ctx.products.discard(product) {
                    state.dropped += 1;
                    ctx.tally.dropped += 1;
                    ctx.events.emit(Event::ProductDropped {
                        product,
                        node: ctx.node,
                        time: ctx.now,
                    });
                }
            }
            OverflowPolicy::Hold => held.push(product),
        }
    }
    ctx.products.restore_arrivals(ctx.node, held);

    if state.queue.is_empty() {
        return;
    }
    let Some(edge) = ctx.first_output() else {
        return;
    };
    if let Some(product) = state.queue.pop_front() {
        ctx.send(product, edge);
        state.throughput += 1;
    }
}

fn step_machine(params: &MachineParams, state: &mut StationState, ctx: &mut StepContext<'_>) {
    if let Some(job) = state.in_process
        && ctx.now >= job.finish_at
    {
        ctx.events.emit(Event::ProcessingFinished {
            product: job.product,
            node: ctx.node,
            time: ctx.now,
        });
        match ctx.first_output() {
            Some(edge) => ctx.send(job.product, edge),
            None => ctx.complete(job.product, false),
        }
        state.in_process = None;
        state.throughput += 1;
    }

    if state.in_process.is_none()
        && let Some(product) = state.queue.pop_front()
    {
        ctx.products.set_state(product, ProductState::Processing);
        state.in_process = Some(InProcess {
            product,
            finish_at: ctx.now.saturating_add(params.processing_time),
        });
        ctx.events.emit(Event::ProcessingStarted {
            product,
            node: ctx.node,
            time: ctx.now,
        });
    }

    if state.in_process.is_some() {
        state.busy_time = state.busy_time.saturating_add(ctx.elapsed);
    }

    for product in ctx.products.take_arrivals(ctx.node) {
        ctx.enqueue(state, product);
    }
}

fn step_router(state: &mut StationState, ctx: &mut StepContext<'_>) {
    let arrivals = ctx.products.take_arrivals(ctx.node);
    if ctx.outputs.is_empty() {
        if !arrivals.is_empty() {
            debug!("router {:?}: no output edges, {} product(s) waiting", ctx.node, arrivals.len());
        }
        ctx.products.restore_arrivals(ctx.node, arrivals);
        return;
    }
    for product in arrivals {
        let slot = (state.router_index % ctx.outputs.len() as u64) as usize;
        let edge = ctx.outputs[slot];
        ctx.send(product, edge);
        state.router_index += 1;
        state.throughput += 1;
    }
}

fn step_palletizer(params: &PalletizerParams, state: &mut StationState, ctx: &mut StepContext<'_>) {
    for product in ctx.products.take_arrivals(ctx.node) {
        ctx.enqueue(state, product);
        state.batch_count += 1;
    }

    let batch_size = params.batch_size.max(1);
    if state.batch_count >= batch_size {
        if let Some(edge) = ctx.first_output() {
            let mut released = 0;
            while released < batch_size {
                let Some(product) = state.queue.pop_front() else {
                    break;
                };
                ctx.send(product, edge);
                released += 1;
            }
            state.batch_count -= batch_size;
            state.throughput += 1;
            ctx.events.emit(Event::PalletReleased {
                node: ctx.node,
                count: released,
                time: ctx.now,
            });
        } else {
            trace!("palletizer {:?}: batch ready but no output edge", ctx.node);
        }
    }

    if !state.queue.is_empty() {
        state.busy_time = state.busy_time.saturating_add(ctx.elapsed);
    }
}
