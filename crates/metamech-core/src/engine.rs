//! The simulation driver: owns the resolved topology, per-node state, the
//! product registry, and the clock.
//!
//! # Tick pipeline
//!
//! Each [`Engine::tick`] runs:
//! 1. **Clock** -- add `dt * speed` to simulated time
//! 2. **Stations** -- step every node once, in stepping order
//! 3. **Motion** -- advance every moving product once
//! 4. **Post-tick** -- deliver buffered events to listeners
//! 5. **Bookkeeping** -- recompute the state hash
//!
//! The station pass and the motion pass touch disjoint data: a product sent
//! onto an edge during (2) first moves in (3), and a product landing in (3)
//! is first seen by its node in the next tick's (2).

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use slotmap::{Key, SecondaryMap};

use crate::event::{EventBus, EventFilter, EventKind, PassiveListener};
use crate::fixed::{SimTime, f64_to_fixed64};
use crate::graph::FlowGraph;
use crate::id::NodeId;
use crate::layout::Layout;
use crate::motion;
use crate::port::{PortResolver, StandardPorts};
use crate::product::{Location, ProductCounters, ProductRegistry};
use crate::query::{ProductSnapshot, snapshot_products};
use crate::sim::{SimClock, StateHash, TickResult};
use crate::station::{self, StationState, StepContext};
use crate::stats::{self, AggregateStats, NodeStats};
use crate::validation::LayoutIssue;

// ---------------------------------------------------------------------------
// Config & errors
// ---------------------------------------------------------------------------

/// Engine tuning. All fields have defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound applied to every `dt` passed to [`Engine::tick`].
    /// `None` trusts the caller.
    pub max_dt: Option<f64>,
    /// Travel speed, metres per second, on edges leaving anything other than
    /// a conveyor.
    pub default_travel_speed: f64,
    /// Ring buffer capacity per event kind.
    pub event_capacity: usize,
}

impl EngineConfig {
    /// Settings for a render-loop host: `dt` capped at 0.1 s so a paused or
    /// backgrounded tab does not produce one huge jump.
    pub fn interactive() -> Self {
        Self {
            max_dt: Some(0.1),
            ..Self::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_dt: None,
            default_travel_speed: 2.0,
            event_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine has no layout; call init first")]
    NotInitialized,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A caller-owned simulation. Engines share nothing; any number may run
/// side by side.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    resolver: Box<dyn PortResolver>,

    /// `None` until the first `init`.
    graph: Option<FlowGraph>,
    issues: Vec<LayoutIssue>,

    states: SecondaryMap<NodeId, StationState>,
    products: ProductRegistry,
    clock: SimClock,

    pub event_bus: EventBus,
    last_state_hash: u64,
}

impl Engine {
    /// An engine with default config and [`StandardPorts`].
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), Box::new(StandardPorts))
    }

    pub fn with_resolver(resolver: Box<dyn PortResolver>) -> Self {
        Self::with_config(EngineConfig::default(), resolver)
    }

    pub fn with_config(config: EngineConfig, resolver: Box<dyn PortResolver>) -> Self {
        let event_bus = EventBus::new(config.event_capacity);
        Self {
            config,
            resolver,
            graph: None,
            issues: Vec::new(),
            states: SecondaryMap::new(),
            products: ProductRegistry::new(),
            clock: SimClock::new(),
            event_bus,
            last_state_hash: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Load a layout, discarding any previous run. Layout problems are
    /// logged and kept in [`Engine::layout_issues`]; they never fail init.
    pub fn init(&mut self, layout: &Layout) {
        let (graph, issues) = FlowGraph::build(
            layout,
            self.resolver.as_ref(),
            f64_to_fixed64(self.config.default_travel_speed),
        );
        for issue in &issues {
            warn!("layout: {issue}");
        }
        info!(
            "initialized flow graph: {} nodes, {} edges, {} issue(s)",
            graph.node_count(),
            graph.edge_count(),
            issues.len()
        );
        self.graph = Some(graph);
        self.issues = issues;
        self.restart();
    }

    /// Zero the clock, counters, and node state and discard every product.
    /// The topology is kept.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        if self.graph.is_none() {
            return Err(EngineError::NotInitialized);
        }
        self.restart();
        info!("simulation reset");
        Ok(())
    }

    fn restart(&mut self) {
        self.states.clear();
        if let Some(graph) = &self.graph {
            for &node in graph.node_ids() {
                self.states.insert(node, StationState::new());
            }
        }
        self.products.clear();
        self.clock = SimClock::new();
        self.event_bus.clear_all();
        self.last_state_hash = self.compute_state_hash();
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advance the simulation by `dt * speed_multiplier` simulated seconds.
    pub fn tick(&mut self, dt: f64, speed_multiplier: f64) -> Result<TickResult, EngineError> {
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;

        let mut dt = non_negative(dt);
        if let Some(max) = self.config.max_dt {
            dt = dt.min(non_negative(max));
        }
        let elapsed = f64_to_fixed64(dt * non_negative(speed_multiplier));

        self.clock.advance(elapsed);
        let now = self.clock.time;
        let mut tally = TickResult {
            elapsed,
            ..TickResult::default()
        };

        for (node, data) in graph.nodes() {
            let Some(state) = self.states.get_mut(node) else {
                debug!("node {node:?} has no runtime state; skipped");
                continue;
            };
            let mut ctx = StepContext {
                node,
                outputs: graph.get_outputs(node),
                now,
                elapsed,
                products: &mut self.products,
                events: &mut self.event_bus,
                tally: &mut tally,
            };
            station::step(&data.kind, state, &mut ctx);
        }

        motion::advance(
            graph,
            &mut self.products,
            elapsed,
            now,
            &mut self.event_bus,
            &mut tally,
        );

        self.event_bus.deliver();
        self.last_state_hash = self.compute_state_hash();
        Ok(tally)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    /// Register a listener, called after each tick with that tick's events.
    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) {
        self.event_bus.on_passive(kind, listener);
    }

    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        filter: EventFilter,
        listener: PassiveListener,
    ) {
        self.event_bus.on_passive_filtered(kind, Some(filter), listener);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn sim_time(&self) -> SimTime {
        self.clock.time
    }

    pub fn tick_count(&self) -> u64 {
        self.clock.ticks
    }

    pub fn layout_issues(&self) -> &[LayoutIssue] {
        &self.issues
    }

    pub fn graph(&self) -> Option<&FlowGraph> {
        self.graph.as_ref()
    }

    pub fn station(&self, node: NodeId) -> Option<&StationState> {
        self.states.get(node)
    }

    pub fn product_registry(&self) -> &ProductRegistry {
        &self.products
    }

    pub fn product_counters(&self) -> ProductCounters {
        self.products.counters()
    }

    /// Every live product, in registry order.
    pub fn products(&self) -> Result<Vec<ProductSnapshot>, EngineError> {
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(snapshot_products(graph, &self.products))
    }

    /// Stats for every node, in stepping order.
    pub fn node_stats(&self) -> Result<Vec<(NodeId, NodeStats)>, EngineError> {
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(graph
            .node_ids()
            .iter()
            .filter_map(|&id| stats::node_stats(graph, &self.states, id).map(|s| (id, s)))
            .collect())
    }

    /// Stats for one node. `Ok(None)` if the node is not in the layout.
    pub fn node_stats_of(&self, node: NodeId) -> Result<Option<NodeStats>, EngineError> {
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(stats::node_stats(graph, &self.states, node))
    }

    pub fn aggregate_stats(&self) -> Result<AggregateStats, EngineError> {
        let graph = self.graph.as_ref().ok_or(EngineError::NotInitialized)?;
        Ok(stats::aggregate(
            graph,
            &self.states,
            &self.products,
            self.clock.time,
        ))
    }

    // -----------------------------------------------------------------------
    // State hash
    // -----------------------------------------------------------------------

    /// Hash of the state after the most recent tick, init, or reset.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    fn compute_state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        hasher.write_u64(self.clock.ticks);
        hasher.write_fixed64(self.clock.time);

        if let Some(graph) = &self.graph {
            for &node in graph.node_ids() {
                let Some(state) = self.states.get(node) else {
                    continue;
                };
                hasher.write_u64(state.throughput);
                hasher.write_fixed64(state.busy_time);
                hasher.write_u64(state.queue.len() as u64);
                for &product in &state.queue {
                    hasher.write_u64(product.data().as_ffi());
                }
                if let Some(job) = state.in_process {
                    hasher.write_u64(job.product.data().as_ffi());
                    hasher.write_fixed64(job.finish_at);
                }
                hasher.write_u64(state.router_index);
                hasher.write_u32(state.batch_count);
                hasher.write_u64(state.emitted);
                hasher.write_u64(state.dropped);
            }
        }

        for (id, product) in self.products.iter() {
            hasher.write_u64(id.data().as_ffi());
            hasher.write_u64(product.serial);
            hasher.write_u32(product.state as u32);
            match product.location {
                Location::Node(node) => {
                    hasher.write_u32(0);
                    hasher.write_u64(node.data().as_ffi());
                }
                Location::Edge(edge) => {
                    hasher.write_u32(1);
                    hasher.write_u64(edge.data().as_ffi());
                }
            }
            hasher.write_fixed64(product.progress);
        }

        let counters = self.products.counters();
        hasher.write_u64(counters.created);
        hasher.write_u64(counters.completed);
        hasher.write_u64(counters.dropped);
        hasher.finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// NaN and negatives become zero.
fn non_negative(v: f64) -> f64 {
    if v.is_nan() || v < 0.0 { 0.0 } else { v }
}
