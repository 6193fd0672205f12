//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::engine::Engine;
use crate::fixed::Fixed64;
use crate::id::NodeId;
use crate::layout::*;
use crate::port::STATION_LENGTH;

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Node kinds
// ===========================================================================

/// A source emitting `per_minute` products per simulated minute.
pub fn source(per_minute: f64) -> NodeKind {
    NodeKind::Source(SourceParams {
        spawn_rate: fixed(per_minute),
        ..SourceParams::default()
    })
}

/// A source that stops after `max` products.
pub fn limited_source(per_minute: f64, max: u32) -> NodeKind {
    NodeKind::Source(SourceParams {
        spawn_rate: fixed(per_minute),
        max_items: Some(max),
        ..SourceParams::default()
    })
}

pub fn machine(seconds: f64) -> NodeKind {
    NodeKind::Machine(MachineParams {
        processing_time: fixed(seconds),
    })
}

pub fn pick_and_place(seconds: f64) -> NodeKind {
    NodeKind::PickAndPlace(MachineParams {
        processing_time: fixed(seconds),
    })
}

pub fn buffer(capacity: u32) -> NodeKind {
    NodeKind::Buffer(BufferParams {
        capacity,
        overflow: OverflowPolicy::Drop,
    })
}

pub fn holding_buffer(capacity: u32) -> NodeKind {
    NodeKind::Buffer(BufferParams {
        capacity,
        overflow: OverflowPolicy::Hold,
    })
}

pub fn conveyor(speed: f64, length: f64) -> NodeKind {
    NodeKind::Conveyor(ConveyorParams {
        speed: fixed(speed),
        length,
    })
}

pub fn palletizer(batch_size: u32) -> NodeKind {
    NodeKind::Palletizer(PalletizerParams { batch_size })
}

// ===========================================================================
// Layouts
// ===========================================================================

fn footprint(kind: &NodeKind) -> f64 {
    match kind {
        NodeKind::Conveyor(params) => params.length,
        _ => STATION_LENGTH,
    }
}

/// Lay `kinds` out along +X, each linked to the next, leaving `gap` metres
/// between one node's output port and the next node's input port. Routers
/// feed forward through their center output.
pub fn spaced_line(kinds: &[NodeKind], gap: f64) -> (Layout, Vec<NodeId>) {
    let mut layout = Layout::new();
    let mut ids = Vec::with_capacity(kinds.len());
    let mut x = 0.0;
    let mut prev_half: Option<f64> = None;

    for (i, kind) in kinds.iter().enumerate() {
        let half = footprint(kind) / 2.0;
        if let Some(prev) = prev_half {
            x += prev + gap + half;
        }
        let id = layout.add_node(NodeSpec::new(format!("{}-{i}", kind.tag()), kind.clone()).at([x, 0.0, 0.0]));
        if let Some(&prev) = ids.last() {
            let from_port = match kinds[i - 1] {
                NodeKind::Router => "output-center",
                _ => "output",
            };
            layout.connect(prev, from_port, id, "input");
        }
        ids.push(id);
        prev_half = Some(half);
    }
    (layout, ids)
}

/// A line of touching stations: every edge is traversed instantly.
pub fn line(kinds: &[NodeKind]) -> (Layout, Vec<NodeId>) {
    spaced_line(kinds, 0.0)
}

/// A source feeding a router that fans out to `outputs` sinks, all touching.
/// Returns `(layout, source, router, sinks)`.
pub fn fan_out(per_minute: f64, outputs: usize) -> (Layout, NodeId, NodeId, Vec<NodeId>) {
    let mut layout = Layout::new();
    let src = layout.add_node(NodeSpec::new("src", source(per_minute)).at([0.0, 0.0, 0.0]));
    let router = layout.add_node(NodeSpec::new("router", NodeKind::Router).at([1.0, 0.0, 0.0]));
    layout.link(src, router);

    let ports = ["output-center", "output-left", "output-right"];
    let offsets = [[2.0, 0.0, 0.0], [1.5, 0.0, -0.5], [1.5, 0.0, 0.5]];
    let sinks = (0..outputs.min(ports.len()))
        .map(|i| {
            let sink = layout.add_node(NodeSpec::new(format!("sink-{i}"), NodeKind::Sink).at(offsets[i]));
            layout.connect(router, ports[i], sink, "input");
            sink
        })
        .collect();
    (layout, src, router, sinks)
}

// ===========================================================================
// Driving
// ===========================================================================

/// An initialized engine for `layout` with default config.
pub fn engine_for(layout: &Layout) -> Engine {
    let mut engine = Engine::new();
    engine.init(layout);
    engine
}

/// Tick `n` times at speed 1.
pub fn run(engine: &mut Engine, dt: f64, n: usize) {
    for _ in 0..n {
        if engine.tick(dt, 1.0).is_err() {
            panic!("run() on an engine without a layout");
        }
    }
}

/// A zero-length tick: nodes consume products that landed on the last tick
/// without any time passing.
pub fn settle(engine: &mut Engine) {
    run(engine, 0.0, 1);
}
