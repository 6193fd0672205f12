//! Criterion benchmarks for the MetaMech flow engine.
//!
//! Benchmark groups:
//! - `studio_line`: one 12-stage line, the size of a typical studio scene
//! - `plant_floor`: 100 parallel lines, 800 nodes and 700 edges
//! - `snapshots`: the per-frame product and stats queries on a busy floor

use criterion::{criterion_group, criterion_main, Criterion};
use metamech_core::engine::Engine;
use metamech_core::layout::{Layout, NodeKind, NodeSpec};
use metamech_core::port::STATION_LENGTH;
use metamech_core::test_utils::*;

const FRAME_DT: f64 = 1.0 / 60.0;

// ===========================================================================
// Layout builders
// ===========================================================================

fn line_stages() -> Vec<NodeKind> {
    vec![
        source(240.0),
        conveyor(1.0, 3.0),
        buffer(8),
        machine(0.2),
        conveyor(1.5, 2.0),
        pick_and_place(0.3),
        palletizer(4),
        NodeKind::Sink,
    ]
}

/// `rows` copies of the standard line, three metres apart along +Z.
fn build_floor(rows: usize) -> Layout {
    let mut layout = Layout::new();
    for row in 0..rows {
        let z = row as f64 * 3.0;
        let mut x = 0.0;
        let mut prev: Option<(_, f64)> = None;
        for (i, kind) in line_stages().into_iter().enumerate() {
            let half = match &kind {
                NodeKind::Conveyor(params) => params.length / 2.0,
                _ => STATION_LENGTH / 2.0,
            };
            if let Some((_, prev_half)) = prev {
                // Half a metre of open edge between stations.
                x += prev_half + 0.5 + half;
            }
            let id = layout.add_node(NodeSpec::new(format!("r{row}-{i}"), kind).at([x, 0.0, z]));
            if let Some((prev_id, _)) = prev {
                layout.link(prev_id, id);
            }
            prev = Some((id, half));
        }
    }
    layout
}

/// An engine warmed up for `seconds` of simulated time so queues, edges and
/// pallets are populated.
fn warmed(layout: &Layout, seconds: f64) -> Engine {
    let mut engine = engine_for(layout);
    run(&mut engine, FRAME_DT, (seconds / FRAME_DT) as usize);
    engine
}

// ===========================================================================
// Benchmarks
// ===========================================================================

fn bench_studio_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("studio_line");
    group.sample_size(100);

    let (layout, _) = spaced_line(
        &[
            source(120.0),
            conveyor(1.0, 4.0),
            buffer(10),
            machine(0.4),
            conveyor(1.0, 2.0),
            machine(0.3),
            pick_and_place(0.6),
            buffer(6),
            machine(0.5),
            conveyor(2.0, 3.0),
            palletizer(6),
            NodeKind::Sink,
        ],
        0.5,
    );
    let mut engine = warmed(&layout, 30.0);

    group.bench_function("12_stages_tick", |b| {
        b.iter(|| {
            engine.tick(FRAME_DT, 1.0).unwrap();
        });
    });

    group.finish();
}

fn bench_plant_floor(c: &mut Criterion) {
    let mut group = c.benchmark_group("plant_floor");
    group.sample_size(30);

    let layout = build_floor(100);
    let mut engine = warmed(&layout, 20.0);

    group.bench_function("800_nodes_700_edges_tick", |b| {
        b.iter(|| {
            engine.tick(FRAME_DT, 1.0).unwrap();
        });
    });

    group.bench_function("800_nodes_700_edges_tick_x8", |b| {
        b.iter(|| {
            engine.tick(FRAME_DT, 8.0).unwrap();
        });
    });

    group.finish();
}

fn bench_snapshots(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshots");
    group.sample_size(30);

    let layout = build_floor(100);
    let engine = warmed(&layout, 20.0);

    group.bench_function("products", |b| {
        b.iter(|| engine.products().unwrap());
    });

    group.bench_function("aggregate_stats", |b| {
        b.iter(|| engine.aggregate_stats().unwrap());
    });

    group.bench_function("node_stats", |b| {
        b.iter(|| engine.node_stats().unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_studio_line,
    bench_plant_floor,
    bench_snapshots
);
criterion_main!(benches);
