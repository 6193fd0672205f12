//! Headless line example: build a layout the way the editor stores it,
//! run a minute of simulated time, and print the stats the overlay shows.
//!
//! Node parameters arrive as loose JSON bags and go through
//! `NodeKind::from_tag`, the same path the studio uses.
//!
//! Run with: `RUST_LOG=debug cargo run -p metamech-core --example headless_line`

use std::cell::Cell;
use std::rc::Rc;

use metamech_core::engine::Engine;
use metamech_core::event::{Event, EventKind};
use metamech_core::layout::{Layout, NodeKind, NodeSpec, ParamBag};

/// `(name, type tag, parameters, x position)` as exported by the editor.
const STAGES: &[(&str, &str, &str, f64)] = &[
    ("infeed", "source", r#"{ "spawnRate": 90, "productType": "carton" }"#, 0.0),
    ("belt-1", "conveyor", r#"{ "speed": 1.5, "length": 3 }"#, 2.5),
    ("staging", "buffer", r#"{ "capacity": 6, "overflow": "hold" }"#, 5.0),
    ("sealer", "machine", r#"{ "processingTime": 0.6 }"#, 6.0),
    ("robot", "pick-and-place", r#"{ "processingTime": 0.8 }"#, 7.0),
    ("stacker", "palletizer", r#"{ "batchSize": 5 }"#, 8.0),
    ("dock", "sink", "{}", 9.0),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // --- Build the layout from editor data ---

    let mut layout = Layout::new();
    let mut prev = None;
    for &(name, tag, params, x) in STAGES {
        let bag: ParamBag = serde_json::from_str(params)?;
        let kind = NodeKind::from_tag(tag, &bag)?;
        let node = layout.add_node(NodeSpec::new(name, kind).at([x, 0.0, 0.0]));
        if let Some(prev) = prev {
            layout.link(prev, node);
        }
        prev = Some(node);
    }

    // --- Run ---

    let mut engine = Engine::new();
    let pallets = Rc::new(Cell::new(0u32));
    let counter = Rc::clone(&pallets);
    engine.on_passive(
        EventKind::PalletReleased,
        Box::new(move |event| {
            if let Event::PalletReleased { count, time, .. } = event {
                counter.set(counter.get() + 1);
                println!("  t={time:>6.2}s  pallet of {count} released");
            }
        }),
    );

    engine.init(&layout);
    for issue in engine.layout_issues() {
        println!("layout issue: {issue}");
    }

    // 60 simulated seconds at 30 frames per second.
    for _ in 0..1800 {
        engine.tick(1.0 / 30.0, 1.0)?;
    }

    // --- Report ---

    println!();
    println!("{:<10} {:<15} {:>10} {:>8} {:>6}", "node", "type", "throughput", "util", "queue");
    for (_, stats) in engine.node_stats()? {
        println!(
            "{:<10} {:<15} {:>10} {:>7.1}% {:>6}",
            stats.name,
            stats.kind,
            stats.throughput,
            stats.utilization.to_num::<f64>() * 100.0,
            stats.queue_length,
        );
    }

    let stats = engine.aggregate_stats()?;
    println!();
    println!("pallets shipped: {}", pallets.get());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
