//! Property-based tests for the MetaMech flow engine.
//!
//! Uses proptest to generate random lines and tick sequences, then checks
//! that the structural invariants hold after every tick.

use std::collections::HashMap;

use metamech_core::engine::Engine;
use metamech_core::fixed::Fixed64;
use metamech_core::layout::{Layout, NodeKind};
use metamech_core::product::{Location, ProductState};
use metamech_core::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

/// One interior stage of a generated line.
fn arb_stage() -> impl Strategy<Value = NodeKind> {
    prop_oneof![
        (1..6u32).prop_map(buffer),
        (1..6u32).prop_map(holding_buffer),
        (1..20u32).prop_map(|tenths| machine(f64::from(tenths) / 10.0)),
        (1..20u32).prop_map(|tenths| pick_and_place(f64::from(tenths) / 10.0)),
        (1..5u32).prop_map(|speed| conveyor(f64::from(speed) / 2.0, 2.0)),
        (1..6u32).prop_map(palletizer),
        Just(NodeKind::Router),
    ]
}

/// A source, up to `max_stages` interior stages, then a sink, with a random
/// gap between stations.
fn arb_line(max_stages: usize) -> impl Strategy<Value = Layout> {
    (
        10..600u32,
        proptest::collection::vec(arb_stage(), 0..=max_stages),
        0..3u32,
    )
        .prop_map(|(rate, stages, gap)| {
            let mut kinds = vec![source(f64::from(rate))];
            kinds.extend(stages);
            kinds.push(NodeKind::Sink);
            spaced_line(&kinds, f64::from(gap) / 2.0).0
        })
}

/// Tick sizes in seconds, binary-exact so runs compare cleanly.
fn arb_dts(max_ticks: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(
        prop_oneof![Just(0.0), Just(0.03125), Just(0.125), Just(0.5), Just(1.0)],
        1..=max_ticks,
    )
}

// ===========================================================================
// Invariant checks
// ===========================================================================

fn check_invariants(engine: &Engine, layout: &Layout) -> Result<(), TestCaseError> {
    let stats = engine.aggregate_stats().unwrap();
    prop_assert_eq!(
        stats.products_created,
        stats.products_completed + stats.product_count as u64 + stats.products_dropped
    );

    for (node, spec) in layout.nodes() {
        let Some(state) = engine.station(node) else {
            continue;
        };
        let utilization = state.utilization();
        prop_assert!(utilization >= Fixed64::ZERO && utilization <= Fixed64::ONE);
        if let NodeKind::Buffer(params) = &spec.kind {
            prop_assert!(state.queue.len() <= params.capacity as usize);
        }
    }

    let mut processing: HashMap<_, usize> = HashMap::new();
    for product in engine.products().unwrap() {
        prop_assert!(product.progress >= Fixed64::ZERO && product.progress <= Fixed64::ONE);
        if product.state == ProductState::Processing
            && let Location::Node(node) = product.location
        {
            *processing.entry(node).or_default() += 1;
        }
    }
    for (node, count) in processing {
        prop_assert!(count <= 1, "node {:?} processes {} products", node, count);
    }
    Ok(())
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Conservation, buffer bounds, single-slot machines, and utilization
    /// range hold after every tick.
    #[test]
    fn invariants_hold_every_tick(layout in arb_line(6), dts in arb_dts(200)) {
        let mut engine = engine_for(&layout);
        for dt in dts {
            engine.tick(dt, 1.0).unwrap();
            check_invariants(&engine, &layout)?;
        }
    }

    /// Two engines fed the same layout and ticks agree on every state hash.
    #[test]
    fn deterministic_simulation(layout in arb_line(6), dts in arb_dts(100)) {
        let mut engine_a = engine_for(&layout);
        let mut engine_b = engine_for(&layout);

        for dt in dts {
            engine_a.tick(dt, 1.0).unwrap();
            engine_b.tick(dt, 1.0).unwrap();
            prop_assert_eq!(engine_a.state_hash(), engine_b.state_hash());
        }
        prop_assert_eq!(engine_a.aggregate_stats().unwrap(), engine_b.aggregate_stats().unwrap());
    }

    /// Reset followed by the same ticks reproduces the first run.
    #[test]
    fn reset_reproduces_run(layout in arb_line(4), dts in arb_dts(60)) {
        let mut engine = engine_for(&layout);
        let first: Vec<u64> = dts
            .iter()
            .map(|&dt| {
                engine.tick(dt, 1.0).unwrap();
                engine.state_hash()
            })
            .collect();

        engine.reset().unwrap();
        for (i, &dt) in dts.iter().enumerate() {
            engine.tick(dt, 1.0).unwrap();
            prop_assert_eq!(engine.state_hash(), first[i]);
        }
    }

    /// Simulated time never runs backwards, whatever the host passes in.
    #[test]
    fn time_is_monotonic(
        layout in arb_line(3),
        ticks in proptest::collection::vec((-2.0f64..2.0, -1.0f64..4.0), 1..50),
    ) {
        let mut engine = engine_for(&layout);
        let mut last = engine.sim_time();
        for (dt, speed) in ticks {
            let result = engine.tick(dt, speed).unwrap();
            prop_assert!(result.elapsed >= Fixed64::ZERO);
            prop_assert!(engine.sim_time() >= last);
            last = engine.sim_time();
        }
    }
}
