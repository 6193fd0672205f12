//! Moving products along edges.
//!
//! Progress is a fraction of the edge: each tick adds
//! `travel_speed * elapsed / length`. Degenerate edges (ports that touch)
//! complete in the tick the product is sent. Products on edges without
//! resolved geometry do not move.

use log::trace;

use crate::event::{Event, EventBus};
use crate::fixed::{Fixed64, SimTime, fixed64_to_f64};
use crate::graph::{EdgeGeometry, FlowGraph};
use crate::id::{NodeId, ProductId};
use crate::product::{ProductRegistry, ProductState};
use crate::sim::TickResult;

/// Peak height of the cosmetic hop drawn over an edge, metres.
pub const ARC_HEIGHT: f64 = 0.1;

/// Advance every moving product once. Products reaching the end of their
/// edge land at its destination node, in registry order.
pub fn advance(
    graph: &FlowGraph,
    products: &mut ProductRegistry,
    elapsed: Fixed64,
    now: SimTime,
    events: &mut EventBus,
    tally: &mut TickResult,
) {
    let mut landed: Vec<(ProductId, NodeId)> = Vec::new();

    for (id, product) in products.iter_mut() {
        if product.state != ProductState::Moving {
            continue;
        }
        let Some(edge) = product.edge().and_then(|e| graph.get_edge(e)) else {
            trace!("product {id:?} is moving on an unknown edge");
            continue;
        };
        let Some(geometry) = edge.geometry else {
            continue;
        };

        product.progress = next_progress(product.progress, &geometry, edge.travel_speed, elapsed);
        if product.progress >= Fixed64::ONE {
            landed.push((id, edge.to));
        }
    }

    for (id, node) in landed {
        products.arrive(id, node);
        tally.arrived += 1;
        events.emit(Event::ProductArrived {
            product: id,
            node,
            time: now,
        });
    }
}

fn next_progress(
    progress: Fixed64,
    geometry: &EdgeGeometry,
    speed: Fixed64,
    elapsed: Fixed64,
) -> Fixed64 {
    if geometry.degenerate {
        return Fixed64::ONE;
    }
    let step = speed
        .saturating_mul(elapsed)
        .checked_div(geometry.length)
        .unwrap_or(Fixed64::ONE);
    progress.saturating_add(step).min(Fixed64::ONE)
}

/// World position of a product `progress` of the way along an edge, with
/// the hop arc added on the y axis.
pub fn render_position(geometry: &EdgeGeometry, progress: Fixed64) -> [f64; 3] {
    let t = fixed64_to_f64(progress).clamp(0.0, 1.0);
    let [sx, sy, sz] = geometry.start;
    let [ex, ey, ez] = geometry.end;
    [
        sx + (ex - sx) * t,
        sy + (ey - sy) * t + (t * std::f64::consts::PI).sin() * ARC_HEIGHT,
        sz + (ez - sz) * t,
    ]
}
