//! Read-only snapshots of products for rendering. All types are owned
//! copies with no references into engine storage.

use serde::{Deserialize, Serialize};

use crate::fixed::Fixed64;
use crate::graph::FlowGraph;
use crate::id::{ColorIndex, ProductId};
use crate::motion::render_position;
use crate::port::DECK_HEIGHT;
use crate::product::{Location, Product, ProductRegistry, ProductState};

/// One live product as a renderer sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub serial: u64,
    /// World position. Products on an edge follow the hop arc; products at
    /// a node sit on its deck.
    pub position: [f64; 3],
    pub color: ColorIndex,
    pub product_type: String,
    pub state: ProductState,
    pub progress: Fixed64,
    pub location: Location,
}

pub(crate) fn snapshot_products(graph: &FlowGraph, products: &ProductRegistry) -> Vec<ProductSnapshot> {
    products
        .iter()
        .map(|(id, product)| ProductSnapshot {
            id,
            serial: product.serial,
            position: position_of(graph, product),
            color: product.color,
            product_type: product.product_type.clone(),
            state: product.state,
            progress: product.progress,
            location: product.location,
        })
        .collect()
}

fn position_of(graph: &FlowGraph, product: &Product) -> [f64; 3] {
    match product.location {
        Location::Edge(edge) => match graph.get_edge(edge) {
            Some(data) => match data.geometry {
                Some(geometry) => render_position(&geometry, product.progress),
                None => deck_of(graph.get_node(data.from).map(|n| n.position)),
            },
            None => [0.0; 3],
        },
        Location::Node(node) => deck_of(graph.get_node(node).map(|n| n.position)),
    }
}

fn deck_of(origin: Option<[f64; 3]>) -> [f64; 3] {
    let [x, y, z] = origin.unwrap_or([0.0; 3]);
    [x, y + DECK_HEIGHT, z]
}
