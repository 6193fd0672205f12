//! MetaMech Core -- the discrete-time production-flow simulator behind the
//! studio's live line preview.
//!
//! A layout is a directed graph of typed stages (source, conveyor, buffer,
//! machine, pick-and-place, router, palletizer, sink). Products are spawned
//! at sources, travel along edges, queue and get processed at stations, and
//! leave at sinks. Every call to [`engine::Engine::tick`] advances simulated
//! time by a caller-supplied `dt`, steps each stage once, moves products
//! along edges, and leaves live statistics ready for query.
//!
//! ```rust,ignore
//! let mut layout = Layout::new();
//! let src = layout.add_node(NodeSpec::new("in", NodeKind::Source(SourceParams::default())));
//! let out = layout.add_node(NodeSpec::new("out", NodeKind::Sink).at([1.0, 0.0, 0.0]));
//! layout.link(src, out);
//!
//! let mut engine = Engine::new();
//! engine.init(&layout);
//! engine.tick(0.1, 1.0)?;
//! let stats = engine.aggregate_stats()?;
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- owns the run; `init`, `tick`, `reset`, queries.
//! - [`layout::Layout`] -- the host-built topology with typed [`layout::NodeKind`]s.
//! - [`port::PortResolver`] -- where each node's ports sit; [`port::StandardPorts`]
//!   is the default footprint.
//! - [`station::StationState`] -- per-node runtime state and step rules.
//! - [`product::ProductRegistry`] -- owns every live product.
//! - [`stats::AggregateStats`] -- throughput, utilization, bottleneck, cycle time.
//! - [`event::EventBus`] -- buffered typed events delivered after each tick.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point used for all simulated time.

pub mod engine;
pub mod event;
pub mod fixed;
pub mod graph;
pub mod id;
pub mod layout;
pub mod motion;
pub mod port;
pub mod product;
pub mod query;
pub mod sim;
pub mod station;
pub mod stats;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod validation;
