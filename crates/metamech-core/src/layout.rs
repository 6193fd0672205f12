//! Topology model supplied by the host editor.
//!
//! A [`Layout`] is a plain description of the flow line: nodes with their
//! typed parameters and world positions, and directed edges from one node's
//! port to another's. The engine copies it on [`Engine::init`] and never
//! looks at it again during a run.
//!
//! Editors that keep parameters in a loose key/value bag can convert with
//! [`NodeKind::from_tag`], which fills in defaults for anything missing.
//!
//! [`Engine::init`]: crate::engine::Engine::init

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::fixed::{Fixed64, f64_to_fixed64};
use crate::id::{EdgeId, NodeId, PortId};

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Products per minute when a source has no `spawnRate`.
pub const DEFAULT_SPAWN_RATE: f64 = 60.0;
/// Seconds per product when a machine has no `processingTime`.
pub const DEFAULT_PROCESSING_TIME: f64 = 2.0;
/// Queue slots when a buffer has no `capacity`.
pub const DEFAULT_BUFFER_CAPACITY: u32 = 10;
/// Products per pallet when a palletizer has no `batchSize`.
pub const DEFAULT_BATCH_SIZE: u32 = 4;
/// Belt speed in metres per second when a conveyor has no `speed`.
pub const DEFAULT_CONVEYOR_SPEED: f64 = 1.0;
/// Conveyor length in metres when a conveyor has no `length`.
pub const DEFAULT_CONVEYOR_LENGTH: f64 = 5.0;
/// Label stamped on products when a source has no `productType`.
pub const DEFAULT_PRODUCT_TYPE: &str = "default";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors converting loosely-typed editor data into a [`NodeKind`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("parameter `{name}` has an invalid value: {reason}")]
    InvalidParameter { name: String, reason: String },
}

// ---------------------------------------------------------------------------
// Parameter bag
// ---------------------------------------------------------------------------

/// A single loosely-typed parameter value as stored by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// Editor-side key/value parameters for one node.
pub type ParamBag = BTreeMap<String, ParamValue>;

fn number(bag: &ParamBag, name: &str) -> Result<Option<f64>, LayoutError> {
    match bag.get(name) {
        None => Ok(None),
        Some(ParamValue::Number(v)) if v.is_finite() => Ok(Some(*v)),
        Some(other) => Err(LayoutError::InvalidParameter {
            name: name.to_owned(),
            reason: format!("expected a finite number, got {other:?}"),
        }),
    }
}

/// Read a strictly positive number, falling back to `default` when the key is
/// missing or zero (the editor stores zero for "unset").
fn positive(bag: &ParamBag, name: &str, default: f64) -> Result<f64, LayoutError> {
    match number(bag, name)? {
        None => Ok(default),
        Some(v) if v == 0.0 => Ok(default),
        Some(v) if v < 0.0 => Err(LayoutError::InvalidParameter {
            name: name.to_owned(),
            reason: format!("must be positive, got {v}"),
        }),
        Some(v) => Ok(v),
    }
}

/// A positive rate that must stay non-zero once converted to [`Fixed64`].
fn positive_fixed(bag: &ParamBag, name: &str, default: f64) -> Result<Fixed64, LayoutError> {
    let v = positive(bag, name, default)?;
    let fixed = f64_to_fixed64(v);
    if fixed == Fixed64::ZERO {
        return Err(LayoutError::InvalidParameter {
            name: name.to_owned(),
            reason: format!("{v} is below fixed-point resolution"),
        });
    }
    Ok(fixed)
}

fn count(bag: &ParamBag, name: &str, default: u32) -> Result<u32, LayoutError> {
    let v = positive(bag, name, default as f64)?;
    if v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(LayoutError::InvalidParameter {
            name: name.to_owned(),
            reason: format!("expected a whole count, got {v}"),
        });
    }
    Ok(v as u32)
}

fn text(bag: &ParamBag, name: &str) -> Option<String> {
    match bag.get(name) {
        Some(ParamValue::Text(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Typed parameters
// ---------------------------------------------------------------------------

/// Parameters of a source station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    /// Products per simulated minute.
    pub spawn_rate: Fixed64,
    /// Stop emitting after this many products. `None` = unbounded.
    pub max_items: Option<u32>,
    /// Cosmetic type label stamped on every product.
    pub product_type: String,
}

impl Default for SourceParams {
    fn default() -> Self {
        Self {
            spawn_rate: f64_to_fixed64(DEFAULT_SPAWN_RATE),
            max_items: None,
            product_type: DEFAULT_PRODUCT_TYPE.to_owned(),
        }
    }
}

/// Parameters of a conveyor station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConveyorParams {
    /// Travel speed of products leaving this conveyor, metres per second.
    pub speed: Fixed64,
    /// Belt length in metres. Geometry only; used by the port resolver.
    pub length: f64,
}

impl Default for ConveyorParams {
    fn default() -> Self {
        Self {
            speed: f64_to_fixed64(DEFAULT_CONVEYOR_SPEED),
            length: DEFAULT_CONVEYOR_LENGTH,
        }
    }
}

/// What a buffer does with an arrival when its queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Discard the product and count it as dropped.
    #[default]
    Drop,
    /// Leave the product waiting at the buffer and retry on later ticks.
    Hold,
}

/// Parameters of a buffer station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferParams {
    pub capacity: u32,
    pub overflow: OverflowPolicy,
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUFFER_CAPACITY,
            overflow: OverflowPolicy::Drop,
        }
    }
}

/// Parameters shared by machines and pick-and-place cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineParams {
    /// Simulated seconds to process one product.
    pub processing_time: Fixed64,
}

impl Default for MachineParams {
    fn default() -> Self {
        Self {
            processing_time: f64_to_fixed64(DEFAULT_PROCESSING_TIME),
        }
    }
}

/// Parameters of a palletizer station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PalletizerParams {
    /// Products per released pallet.
    pub batch_size: u32,
}

impl Default for PalletizerParams {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

/// The closed set of stage kinds. Each variant carries its own parameters;
/// dispatch is by `match`, never by string tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Source(SourceParams),
    Sink,
    Conveyor(ConveyorParams),
    Buffer(BufferParams),
    Machine(MachineParams),
    PickAndPlace(MachineParams),
    Router,
    Palletizer(PalletizerParams),
}

impl NodeKind {
    /// Build a kind from the editor's type tag and parameter bag. Missing
    /// parameters take their documented defaults.
    pub fn from_tag(tag: &str, params: &ParamBag) -> Result<Self, LayoutError> {
        let kind = match tag {
            "source" => NodeKind::Source(SourceParams {
                spawn_rate: positive_fixed(params, "spawnRate", DEFAULT_SPAWN_RATE)?,
                max_items: match number(params, "maxItems")? {
                    None => None,
                    Some(v) if v == 0.0 => None,
                    Some(_) => Some(count(params, "maxItems", 1)?),
                },
                product_type: text(params, "productType")
                    .unwrap_or_else(|| DEFAULT_PRODUCT_TYPE.to_owned()),
            }),
            "sink" => NodeKind::Sink,
            "conveyor" => NodeKind::Conveyor(ConveyorParams {
                speed: positive_fixed(params, "speed", DEFAULT_CONVEYOR_SPEED)?,
                length: positive(params, "length", DEFAULT_CONVEYOR_LENGTH)?,
            }),
            "buffer" => NodeKind::Buffer(BufferParams {
                capacity: count(params, "capacity", DEFAULT_BUFFER_CAPACITY)?,
                overflow: match text(params, "overflow").as_deref() {
                    None | Some("drop") => OverflowPolicy::Drop,
                    Some("hold") => OverflowPolicy::Hold,
                    Some(other) => {
                        return Err(LayoutError::InvalidParameter {
                            name: "overflow".to_owned(),
                            reason: format!("expected `drop` or `hold`, got `{other}`"),
                        });
                    }
                },
            }),
            "machine" | "pick-and-place" => {
                let params = MachineParams {
                    processing_time: f64_to_fixed64(positive(
                        params,
                        "processingTime",
                        DEFAULT_PROCESSING_TIME,
                    )?),
                };
                if tag == "machine" {
                    NodeKind::Machine(params)
                } else {
                    NodeKind::PickAndPlace(params)
                }
            }
            "router" => NodeKind::Router,
            "palletizer" => NodeKind::Palletizer(PalletizerParams {
                batch_size: count(params, "batchSize", DEFAULT_BATCH_SIZE)?,
            }),
            other => return Err(LayoutError::UnknownNodeType(other.to_owned())),
        };
        Ok(kind)
    }

    /// The editor's type tag for this kind.
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "source",
            NodeKind::Sink => "sink",
            NodeKind::Conveyor(_) => "conveyor",
            NodeKind::Buffer(_) => "buffer",
            NodeKind::Machine(_) => "machine",
            NodeKind::PickAndPlace(_) => "pick-and-place",
            NodeKind::Router => "router",
            NodeKind::Palletizer(_) => "palletizer",
        }
    }

    /// Machines and pick-and-place cells: the candidates for bottleneck.
    pub fn is_processing(&self) -> bool {
        matches!(self, NodeKind::Machine(_) | NodeKind::PickAndPlace(_))
    }

    /// Whether this kind hands products on to an output edge.
    pub fn forwards(&self) -> bool {
        !matches!(self, NodeKind::Sink)
    }
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// One node as described by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Display name, used in stats overlays.
    pub name: String,
    pub kind: NodeKind,
    /// World position in metres.
    #[serde(default)]
    pub position: [f64; 3],
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            position: [0.0; 3],
        }
    }

    pub fn at(mut self, position: [f64; 3]) -> Self {
        self.position = position;
        self
    }
}

/// One directed edge: `from`'s `from_port` feeds `to`'s `to_port`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: NodeId,
    pub from_port: PortId,
    pub to: NodeId,
    pub to_port: PortId,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// The host's view of the flow line. Iteration order (and therefore the
/// engine's node stepping order) is slot order: insertion order, unless a
/// removed node's slot was reused by a later insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layout {
    nodes: SlotMap<NodeId, NodeSpec>,
    edges: SlotMap<EdgeId, EdgeSpec>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> NodeId {
        self.nodes.insert(spec)
    }

    /// Connect two node ports. Endpoints are not checked here; dangling
    /// edges are reported and skipped by the engine at `init`.
    pub fn connect(
        &mut self,
        from: NodeId,
        from_port: impl Into<PortId>,
        to: NodeId,
        to_port: impl Into<PortId>,
    ) -> EdgeId {
        self.edges.insert(EdgeSpec {
            from,
            from_port: from_port.into(),
            to,
            to_port: to_port.into(),
        })
    }

    /// Connect `from`'s `output` port to `to`'s `input` port.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> EdgeId {
        self.connect(from, "output", to, "input")
    }

    /// Remove a node. Edges touching it are left in place.
    pub fn remove_node(&mut self, node: NodeId) -> Option<NodeSpec> {
        self.nodes.remove(node)
    }

    pub fn remove_edge(&mut self, edge: EdgeId) -> Option<EdgeSpec> {
        self.edges.remove(edge)
    }

    pub fn node(&self, node: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(node)
    }

    pub fn node_mut(&mut self, node: NodeId) -> Option<&mut NodeSpec> {
        self.nodes.get_mut(node)
    }

    pub fn edge(&self, edge: EdgeId) -> Option<&EdgeSpec> {
        self.edges.get(edge)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeSpec)> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &EdgeSpec)> {
        self.edges.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(entries: &[(&str, ParamValue)]) -> ParamBag {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn source_defaults_when_bag_empty() {
        let kind = NodeKind::from_tag("source", &ParamBag::new()).unwrap();
        assert_eq!(kind, NodeKind::Source(SourceParams::default()));
    }

    #[test]
    fn source_reads_editor_keys() {
        let kind = NodeKind::from_tag(
            "source",
            &bag(&[
                ("spawnRate", ParamValue::Number(120.0)),
                ("maxItems", ParamValue::Number(5.0)),
                ("productType", ParamValue::Text("box".into())),
            ]),
        )
        .unwrap();
        let NodeKind::Source(p) = kind else {
            panic!("expected source");
        };
        assert_eq!(p.spawn_rate, Fixed64::from_num(120));
        assert_eq!(p.max_items, Some(5));
        assert_eq!(p.product_type, "box");
    }

    #[test]
    fn zero_means_default() {
        let kind = NodeKind::from_tag(
            "machine",
            &bag(&[("processingTime", ParamValue::Number(0.0))]),
        )
        .unwrap();
        assert_eq!(kind, NodeKind::Machine(MachineParams::default()));
    }

    #[test]
    fn pick_and_place_shares_machine_params() {
        let kind = NodeKind::from_tag(
            "pick-and-place",
            &bag(&[("processingTime", ParamValue::Number(0.5))]),
        )
        .unwrap();
        assert_eq!(
            kind,
            NodeKind::PickAndPlace(MachineParams {
                processing_time: Fixed64::from_num(0.5)
            })
        );
        assert!(kind.is_processing());
    }

    #[test]
    fn buffer_overflow_policy_parsed() {
        let kind = NodeKind::from_tag(
            "buffer",
            &bag(&[
                ("capacity", ParamValue::Number(3.0)),
                ("overflow", ParamValue::Text("hold".into())),
            ]),
        )
        .unwrap();
        assert_eq!(
            kind,
            NodeKind::Buffer(BufferParams {
                capacity: 3,
                overflow: OverflowPolicy::Hold
            })
        );
    }

    #[test]
    fn invalid_values_rejected() {
        let err = NodeKind::from_tag(
            "buffer",
            &bag(&[("capacity", ParamValue::Number(2.5))]),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameter { ref name, .. } if name == "capacity"));

        let err = NodeKind::from_tag(
            "conveyor",
            &bag(&[("speed", ParamValue::Text("fast".into()))]),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameter { .. }));

        let err = NodeKind::from_tag(
            "source",
            &bag(&[("spawnRate", ParamValue::Number(-1.0))]),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameter { .. }));
    }

    #[test]
    fn rate_below_resolution_rejected() {
        let err = NodeKind::from_tag(
            "source",
            &bag(&[("spawnRate", ParamValue::Number(1e-10))]),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameter { ref name, .. } if name == "spawnRate"));

        let err = NodeKind::from_tag(
            "conveyor",
            &bag(&[("speed", ParamValue::Number(1e-12))]),
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::InvalidParameter { ref name, .. } if name == "speed"));

        // One resolution step survives.
        let kind = NodeKind::from_tag(
            "source",
            &bag(&[("spawnRate", ParamValue::Number(Fixed64::DELTA.to_num()))]),
        )
        .unwrap();
        let NodeKind::Source(p) = kind else {
            panic!("expected source");
        };
        assert_eq!(p.spawn_rate, Fixed64::DELTA);
    }

    #[test]
    fn unknown_tag_rejected() {
        let err = NodeKind::from_tag("spiral-conveyor", &ParamBag::new()).unwrap_err();
        assert_eq!(err, LayoutError::UnknownNodeType("spiral-conveyor".into()));
    }

    #[test]
    fn tag_round_trips() {
        for tag in [
            "source",
            "sink",
            "conveyor",
            "buffer",
            "machine",
            "pick-and-place",
            "router",
            "palletizer",
        ] {
            let kind = NodeKind::from_tag(tag, &ParamBag::new()).unwrap();
            assert_eq!(kind.tag(), tag);
        }
    }

    #[test]
    fn param_bag_deserializes_from_editor_json() {
        let json = r#"{"spawnRate": 30, "productType": "crate", "enabled": true}"#;
        let params: ParamBag = serde_json::from_str(json).unwrap();
        assert_eq!(params["spawnRate"], ParamValue::Number(30.0));
        assert_eq!(params["productType"], ParamValue::Text("crate".into()));
        assert_eq!(params["enabled"], ParamValue::Flag(true));
    }

    #[test]
    fn layout_preserves_insertion_order() {
        let mut layout = Layout::new();
        let a = layout.add_node(NodeSpec::new("a", NodeKind::Sink));
        let b = layout.add_node(NodeSpec::new("b", NodeKind::Router));
        let order: Vec<NodeId> = layout.nodes().map(|(id, _)| id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn removing_node_leaves_edges() {
        let mut layout = Layout::new();
        let a = layout.add_node(NodeSpec::new("a", NodeKind::Router));
        let b = layout.add_node(NodeSpec::new("b", NodeKind::Sink));
        let e = layout.link(a, b);
        layout.remove_node(b);
        assert_eq!(layout.node_count(), 1);
        assert!(layout.edge(e).is_some());
    }
}
