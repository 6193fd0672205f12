//! Port resolution: which attachment points a node exposes, and where.
//!
//! The simulator only needs port identity and a local offset from the node's
//! position (to measure edge lengths). Hosts with real geometry builders plug
//! in their own [`PortResolver`]; [`StandardPorts`] gives every stage kind a
//! simple straight-through footprint.

use serde::{Deserialize, Serialize};

use crate::id::PortId;
use crate::layout::NodeKind;

/// Height of the conveying surface above the node origin, in metres.
pub const DECK_HEIGHT: f64 = 0.8;

/// Footprint length of every non-conveyor station, in metres.
pub const STATION_LENGTH: f64 = 1.0;

/// A named attachment point and its offset from the node origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub offset: [f64; 3],
}

impl Port {
    pub fn new(id: impl Into<PortId>, offset: [f64; 3]) -> Self {
        Self {
            id: id.into(),
            offset,
        }
    }
}

/// Supplies the ports of a node given its kind and parameters.
pub trait PortResolver: std::fmt::Debug {
    fn resolve_ports(&self, kind: &NodeKind) -> Vec<Port>;

    /// Find one port by id.
    fn find_port(&self, kind: &NodeKind, port: &PortId) -> Option<Port> {
        self.resolve_ports(kind).into_iter().find(|p| &p.id == port)
    }
}

/// Default resolver: an `input` port on the -X end and an `output` port on
/// the +X end of a straight footprint at deck height. Sources have no input,
/// sinks have no output, and routers fan out to three outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPorts;

impl PortResolver for StandardPorts {
    fn resolve_ports(&self, kind: &NodeKind) -> Vec<Port> {
        let length = match kind {
            NodeKind::Conveyor(params) => params.length,
            _ => STATION_LENGTH,
        };
        let half = length / 2.0;
        let input = Port::new("input", [-half, DECK_HEIGHT, 0.0]);
        let output = Port::new("output", [half, DECK_HEIGHT, 0.0]);

        match kind {
            NodeKind::Source(_) => vec![output],
            NodeKind::Sink => vec![input],
            NodeKind::Router => vec![
                input,
                Port::new("output-left", [0.0, DECK_HEIGHT, -half]),
                Port::new("output-center", [half, DECK_HEIGHT, 0.0]),
                Port::new("output-right", [0.0, DECK_HEIGHT, half]),
            ],
            NodeKind::Conveyor(_)
            | NodeKind::Buffer(_)
            | NodeKind::Machine(_)
            | NodeKind::PickAndPlace(_)
            | NodeKind::Palletizer(_) => vec![input, output],
        }
    }
}

/// World-space position of a port on a node at `origin`.
pub fn port_position(origin: [f64; 3], port: &Port) -> [f64; 3] {
    [
        origin[0] + port.offset[0],
        origin[1] + port.offset[1],
        origin[2] + port.offset[2],
    ]
}

/// Euclidean distance between two points.
pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = b[0] - a[0];
    let dy = b[1] - a[1];
    let dz = b[2] - a[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ConveyorParams, MachineParams, SourceParams};

    fn ids(ports: &[Port]) -> Vec<&str> {
        ports.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn source_and_sink_are_one_sided() {
        let r = StandardPorts;
        assert_eq!(ids(&r.resolve_ports(&NodeKind::Source(SourceParams::default()))), ["output"]);
        assert_eq!(ids(&r.resolve_ports(&NodeKind::Sink)), ["input"]);
    }

    #[test]
    fn router_has_three_outputs() {
        let ports = StandardPorts.resolve_ports(&NodeKind::Router);
        assert_eq!(
            ids(&ports),
            ["input", "output-left", "output-center", "output-right"]
        );
    }

    #[test]
    fn conveyor_ports_follow_length() {
        let kind = NodeKind::Conveyor(ConveyorParams {
            length: 4.0,
            ..ConveyorParams::default()
        });
        let ports = StandardPorts.resolve_ports(&kind);
        assert_eq!(ports[0].offset, [-2.0, DECK_HEIGHT, 0.0]);
        assert_eq!(ports[1].offset, [2.0, DECK_HEIGHT, 0.0]);
    }

    #[test]
    fn find_port_by_id() {
        let kind = NodeKind::Machine(MachineParams::default());
        let port = StandardPorts.find_port(&kind, &PortId::from("output")).unwrap();
        assert_eq!(port.offset, [0.5, DECK_HEIGHT, 0.0]);
        assert!(StandardPorts.find_port(&kind, &PortId::from("side")).is_none());
    }

    #[test]
    fn adjacent_stations_touch() {
        // Two 1 m stations one metre apart: output of the first meets input of the second.
        let kind = NodeKind::Machine(MachineParams::default());
        let out = StandardPorts.find_port(&kind, &PortId::from("output")).unwrap();
        let inp = StandardPorts.find_port(&kind, &PortId::from("input")).unwrap();
        let a = port_position([0.0, 0.0, 0.0], &out);
        let b = port_position([1.0, 0.0, 0.0], &inp);
        assert!(distance(a, b) < 1e-12);
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]), 5.0);
        assert_eq!(distance([1.0, 1.0, 1.0], [1.0, 1.0, 1.0]), 0.0);
    }
}
