use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a process node (station) in the flow graph.
    pub struct NodeId;

    /// Identifies a directed edge between two node ports.
    pub struct EdgeId;

    /// Identifies a product unit. Keys are versioned, so a retired
    /// product's id never compares equal to a later one.
    pub struct ProductId;
}

/// Opaque name of an attachment point on a node (`"input"`, `"output"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortId(pub String);

impl PortId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PortId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl std::fmt::Display for PortId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index into the cosmetic product palette. Cycled per spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColorIndex(pub u8);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_id_from_str() {
        let a = PortId::from("input");
        let b = PortId::new(String::from("input"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "input");
        assert_eq!(a.to_string(), "input");
    }

    #[test]
    fn port_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PortId::from("output")).unwrap();
        assert_eq!(json, "\"output\"");
    }

    #[test]
    fn ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(PortId::from("input"), 0);
        map.insert(PortId::from("output"), 1);
        assert_eq!(map[&PortId::from("output")], 1);
    }
}
