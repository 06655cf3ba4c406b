use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::topology::{Connection, DeviceType, Position, Topology, TopologyMetadata};

/// Version tag of the visualization document format.
pub const VIZ_FORMAT_VERSION: &str = "2.0";

/// Per-device entry in the visualization document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VizModel {
    /// Stable node identifier (the device id)
    pub name: String,

    /// Human-readable label
    #[serde(rename = "displayName")]
    pub display_name: String,

    /// Device category, used for mesh/icon selection
    pub category: DeviceType,

    pub position: Position,

    /// Currently a single tag: the device category
    pub tags: Vec<DeviceType>,

    /// Per-device details carried over from the topology
    pub metadata: Map<String, Value>,

    pub properties: VizProperties,
}

/// Identity properties surfaced in the node detail panel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VizProperties {
    pub ip: String,
    pub model: String,
    pub serial: String,
}

/// Document consumed by the browser-based 3D visualization tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VizDocument {
    pub version: String,
    pub models: Vec<VizModel>,
    pub connections: Vec<Connection>,
    pub metadata: TopologyMetadata,
}

/// Project a topology into the visualization document.
///
/// Stateless 1:1 re-projection: every device becomes exactly one model
/// and every connection is carried over verbatim; nothing is dropped
/// or merged.
pub fn export_visualization_format(topology: &Topology) -> VizDocument {
    let models = topology
        .devices
        .iter()
        .map(|device| VizModel {
            name: device.id.clone(),
            display_name: device.name.clone(),
            category: device.device_type,
            position: device.position,
            tags: vec![device.device_type],
            metadata: device.metadata.clone(),
            properties: VizProperties {
                ip: device.ip.clone(),
                model: device.model.clone(),
                serial: device.serial.clone(),
            },
        })
        .collect();

    VizDocument {
        version: VIZ_FORMAT_VERSION.to_string(),
        models,
        connections: topology.connections.clone(),
        metadata: topology.metadata.clone(),
    }
}
