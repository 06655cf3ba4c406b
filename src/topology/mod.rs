use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub mod builder;

pub use builder::build_topology;

/// Category of a discovered device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Firewall,
    Switch,
    AccessPoint,
    Endpoint,
    Interface,
}

/// Link category for a connection back to the appliance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Network,
    Wifi,
    Endpoint,
}

/// Static layout hint consumed by the visualization layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A device discovered during one aggregation run.
///
/// Devices are rebuilt from scratch on every run; there is no
/// update/delete lifecycle and nothing is persisted between runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Device {
    /// Unique identifier (e.g., "fortigate_main", "interface_wan1")
    pub id: String,

    /// Human-readable display name
    pub name: String,

    /// Device category
    #[serde(rename = "type")]
    pub device_type: DeviceType,

    /// Hardware model, or "" when the appliance did not report one
    #[serde(default)]
    pub model: String,

    /// Serial number, or "" when not reported
    #[serde(default)]
    pub serial: String,

    /// IP address, or "" when not reported
    #[serde(default)]
    pub ip: String,

    /// Static layout position
    pub position: Position,

    /// Open string-keyed map of per-device details (status, radios, OS, ...)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Directed link between two devices.
///
/// Connections are not deduplicated: multiple links between the same
/// pair are legal (one per interface/device found).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Connection {
    /// Source device id
    pub source: String,

    /// Target device id
    pub target: String,

    /// Link category
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,

    /// Link bandwidth in Mbps (0 when unknown)
    pub bandwidth: u64,
}

/// Run-level metadata stamped by the aggregator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopologyMetadata {
    /// Wall-clock time the topology was assembled (ISO-8601)
    pub last_updated: DateTime<Utc>,

    /// Per-category device counts.
    ///
    /// Switch/access-point/endpoint counts reflect the raw fetched
    /// lengths, not the capped subset present in `devices`. This is a
    /// known quirk of the discovery pipeline that downstream consumers
    /// rely on.
    pub device_counts: BTreeMap<DeviceType, usize>,
}

/// The in-memory graph of discovered devices and their connections to
/// the appliance.
///
/// Every connection's source/target is expected to reference a device
/// id present in `devices`; the builder satisfies this by construction
/// but the invariant is not validated here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topology {
    pub devices: Vec<Device>,
    pub connections: Vec<Connection>,
    pub metadata: TopologyMetadata,
}
