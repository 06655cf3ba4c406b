//! Topology aggregation: one linear batch pass over the appliance's
//! REST endpoints, rebuilding the full graph from scratch each run.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use super::{Connection, ConnectionType, Device, DeviceType, Position, Topology, TopologyMetadata};
use crate::client::ApplianceClient;

/// Id of the appliance root device. Downstream consumers key off this
/// constant, so it must never change.
pub const ROOT_DEVICE_ID: &str = "fortigate_main";

/// Hard caps per tier. Truncation is silent; `device_counts` still
/// reflects the raw fetched lengths.
pub const MAX_SWITCHES: usize = 10;
pub const MAX_ACCESS_POINTS: usize = 20;
pub const MAX_ENDPOINTS: usize = 50;

const SWITCH_BANDWIDTH_MBPS: u64 = 1000;
const ENDPOINT_BANDWIDTH_MBPS: u64 = 100;

/// Build the full device/connection graph from the appliance.
///
/// Strictly sequential: status → info → interfaces → switches → access
/// points → user devices. Every fetch is best-effort: a failed
/// endpoint contributes nothing and the pass continues, so the result
/// is never an error, only a possibly partial graph.
pub async fn build_topology(client: &dyn ApplianceClient) -> Topology {
    info!("Building network topology from {}", client.host());

    let system_status = client.get_system_status().await;
    let system_info = client.get_system_info().await;

    let mut devices = Vec::new();
    let mut connections = Vec::new();

    devices.push(root_device(&system_status, &system_info, client.host()));

    // Interfaces: only operational ones. "up" is matched exactly;
    // the appliance reports lowercase and consumers depend on it.
    let interfaces = client.get_interfaces().await;
    let up_count = {
        let up: Vec<&Value> = interfaces
            .iter()
            .filter(|iface| iface.get("status").and_then(Value::as_str) == Some("up"))
            .collect();
        for iface in &up {
            let device = interface_device(iface);
            connections.push(Connection {
                source: ROOT_DEVICE_ID.to_string(),
                target: device.id.clone(),
                connection_type: ConnectionType::Network,
                bandwidth: iface.get("speed").and_then(Value::as_u64).unwrap_or(0),
            });
            devices.push(device);
        }
        up.len()
    };

    let switches = client.get_managed_switches().await;
    add_tier(
        &mut devices,
        &mut connections,
        &switches,
        MAX_SWITCHES,
        ConnectionType::Network,
        switch_device,
        |_| SWITCH_BANDWIDTH_MBPS,
    );

    let access_points = client.get_wifi_ap_list().await;
    add_tier(
        &mut devices,
        &mut connections,
        &access_points,
        MAX_ACCESS_POINTS,
        ConnectionType::Wifi,
        access_point_device,
        |ap| {
            ap.pointer("/radio_1/max_bandwidth")
                .and_then(Value::as_u64)
                .unwrap_or(0)
        },
    );

    let user_devices = client.get_user_devices().await;
    add_tier(
        &mut devices,
        &mut connections,
        &user_devices,
        MAX_ENDPOINTS,
        ConnectionType::Endpoint,
        endpoint_device,
        |_| ENDPOINT_BANDWIDTH_MBPS,
    );

    // Counts use the raw (pre-cap) lengths for switches/APs/endpoints
    // and the post-filter count for interfaces. The mismatch with the
    // capped device list is long-standing behavior consumers expect.
    let mut device_counts = BTreeMap::new();
    device_counts.insert(DeviceType::Firewall, 1);
    device_counts.insert(DeviceType::Switch, switches.len());
    device_counts.insert(DeviceType::AccessPoint, access_points.len());
    device_counts.insert(DeviceType::Endpoint, user_devices.len());
    device_counts.insert(DeviceType::Interface, up_count);

    let topology = Topology {
        devices,
        connections,
        metadata: TopologyMetadata {
            last_updated: Utc::now(),
            device_counts,
        },
    };

    info!(
        "Built topology with {} devices and {} connections",
        topology.devices.len(),
        topology.connections.len()
    );
    topology
}

/// One tier pass: take up to `cap` records, map each to a device, and
/// link it back to the root. Shared by the switch/AP/endpoint tiers,
/// which differ only in mapper, cap, and bandwidth rule.
fn add_tier(
    devices: &mut Vec<Device>,
    connections: &mut Vec<Connection>,
    records: &[Value],
    cap: usize,
    connection_type: ConnectionType,
    to_device: impl Fn(usize, &Value) -> Device,
    bandwidth: impl Fn(&Value) -> u64,
) {
    for (index, record) in records.iter().take(cap).enumerate() {
        let device = to_device(index, record);
        connections.push(Connection {
            source: ROOT_DEVICE_ID.to_string(),
            target: device.id.clone(),
            connection_type,
            bandwidth: bandwidth(record),
        });
        devices.push(device);
    }
}

fn root_device(status: &Value, info: &Value, host: &str) -> Device {
    // cmdb system/global returns `results` as an object on some
    // firmware lines and a single-element list on others.
    let info_results = match info.get("results") {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::Array(items)) => items.first().cloned().unwrap_or_else(|| json!({})),
        _ => json!({}),
    };

    let model = status
        .get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            info_results
                .get("platform_str")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "Unknown".to_string());

    let mut metadata = Map::new();
    metadata.insert(
        "status".to_string(),
        status.get("status").cloned().unwrap_or_else(|| json!("unknown")),
    );
    metadata.insert("version".to_string(), json!(str_field(status, "version", "Unknown")));
    metadata.insert(
        "cpu_usage".to_string(),
        status.get("cpu_usage").cloned().unwrap_or_else(|| json!(0)),
    );
    metadata.insert(
        "memory_usage".to_string(),
        status.get("mem_usage").cloned().unwrap_or_else(|| json!(0)),
    );
    metadata.insert(
        "uptime".to_string(),
        status.get("uptime").cloned().unwrap_or_else(|| json!(0)),
    );

    Device {
        id: ROOT_DEVICE_ID.to_string(),
        name: str_field(status, "hostname", "FortiGate"),
        device_type: DeviceType::Firewall,
        model,
        serial: str_field(status, "serial", "Unknown"),
        ip: host.to_string(),
        position: Position::new(0.0, 0.0, 0.0),
        metadata,
    }
}

fn interface_device(iface: &Value) -> Device {
    let mut metadata = Map::new();
    metadata.insert(
        "mac".to_string(),
        iface.get("macaddr").cloned().unwrap_or_else(|| json!("")),
    );
    metadata.insert(
        "mtu".to_string(),
        iface.get("mtu").cloned().unwrap_or_else(|| json!(1500)),
    );
    metadata.insert(
        "speed".to_string(),
        iface.get("speed").cloned().unwrap_or_else(|| json!(0)),
    );
    metadata.insert(
        "subnet".to_string(),
        iface.get("subnet").cloned().unwrap_or_else(|| json!("")),
    );

    Device {
        id: format!("interface_{}", str_field(iface, "name", "unknown")),
        name: str_field(iface, "name", "Unknown Interface"),
        device_type: DeviceType::Interface,
        model: String::new(),
        serial: String::new(),
        ip: str_field(iface, "ip", ""),
        position: Position::new(2.0, 0.0, 0.0),
        metadata,
    }
}

fn switch_device(index: usize, switch: &Value) -> Device {
    let mut metadata = Map::new();
    metadata.insert(
        "status".to_string(),
        switch.get("status").cloned().unwrap_or_else(|| json!("unknown")),
    );
    metadata.insert(
        "ports".to_string(),
        switch.get("num_ports").cloned().unwrap_or_else(|| json!(0)),
    );
    metadata.insert(
        "firmware".to_string(),
        json!(str_field(switch, "sw_version", "Unknown")),
    );

    Device {
        id: format!(
            "switch_{}",
            str_field_or_else(switch, "name", || format!("switch_{}", index))
        ),
        name: str_field_or_else(switch, "name", || format!("Switch {}", index)),
        device_type: DeviceType::Switch,
        model: str_field(switch, "model", "Unknown"),
        serial: str_field(switch, "serial", "Unknown"),
        ip: str_field(switch, "ip", ""),
        position: Position::new(-3.0, 0.0, index as f64 * 2.0),
        metadata,
    }
}

fn access_point_device(index: usize, ap: &Value) -> Device {
    let mut metadata = Map::new();
    metadata.insert(
        "status".to_string(),
        ap.get("status").cloned().unwrap_or_else(|| json!("unknown")),
    );
    metadata.insert(
        "wifi_clients".to_string(),
        ap.get("wifi_clients").cloned().unwrap_or_else(|| json!(0)),
    );
    metadata.insert(
        "radio_1".to_string(),
        ap.get("radio_1").cloned().unwrap_or_else(|| json!({})),
    );
    metadata.insert(
        "radio_2".to_string(),
        ap.get("radio_2").cloned().unwrap_or_else(|| json!({})),
    );

    Device {
        id: format!(
            "ap_{}",
            str_field_or_else(ap, "name", || format!("ap_{}", index))
        ),
        name: str_field_or_else(ap, "name", || format!("AP {}", index)),
        device_type: DeviceType::AccessPoint,
        model: str_field(ap, "model", "Unknown"),
        serial: str_field(ap, "serial", "Unknown"),
        ip: str_field(ap, "ip", ""),
        position: Position::new(3.0, 0.0, index as f64 * 1.5),
        metadata,
    }
}

fn endpoint_device(index: usize, device: &Value) -> Device {
    // Id derives from the MAC with colons replaced; without a MAC the
    // index-based fallback yields "device_device_{i}".
    let id_part = device
        .get("mac")
        .and_then(Value::as_str)
        .map(|mac| mac.replace(':', "_"))
        .unwrap_or_else(|| format!("device_{}", index));

    let mut metadata = Map::new();
    metadata.insert(
        "mac".to_string(),
        device.get("mac").cloned().unwrap_or_else(|| json!("")),
    );
    metadata.insert("os".to_string(), json!(str_field(device, "os_type", "Unknown")));
    metadata.insert("user".to_string(), json!(str_field(device, "user", "Unknown")));
    metadata.insert(
        "last_seen".to_string(),
        device.get("last_seen").cloned().unwrap_or_else(|| json!("")),
    );
    metadata.insert(
        "device_type".to_string(),
        json!(str_field(device, "devtype", "Unknown")),
    );

    Device {
        id: format!("device_{}", id_part),
        name: str_field_or_else(device, "hostname", || format!("Device {}", index)),
        device_type: DeviceType::Endpoint,
        model: String::new(),
        serial: String::new(),
        ip: str_field(device, "ip", ""),
        position: Position::new(5.0, 0.0, index as f64 * 0.5),
        metadata,
    }
}

fn str_field(value: &Value, key: &str, default: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| default.to_string())
}

fn str_field_or_else(value: &Value, key: &str, default: impl FnOnce() -> String) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Canned-response client for exercising the aggregation pass.
    #[derive(Default)]
    struct StubClient {
        status: Value,
        info: Value,
        interfaces: Vec<Value>,
        switches: Vec<Value>,
        access_points: Vec<Value>,
        user_devices: Vec<Value>,
    }

    #[async_trait]
    impl ApplianceClient for StubClient {
        fn host(&self) -> &str {
            "192.0.2.1"
        }

        async fn get_system_status(&self) -> Value {
            self.status.clone()
        }

        async fn get_system_info(&self) -> Value {
            self.info.clone()
        }

        async fn get_interfaces(&self) -> Vec<Value> {
            self.interfaces.clone()
        }

        async fn get_managed_switches(&self) -> Vec<Value> {
            self.switches.clone()
        }

        async fn get_wifi_ap_list(&self) -> Vec<Value> {
            self.access_points.clone()
        }

        async fn get_user_devices(&self) -> Vec<Value> {
            self.user_devices.clone()
        }
    }

    #[tokio::test]
    async fn test_all_endpoints_failed_yields_root_only() {
        let client = StubClient {
            status: json!({}),
            info: json!({}),
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        assert_eq!(topology.devices.len(), 1);
        assert!(topology.connections.is_empty());

        let root = &topology.devices[0];
        assert_eq!(root.id, ROOT_DEVICE_ID);
        assert_eq!(root.name, "FortiGate");
        assert_eq!(root.device_type, DeviceType::Firewall);
        assert_eq!(root.model, "Unknown");
        assert_eq!(root.serial, "Unknown");
        assert_eq!(root.ip, "192.0.2.1");
        assert_eq!(root.position, Position::new(0.0, 0.0, 0.0));

        let counts = &topology.metadata.device_counts;
        assert_eq!(counts[&DeviceType::Firewall], 1);
        assert_eq!(counts[&DeviceType::Switch], 0);
        assert_eq!(counts[&DeviceType::Interface], 0);
    }

    #[tokio::test]
    async fn test_switch_cap_preserves_raw_count() {
        let switches: Vec<Value> = (0..12)
            .map(|i| json!({"name": format!("sw{}", i), "serial": format!("S{}", i)}))
            .collect();
        let client = StubClient {
            switches,
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        let switch_devices: Vec<_> = topology
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Switch)
            .collect();
        assert_eq!(switch_devices.len(), MAX_SWITCHES);
        assert_eq!(topology.metadata.device_counts[&DeviceType::Switch], 12);

        // Positions spread along z in discovery order.
        assert_eq!(switch_devices[0].position, Position::new(-3.0, 0.0, 0.0));
        assert_eq!(switch_devices[2].position, Position::new(-3.0, 0.0, 4.0));

        for conn in &topology.connections {
            assert_eq!(conn.connection_type, ConnectionType::Network);
            assert_eq!(conn.bandwidth, 1000);
            assert_eq!(conn.source, ROOT_DEVICE_ID);
        }
    }

    #[tokio::test]
    async fn test_interface_status_match_is_case_sensitive() {
        let client = StubClient {
            interfaces: vec![
                json!({"name": "wan1", "status": "up"}),
                json!({"name": "wan2", "status": "UP"}),
                json!({"name": "lan1", "status": "Up"}),
                json!({"name": "lan2", "status": "down"}),
            ],
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        let interface_devices: Vec<_> = topology
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Interface)
            .collect();
        assert_eq!(interface_devices.len(), 1);
        assert_eq!(interface_devices[0].id, "interface_wan1");
        assert_eq!(topology.metadata.device_counts[&DeviceType::Interface], 1);
    }

    #[tokio::test]
    async fn test_single_up_interface_scenario() {
        let client = StubClient {
            interfaces: vec![
                json!({"name": "wan1", "status": "up"}),
                json!({"name": "wan2", "status": "down"}),
            ],
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        // Root plus exactly one interface device and one connection.
        assert_eq!(topology.devices.len(), 2);
        assert_eq!(topology.connections.len(), 1);
        assert_eq!(topology.devices[1].id, "interface_wan1");
        assert_eq!(topology.connections[0].source, ROOT_DEVICE_ID);
        assert_eq!(topology.connections[0].target, "interface_wan1");
        assert_eq!(topology.connections[0].connection_type, ConnectionType::Network);
    }

    #[tokio::test]
    async fn test_interfaces_all_pinned_to_same_position() {
        let client = StubClient {
            interfaces: vec![
                json!({"name": "wan1", "status": "up"}),
                json!({"name": "lan1", "status": "up"}),
            ],
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        for device in topology.devices.iter().skip(1) {
            assert_eq!(device.position, Position::new(2.0, 0.0, 0.0));
        }
    }

    #[tokio::test]
    async fn test_endpoint_id_from_mac() {
        let client = StubClient {
            user_devices: vec![
                json!({"mac": "aa:bb:cc:dd:ee:ff", "hostname": "laptop"}),
                json!({"hostname": "mystery-box"}),
            ],
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        let endpoints: Vec<_> = topology
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Endpoint)
            .collect();
        assert_eq!(endpoints[0].id, "device_aa_bb_cc_dd_ee_ff");
        assert_eq!(endpoints[0].name, "laptop");
        // No MAC: index-based fallback.
        assert_eq!(endpoints[1].id, "device_device_1");
        assert_eq!(endpoints[1].name, "mystery-box");

        for conn in &topology.connections {
            assert_eq!(conn.connection_type, ConnectionType::Endpoint);
            assert_eq!(conn.bandwidth, 100);
        }
    }

    #[tokio::test]
    async fn test_endpoint_cap_preserves_raw_count() {
        let user_devices: Vec<Value> = (0..55)
            .map(|i| json!({"mac": format!("00:00:00:00:00:{:02x}", i)}))
            .collect();
        let client = StubClient {
            user_devices,
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        let endpoints = topology
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::Endpoint)
            .count();
        assert_eq!(endpoints, MAX_ENDPOINTS);
        assert_eq!(topology.metadata.device_counts[&DeviceType::Endpoint], 55);
    }

    #[tokio::test]
    async fn test_access_point_bandwidth_from_radio() {
        let client = StubClient {
            access_points: vec![
                json!({"name": "ap-lobby", "radio_1": {"max_bandwidth": 867}}),
                json!({"name": "ap-attic"}),
            ],
            ..Default::default()
        };

        let topology = build_topology(&client).await;

        assert_eq!(topology.connections[0].connection_type, ConnectionType::Wifi);
        assert_eq!(topology.connections[0].bandwidth, 867);
        assert_eq!(topology.connections[1].bandwidth, 0);

        let aps: Vec<_> = topology
            .devices
            .iter()
            .filter(|d| d.device_type == DeviceType::AccessPoint)
            .collect();
        assert_eq!(aps[0].id, "ap_ap-lobby");
        assert_eq!(aps[1].position, Position::new(3.0, 0.0, 1.5));
    }

    #[tokio::test]
    async fn test_root_model_falls_back_to_platform_str() {
        let client = StubClient {
            status: json!({"hostname": "fw-lab", "serial": "FGT1"}),
            info: json!({"results": {"platform_str": "FortiGate-61F"}}),
            ..Default::default()
        };

        let topology = build_topology(&client).await;
        assert_eq!(topology.devices[0].model, "FortiGate-61F");
        assert_eq!(topology.devices[0].name, "fw-lab");
    }

    #[tokio::test]
    async fn test_root_model_from_list_shaped_info() {
        let client = StubClient {
            status: json!({}),
            info: json!({"results": [{"platform_str": "FortiGate-100F"}]}),
            ..Default::default()
        };

        let topology = build_topology(&client).await;
        assert_eq!(topology.devices[0].model, "FortiGate-100F");
    }

    #[tokio::test]
    async fn test_interface_connection_bandwidth_from_speed() {
        let client = StubClient {
            interfaces: vec![json!({"name": "wan1", "status": "up", "speed": 1000})],
            ..Default::default()
        };

        let topology = build_topology(&client).await;
        assert_eq!(topology.connections[0].bandwidth, 1000);
    }
}
