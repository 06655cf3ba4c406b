//! fortimap - FortiGate network topology mapper.
//!
//! Queries a FortiGate appliance's REST API, assembles a
//! device/connection graph, and projects it into the JSON document
//! consumed by the browser-based 3D visualization tool.

// FortiGate REST client and the capability seam the aggregator consumes
pub mod client;

// Layered configuration (defaults → TOML → env → CLI)
pub mod config;

// Topology model and aggregation
pub mod topology;

// Visualization-format projection
pub mod viz;

// Re-export public types
pub use client::{ApplianceClient, ConnectivityError, FortiGateClient};
pub use config::{load_config, FortimapConfig};
pub use topology::{build_topology, Topology};
pub use viz::{export_visualization_format, VizDocument};
