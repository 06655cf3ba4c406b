use anyhow::{Context, Result};
use clap::Parser;
use fortimap::client::FortiGateClient;
use fortimap::config::{load_config, FortimapConfig};
use fortimap::topology::build_topology;
use fortimap::viz::export_visualization_format;
use std::path::Path;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fortimap")]
#[command(about = "Pull network topology from a FortiGate appliance")]
struct Args {
    /// FortiGate IP address or hostname
    #[arg(long)]
    host: Option<String>,

    /// FortiGate HTTPS port
    #[arg(long)]
    port: Option<u16>,

    /// FortiGate username (basic auth)
    #[arg(long)]
    username: Option<String>,

    /// FortiGate password (basic auth)
    #[arg(long)]
    password: Option<String>,

    /// REST API token (bearer auth, preferred over basic auth)
    #[arg(long)]
    token: Option<String>,

    /// Output file for the internal topology JSON
    #[arg(long)]
    output: Option<String>,

    /// Output file for the visualization-format JSON
    #[arg(long)]
    viz_output: Option<String>,

    /// Disable TLS certificate verification
    #[arg(long)]
    no_ssl_verify: bool,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<String>,

    /// Re-run discovery on the configured interval instead of exiting
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fortimap=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    info!(
        host = %config.fortigate.host,
        port = config.fortigate.port,
        verify_ssl = config.fortigate.verify_ssl,
        "Configuration loaded"
    );

    let client = FortiGateClient::new(&config.fortigate);

    // Connectivity is the only fatal failure; every fetch after this
    // point degrades to partial data.
    client
        .check_connectivity()
        .await
        .context("Failed to connect to FortiGate; check credentials and network connectivity")?;
    info!("Connected to FortiGate at {}", config.fortigate.host);

    if args.watch {
        info!(
            interval_seconds = config.poll.interval_seconds,
            "Watch mode: re-running discovery on interval"
        );
        let mut ticker = interval(Duration::from_secs(config.poll.interval_seconds));
        loop {
            ticker.tick().await;
            if let Err(e) = run_discovery(&client, &config).await {
                warn!("Discovery run failed: {:#}", e);
            }
        }
    }

    run_discovery(&client, &config).await
}

/// Merge defaults, optional TOML file, environment, and CLI flags into
/// the final configuration.
fn resolve_config(args: &Args) -> Result<FortimapConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => FortimapConfig::default(),
    };
    config.apply_env()?;

    if let Some(host) = &args.host {
        config.fortigate.host = host.clone();
    }
    if let Some(port) = args.port {
        config.fortigate.port = port;
    }
    if let Some(username) = &args.username {
        config.fortigate.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        config.fortigate.password = Some(password.clone());
    }
    if let Some(token) = &args.token {
        config.fortigate.api_token = Some(token.clone());
    }
    if let Some(output) = &args.output {
        config.output.topology_file = output.clone();
    }
    if let Some(viz_output) = &args.viz_output {
        config.output.viz_file = viz_output.clone();
    }
    if args.no_ssl_verify {
        config.fortigate.verify_ssl = false;
    }

    Ok(config)
}

/// One full discovery pass: build the graph and replace both output files.
async fn run_discovery(client: &FortiGateClient, config: &FortimapConfig) -> Result<()> {
    let topology = build_topology(client).await;
    write_json(&config.output.topology_file, &topology)?;

    let viz = export_visualization_format(&topology);
    write_json(&config.output.viz_file, &viz)?;

    info!(
        devices = topology.devices.len(),
        connections = topology.connections.len(),
        topology_file = %config.output.topology_file,
        viz_file = %config.output.viz_file,
        "Topology written"
    );
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &str, value: &T) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
    Ok(())
}
