use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete fortimap configuration.
///
/// Resolution order: built-in defaults, then an optional TOML file,
/// then `FORTIGATE_*` environment variables, then CLI flags. The
/// resolved struct is constructed once at startup and passed by
/// reference; there is no ambient global state.
#[derive(Debug, Clone, Deserialize)]
pub struct FortimapConfig {
    #[serde(default)]
    pub fortigate: FortiGateConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

/// FortiGate connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FortiGateConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// HTTPS port; appliances commonly move the admin API off 443
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// REST API token; preferred over username/password when set
    #[serde(default)]
    pub api_token: Option<String>,
    /// Verify the appliance TLS certificate (off by default; most
    /// appliances run self-signed)
    #[serde(default)]
    pub verify_ssl: bool,
}

fn default_host() -> String {
    "192.168.0.254".to_string()
}

fn default_port() -> u16 {
    10443
}

impl Default for FortiGateConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            api_token: None,
            verify_ssl: false,
        }
    }
}

/// Output file settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Internal topology JSON
    #[serde(default = "default_topology_file")]
    pub topology_file: String,
    /// Visualization-format JSON
    #[serde(default = "default_viz_file")]
    pub viz_file: String,
}

fn default_topology_file() -> String {
    "fortinet_topology.json".to_string()
}

fn default_viz_file() -> String {
    "babylon_topology.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            topology_file: default_topology_file(),
            viz_file: default_viz_file(),
        }
    }
}

/// Watch-mode settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// How often to re-run discovery in watch mode (seconds)
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,
}

fn default_poll_interval() -> u64 {
    300
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
        }
    }
}

impl Default for FortimapConfig {
    fn default() -> Self {
        Self {
            fortigate: FortiGateConfig::default(),
            output: OutputConfig::default(),
            poll: PollConfig::default(),
        }
    }
}

impl FortimapConfig {
    /// Overlay environment variables onto this config.
    ///
    /// Variable names follow the existing `.env` contract:
    /// `FORTIGATE_HOST`, `FORTIGATE_PORT`, `FORTIGATE_USERNAME`,
    /// `FORTIGATE_PASSWORD`, `FORTIGATE_API_TOKEN`,
    /// `FORTIGATE_VERIFY_SSL`, `TOPOLOGY_FILE`, `BABYLON_FILE`,
    /// `AUTO_REFRESH_INTERVAL`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("FORTIGATE_HOST") {
            self.fortigate.host = host;
        }
        if let Ok(port) = std::env::var("FORTIGATE_PORT") {
            self.fortigate.port = port
                .parse()
                .context("FORTIGATE_PORT must be a valid port number")?;
        }
        if let Ok(username) = std::env::var("FORTIGATE_USERNAME") {
            self.fortigate.username = Some(username);
        }
        if let Ok(password) = std::env::var("FORTIGATE_PASSWORD") {
            self.fortigate.password = Some(password);
        }
        if let Ok(token) = std::env::var("FORTIGATE_API_TOKEN") {
            self.fortigate.api_token = Some(token);
        }
        if let Ok(verify) = std::env::var("FORTIGATE_VERIFY_SSL") {
            self.fortigate.verify_ssl = verify.to_lowercase() == "true";
        }
        if let Ok(path) = std::env::var("TOPOLOGY_FILE") {
            self.output.topology_file = path;
        }
        if let Ok(path) = std::env::var("BABYLON_FILE") {
            self.output.viz_file = path;
        }
        if let Ok(interval) = std::env::var("AUTO_REFRESH_INTERVAL") {
            self.poll.interval_seconds = interval
                .parse()
                .context("AUTO_REFRESH_INTERVAL must be a number of seconds")?;
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FortimapConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: FortimapConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize all env-var-mutating tests to avoid race conditions between
    // tests that run concurrently but share the process-wide env.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_default_config() {
        let config = FortimapConfig::default();
        assert_eq!(config.fortigate.host, "192.168.0.254");
        assert_eq!(config.fortigate.port, 10443);
        assert_eq!(config.fortigate.verify_ssl, false);
        assert_eq!(config.output.topology_file, "fortinet_topology.json");
        assert_eq!(config.output.viz_file, "babylon_topology.json");
        assert_eq!(config.poll.interval_seconds, 300);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [fortigate]
            host = "fw.example.net"
            port = 443
            api_token = "abc123"
            verify_ssl = true

            [output]
            topology_file = "/var/lib/fortimap/topology.json"
            viz_file = "/var/lib/fortimap/viz.json"

            [poll]
            interval_seconds = 60
        "#;

        let config: FortimapConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.fortigate.host, "fw.example.net");
        assert_eq!(config.fortigate.port, 443);
        assert_eq!(config.fortigate.api_token.as_deref(), Some("abc123"));
        assert_eq!(config.fortigate.verify_ssl, true);
        assert_eq!(config.output.topology_file, "/var/lib/fortimap/topology.json");
        assert_eq!(config.poll.interval_seconds, 60);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [fortigate]
            host = "10.0.0.1"
        "#;

        let config: FortimapConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.fortigate.host, "10.0.0.1");
        assert_eq!(config.fortigate.port, 10443); // Default
        assert_eq!(config.output.viz_file, "babylon_topology.json"); // Default
    }

    #[test]
    fn test_apply_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("FORTIGATE_HOST", "172.16.0.1");
        std::env::set_var("FORTIGATE_PORT", "8443");
        std::env::set_var("FORTIGATE_API_TOKEN", "env-token");
        std::env::set_var("FORTIGATE_VERIFY_SSL", "TRUE");

        let mut config = FortimapConfig::default();
        config.apply_env().unwrap();

        assert_eq!(config.fortigate.host, "172.16.0.1");
        assert_eq!(config.fortigate.port, 8443);
        assert_eq!(config.fortigate.api_token.as_deref(), Some("env-token"));
        assert_eq!(config.fortigate.verify_ssl, true);

        std::env::remove_var("FORTIGATE_HOST");
        std::env::remove_var("FORTIGATE_PORT");
        std::env::remove_var("FORTIGATE_API_TOKEN");
        std::env::remove_var("FORTIGATE_VERIFY_SSL");
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fortimap.toml");
        std::fs::write(&path, "[fortigate]\nhost = \"fw.lab\"\nport = 443\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.fortigate.host, "fw.lab");
        assert_eq!(config.fortigate.port, 443);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/fortimap.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_rejects_bad_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var("FORTIGATE_PORT", "not-a-port");

        let mut config = FortimapConfig::default();
        let result = config.apply_env();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("FORTIGATE_PORT"));

        std::env::remove_var("FORTIGATE_PORT");
    }
}
