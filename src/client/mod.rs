use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub mod fortigate;

pub use fortigate::FortiGateClient;

/// Fatal connectivity failure raised before aggregation starts.
///
/// Everything after the initial connectivity check is best-effort;
/// this error aborts the run with a non-zero exit.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectivityError {
    /// Transport-level failure (DNS, TCP, TLS, timeout)
    Unreachable(String),
    /// The appliance rejected the credentials (HTTP 401/403, or a
    /// non-JSON login page in place of an API response)
    AuthRejected(String),
    /// Any other non-success HTTP status
    Http(u16),
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityError::Unreachable(msg) => {
                write!(f, "appliance unreachable: {}", msg)
            }
            ConnectivityError::AuthRejected(msg) => {
                write!(f, "authentication rejected: {}", msg)
            }
            ConnectivityError::Http(status) => {
                write!(f, "unexpected HTTP status {}", status)
            }
        }
    }
}

impl std::error::Error for ConnectivityError {}

/// Read-only capability interface over the appliance REST API.
///
/// The aggregator consumes this trait rather than a concrete client so
/// tests can substitute canned responses. Implementations must not
/// propagate errors from the fetch methods: a failed or non-200 call
/// degrades to empty data (logged), and aggregation continues with
/// whatever was retrieved.
#[async_trait]
pub trait ApplianceClient: Send + Sync {
    /// Appliance address; used as the root device IP.
    fn host(&self) -> &str;

    /// System status record, merged with its nested `results` object.
    /// Returns an empty object on failure.
    async fn get_system_status(&self) -> Value;

    /// Raw global-settings response. Returns an empty object on failure.
    async fn get_system_info(&self) -> Value;

    /// Network interfaces. Empty on failure.
    async fn get_interfaces(&self) -> Vec<Value>;

    /// Managed switches. Empty on failure.
    async fn get_managed_switches(&self) -> Vec<Value>;

    /// Managed wireless access points. Empty on failure.
    async fn get_wifi_ap_list(&self) -> Vec<Value>;

    /// Connected user devices (endpoints). Empty on failure.
    async fn get_user_devices(&self) -> Vec<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_error_display() {
        let err = ConnectivityError::AuthRejected("HTTP 401".to_string());
        assert_eq!(err.to_string(), "authentication rejected: HTTP 401");

        let err = ConnectivityError::Http(503);
        assert_eq!(err.to_string(), "unexpected HTTP status 503");

        let err = ConnectivityError::Unreachable("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
