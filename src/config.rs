use std::path::PathBuf;
use std::time::Duration;

use crate::alloc::RetryPolicy;

/// Protocol version announced to the node daemon during negotiation.
pub const PROTOCOL_VERSION: u32 = 1;

/// Signal forwarded to the remote task when the user interrupts (SIGINT).
pub const DEFAULT_FORWARD_SIGNAL: i32 = 2;

/// TLS configuration for connections to the control and node daemons.
///
/// When enabled, the client verifies daemon certificates against the cluster CA
/// and presents its own certificate for mutual TLS.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Enable TLS. If false, all other TLS settings are ignored.
    pub enabled: bool,

    /// Path to the CA certificate (PEM format).
    pub ca_cert_path: Option<PathBuf>,

    /// Path to the client certificate (PEM format).
    pub cert_path: Option<PathBuf>,

    /// Path to the client private key (PEM format).
    pub key_path: Option<PathBuf>,

    /// Name expected in daemon certificates. Daemons are reached by IP, so
    /// this is a cluster-wide name rather than a hostname.
    pub domain_name: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ca_cert_path: None,
            cert_path: None,
            key_path: None,
            domain_name: "slurmx-cluster".to_string(),
        }
    }
}

impl TlsConfig {
    /// Check if TLS is properly configured with all required files.
    pub fn is_complete(&self) -> bool {
        self.enabled
            && self.ca_cert_path.is_some()
            && self.cert_path.is_some()
            && self.key_path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control daemon address, `host:port` or a full URI.
    pub ctld_addr: String,
    pub protocol_version: u32,
    pub forward_signal: i32,
    /// Polling cadence while waiting for the control daemon to place the task.
    pub poll: RetryPolicy,
    pub tls: TlsConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ctld_addr: "127.0.0.1:50051".to_string(),
            protocol_version: PROTOCOL_VERSION,
            forward_signal: DEFAULT_FORWARD_SIGNAL,
            poll: RetryPolicy::default(),
            tls: TlsConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(ctld_addr: impl Into<String>) -> Self {
        Self {
            ctld_addr: ctld_addr.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll.interval = interval;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.poll.max_attempts = Some(attempts);
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll.timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_config_default() {
        let cfg = TlsConfig::default();
        assert!(!cfg.enabled);
        assert!(cfg.ca_cert_path.is_none());
        assert!(cfg.cert_path.is_none());
        assert!(cfg.key_path.is_none());
        assert_eq!(cfg.domain_name, "slurmx-cluster");
    }

    #[test]
    fn tls_config_is_not_complete_when_disabled() {
        let cfg = TlsConfig {
            enabled: false,
            ca_cert_path: Some(PathBuf::from("/ca.pem")),
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
            ..TlsConfig::default()
        };
        assert!(!cfg.is_complete());
    }

    #[test]
    fn tls_config_is_not_complete_when_path_missing() {
        let base = TlsConfig {
            enabled: true,
            ca_cert_path: Some(PathBuf::from("/ca.pem")),
            cert_path: Some(PathBuf::from("/cert.pem")),
            key_path: Some(PathBuf::from("/key.pem")),
            ..TlsConfig::default()
        };
        assert!(base.is_complete());

        let mut cfg = base.clone();
        cfg.ca_cert_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base.clone();
        cfg.cert_path = None;
        assert!(!cfg.is_complete());

        let mut cfg = base;
        cfg.key_path = None;
        assert!(!cfg.is_complete());
    }

    #[test]
    fn client_config_default() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.ctld_addr, "127.0.0.1:50051");
        assert_eq!(cfg.protocol_version, PROTOCOL_VERSION);
        assert_eq!(cfg.forward_signal, 2);
        assert_eq!(cfg.poll.interval, Duration::from_secs(1));
        assert!(cfg.poll.max_attempts.is_none());
        assert!(cfg.poll.timeout.is_none());
    }

    #[test]
    fn client_config_builders() {
        let cfg = ClientConfig::new("10.0.0.1:9000")
            .with_poll_interval(Duration::from_millis(250))
            .with_max_poll_attempts(10)
            .with_poll_timeout(Duration::from_secs(60));
        assert_eq!(cfg.ctld_addr, "10.0.0.1:9000");
        assert_eq!(cfg.poll.interval, Duration::from_millis(250));
        assert_eq!(cfg.poll.max_attempts, Some(10));
        assert_eq!(cfg.poll.timeout, Some(Duration::from_secs(60)));
    }
}
