// Configuration types module
// Defines all configuration-related data structures

use serde::Deserialize;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address every listener binds to
    pub host: String,
    pub workers: Option<usize>,
    /// Directory static files are served from
    pub working_directory: String,
    /// Run the TLS listener
    pub secure_run: bool,
    /// Run the plaintext listener
    pub insecure_run: bool,
    /// Allow plaintext connections to reach API endpoints
    pub insecure_api: bool,
    pub secure_ports: Vec<u16>,
    pub insecure_ports: Vec<u16>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            workers: None,
            working_directory: "./site".to_string(),
            secure_run: true,
            insecure_run: true,
            insecure_api: false,
            secure_ports: vec![441],
            insecure_ports: vec![80],
        }
    }
}

/// Certificate material for the secure listener
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// PEM certificate chain
    #[serde(default)]
    pub cert_file: Option<String>,
    /// PEM private key (PKCS#8, PKCS#1 or SEC1)
    #[serde(default)]
    pub key_file: Option<String>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            access_log: true,
            access_log_format: default_access_log_format(),
            access_log_file: None,
            error_log_file: None,
        }
    }
}

/// Connection handling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive: bool,
    /// Upper bound on a connection's lifetime, in seconds (0 disables)
    pub connection_timeout: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            keep_alive: true,
            connection_timeout: 75,
        }
    }
}
