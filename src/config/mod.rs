// Configuration module entry point
// Loads settings from file, environment and defaults

mod types;

use crate::error::{ServerError, ServerResult};
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

// Re-export public types
pub use types::{Config, LoggingConfig, PerformanceConfig, ServerConfig, TlsConfig};

impl Config {
    /// Load configuration from specified file path (extension optional)
    ///
    /// A missing file is not an error; defaults and `SERVER_` environment
    /// variables fill in.
    pub fn load_from(config_path: &str) -> ServerResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("SERVER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.secure_ports")
                    .with_list_parse_key("server.insecure_ports"),
            )
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.working_directory", "./site")?
            .set_default("server.secure_run", true)?
            .set_default("server.insecure_run", true)?
            .set_default("server.insecure_api", false)?
            .set_default("server.secure_ports", vec![441_i64])?
            .set_default("server.insecure_ports", vec![80_i64])?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive", true)?
            .set_default("performance.connection_timeout", 75)?
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from the current directory
    pub fn load() -> ServerResult<Self> {
        Self::load_from("config")
    }

    /// Reject combinations the server cannot start with
    pub fn validate(&self) -> ServerResult<()> {
        if self.server.secure_run && (self.tls.cert_file.is_none() || self.tls.key_file.is_none())
        {
            return Err(ServerError::Config(
                "secure_run requires tls.cert_file and tls.key_file".to_string(),
            ));
        }
        self.host_ip().map(|_| ())
    }

    fn host_ip(&self) -> ServerResult<IpAddr> {
        self.server
            .host
            .parse()
            .map_err(|_| ServerError::InvalidAddress(self.server.host.clone()))
    }

    /// Bind addresses of the secure listener
    pub fn secure_addrs(&self) -> ServerResult<Vec<SocketAddr>> {
        let ip = self.host_ip()?;
        Ok(self.server.secure_ports.iter().map(|port| SocketAddr::new(ip, *port)).collect())
    }

    /// Bind addresses of the plaintext listener
    pub fn insecure_addrs(&self) -> ServerResult<Vec<SocketAddr>> {
        let ip = self.host_ip()?;
        Ok(self.server.insecure_ports.iter().map(|port| SocketAddr::new(ip, *port)).collect())
    }

    /// Working directory, normalized and without trailing separator
    pub fn working_directory(&self) -> PathBuf {
        normalize_working_directory(&self.server.working_directory)
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        match self.performance.connection_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Lexically normalize a directory path
///
/// Drops `.` segments, folds `name/..` pairs, collapses repeated
/// separators and removes any trailing separator. Leading `..` segments of
/// a relative path are kept.
pub fn normalize_working_directory(dir: &str) -> PathBuf {
    let mut out = PathBuf::new();
    for component in Path::new(dir).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}
