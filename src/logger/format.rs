//! Access log format module
//!
//! Supported formats:
//! - `combined` (Apache/Nginx combined format)
//! - `common` (Common Log Format)
//! - `json` (one JSON object per line)
//! - anything else is treated as a pattern with `$variables`

use chrono::{DateTime, Local};
use serde::Serialize;
use std::net::SocketAddr;

const CLF_TIME: &str = "%d/%b/%Y:%H:%M:%S %z";

/// One served request
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    pub remote_addr: SocketAddr,
    pub time: DateTime<Local>,
    pub method: String,
    /// Request target as received (path and query)
    pub target: String,
    /// "https" for the secure listener, "http" otherwise
    pub scheme: &'static str,
    pub http_version: String,
    pub status: u16,
    /// Body size when known up front; streamed files report none
    pub body_bytes: Option<usize>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub request_time_us: u64,
}

impl AccessLogEntry {
    pub fn new(remote_addr: SocketAddr, method: String, target: String, secure: bool) -> Self {
        Self {
            remote_addr,
            time: Local::now(),
            method,
            target,
            scheme: if secure { "https" } else { "http" },
            http_version: "1.1".to_string(),
            status: 200,
            body_bytes: None,
            referer: None,
            user_agent: None,
            request_time_us: 0,
        }
    }

    /// Render according to `format`
    pub fn format(&self, format: &str) -> String {
        match format {
            "combined" => format!(
                "{} \"{}\" \"{}\"",
                self.common_line(),
                self.referer.as_deref().unwrap_or("-"),
                self.user_agent.as_deref().unwrap_or("-"),
            ),
            "common" => self.common_line(),
            "json" => serde_json::to_string(self).unwrap_or_default(),
            pattern => self.expand(pattern),
        }
    }

    fn request_line(&self) -> String {
        format!("{} {} HTTP/{}", self.method, self.target, self.http_version)
    }

    fn body_bytes_field(&self) -> String {
        self.body_bytes
            .map_or_else(|| "-".to_string(), |n| n.to_string())
    }

    fn common_line(&self) -> String {
        format!(
            "{} - - [{}] \"{}\" {} {}",
            self.remote_addr.ip(),
            self.time.format(CLF_TIME),
            self.request_line(),
            self.status,
            self.body_bytes_field(),
        )
    }

    /// Substitute `$variables` in a custom pattern
    fn expand(&self, pattern: &str) -> String {
        #[allow(clippy::cast_precision_loss)]
        let seconds = self.request_time_us as f64 / 1_000_000.0;

        // Longer names first so `$request_time` is not eaten by `$request`
        let vars = [
            ("$remote_addr", self.remote_addr.ip().to_string()),
            ("$remote_port", self.remote_addr.port().to_string()),
            ("$time_local", self.time.format(CLF_TIME).to_string()),
            ("$time_iso8601", self.time.to_rfc3339()),
            ("$request_time", format!("{seconds:.3}")),
            ("$request_method", self.method.clone()),
            ("$request_uri", self.target.clone()),
            ("$request", self.request_line()),
            ("$scheme", self.scheme.to_string()),
            ("$status", self.status.to_string()),
            ("$body_bytes_sent", self.body_bytes_field()),
            ("$http_referer", self.referer.clone().unwrap_or_else(|| "-".into())),
            ("$http_user_agent", self.user_agent.clone().unwrap_or_else(|| "-".into())),
        ];

        vars.iter()
            .fold(pattern.to_string(), |acc, (name, value)| acc.replace(name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry() -> AccessLogEntry {
        let mut entry = AccessLogEntry::new(
            "192.168.1.1:52000".parse().unwrap(),
            "GET".to_string(),
            "/docs/index.html?lang=en".to_string(),
            true,
        );
        entry.status = 200;
        entry.body_bytes = Some(1234);
        entry.referer = Some("https://example.com".to_string());
        entry.user_agent = Some("Mozilla/5.0".to_string());
        entry.request_time_us = 1_250_000;
        entry
    }

    #[test]
    fn test_format_combined() {
        let log = create_test_entry().format("combined");
        assert!(log.starts_with("192.168.1.1 - - ["));
        assert!(log.contains("\"GET /docs/index.html?lang=en HTTP/1.1\" 200 1234"));
        assert!(log.ends_with("\"https://example.com\" \"Mozilla/5.0\""));
    }

    #[test]
    fn test_format_common_omits_headers() {
        let log = create_test_entry().format("common");
        assert!(log.contains("200 1234"));
        assert!(!log.contains("Mozilla"));
    }

    #[test]
    fn test_streamed_body_size_unknown() {
        let mut entry = create_test_entry();
        entry.body_bytes = None;
        assert!(entry.format("common").ends_with("200 -"));
    }

    #[test]
    fn test_format_json() {
        let log = create_test_entry().format("json");
        let value: serde_json::Value = serde_json::from_str(&log).unwrap();
        assert_eq!(value["remote_addr"], "192.168.1.1:52000");
        assert_eq!(value["scheme"], "https");
        assert_eq!(value["status"], 200);
        assert_eq!(value["body_bytes"], 1234);
    }

    #[test]
    fn test_format_custom() {
        let log = create_test_entry().format("$scheme $remote_addr $status $request_time $request");
        assert_eq!(
            log,
            "https 192.168.1.1 200 1.250 GET /docs/index.html?lang=en HTTP/1.1"
        );
    }
}
