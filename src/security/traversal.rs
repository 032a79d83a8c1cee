//! Directory traversal detection
//!
//! Runs on the decoded request path before anything touches the
//! filesystem. A path is rejected when it matches a known traversal
//! pattern or when resolving it lexically would climb out of the working
//! directory.

use crate::http::Request;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::net::IpAddr;
use std::path::{Component, Path};

/// Check whether a decoded request path is a traversal attempt
pub fn is_traversal_attempt(path: &str) -> bool {
    path.starts_with("//")
        || path.contains("/../")
        || path.ends_with("/..")
        || path.contains(['\\', '%', '\0'])
        || escapes_root(path)
}

/// Lexical containment check: does the path climb above its root?
fn escapes_root(path: &str) -> bool {
    let mut depth = 0usize;
    for component in Path::new(path).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::Prefix(_) => return true,
        }
    }
    false
}

/// Record of a detected traversal attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttackerReport {
    pub ip: IpAddr,
    pub port: u16,
    /// Raw request target, before decoding
    pub path: String,
    pub method: String,
    /// Headers grouped by name, lowercased, duplicates kept
    pub headers: Vec<(String, String)>,
    pub date: DateTime<Local>,
}

impl AttackerReport {
    pub fn from_request(req: &Request) -> Self {
        let remote = req.remote_addr();
        Self {
            ip: remote.ip(),
            port: remote.port(),
            path: req.target().to_string(),
            method: req.method().to_string(),
            headers: req
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            date: Local::now(),
        }
    }

    /// Single-line JSON rendering used by the default log
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}
