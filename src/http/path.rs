//! Request path extraction
//!
//! The routable path is the request target up to the first query (`?`) or
//! fragment (`#`) marker, percent-decoded.

use percent_encoding::percent_decode_str;

/// Strip query/fragment and percent-decode a request target.
///
/// Returns `None` when the decoded bytes are not valid UTF-8. Malformed
/// escapes such as `%zz` are kept literally, so the `%` survives decoding.
pub fn extract_path(target: &str) -> Option<String> {
    let end = target.find(['?', '#']).unwrap_or(target.len());
    percent_decode_str(&target[..end])
        .decode_utf8()
        .ok()
        .map(std::borrow::Cow::into_owned)
}
