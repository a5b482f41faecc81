//! Outbound header construction.
//!
//! Inbound headers are copied into a case-insensitive string map, stripped of
//! anything the caller must not control (host, credentials, hop-by-hop
//! transport headers), and completed with the upstream `Host` and the
//! server-held bearer credential.

use axum::http::HeaderMap;
use std::collections::BTreeMap;
use std::fmt;

/// Value shown in logs in place of the real credential.
pub const MASKED_AUTHORIZATION: &str = "Bearer ***";

/// Inbound headers never copied to the upstream request.
const STRIPPED_HEADERS: &[&str] = &[
    // replaced below
    "host",
    "authorization",
    // managed by the HTTP client
    "content-length",
    "transfer-encoding",
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
    // the proxy decodes upstream bodies itself
    "accept-encoding",
    // credentials meant for this hop only
    "proxy-authorization",
    "proxy-authenticate",
];

fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Case-insensitive header map used for the upstream call.
///
/// Keys are compared ASCII-case-insensitively; the spelling of the most
/// recent insert is kept for display.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OutboundHeaders {
    entries: BTreeMap<String, (String, String)>,
}

impl OutboundHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, value.into()))
            .map(|(_, previous)| previous)
    }

    /// Append to an existing header using list syntax, or insert it.
    fn append(&mut self, name: &str, value: &str) {
        match self.entries.get_mut(&name.to_ascii_lowercase()) {
            Some((_, existing)) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                self.insert(name, value);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .remove(&name.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate as `(display name, value)` pairs, ordered by lowercase name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Pairs safe to log: the credential is replaced by [`MASKED_AUTHORIZATION`].
    pub fn masked(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case("authorization") {
                    (name.to_string(), MASKED_AUTHORIZATION.to_string())
                } else {
                    (name.to_string(), value.to_string())
                }
            })
            .collect()
    }

    /// Convert into the HTTP client's header map.
    ///
    /// Entries that are not valid header names or values are skipped.
    pub fn to_reqwest(&self) -> reqwest::header::HeaderMap {
        let mut map = reqwest::header::HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let parsed = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::debug!(header = %name, "Skipping unrepresentable outbound header"),
            }
        }
        map
    }
}

// Debug goes through `masked` so a stray `{:?}` cannot leak the key.
impl fmt::Debug for OutboundHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.masked().into_iter())
            .finish()
    }
}

/// Derive upstream headers from the inbound request headers.
///
/// 1. `host` and the headers in the strip list are removed.
/// 2. `Host` is set to `upstream_host`.
/// 3. `Authorization: Bearer <key>` is set when a key is configured.
pub fn transform_headers(
    inbound: &HeaderMap,
    upstream_host: &str,
    api_key: Option<&str>,
) -> OutboundHeaders {
    let mut outbound = OutboundHeaders::new();

    for (name, value) in inbound.iter() {
        let name = name.as_str();
        if is_stripped(name) {
            continue;
        }
        match value.to_str() {
            Ok(value) => outbound.append(name, value),
            Err(_) => tracing::debug!(header = %name, "Dropping non-ASCII inbound header"),
        }
    }

    outbound.insert("Host", upstream_host);

    if let Some(key) = api_key {
        outbound.insert("Authorization", format!("Bearer {}", key));
    }

    outbound
}
