//! Cached response and per-response metadata

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Header value, single or repeated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Single value
    Single(String),
    /// Repeated header
    Multi(Vec<String>),
}

impl HeaderValue {
    /// Iterate over all values
    pub fn values(&self) -> impl Iterator<Item = &str> {
        let values: Vec<&str> = match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        };
        values.into_iter()
    }
}

/// Response headers keyed by lowercase name
pub type Headers = BTreeMap<String, HeaderValue>;

/// Headers used for stored responses that predate header capture
#[must_use]
pub fn fallback_headers() -> Headers {
    BTreeMap::from([
        (
            "content-type".to_string(),
            HeaderValue::Single("application/json".to_string()),
        ),
        (
            "access-control-allow-origin".to_string(),
            HeaderValue::Single("*".to_string()),
        ),
    ])
}

/// A response as stored on disk and replayed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    #[serde(default = "fallback_headers")]
    pub headers: Headers,
    /// JSON body
    pub body: Value,
}

impl CachedResponse {
    /// Response with the fallback headers
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: fallback_headers(),
            body,
        }
    }

    /// `errors` entries of a GraphQL-shaped body
    #[must_use]
    pub fn graphql_errors(&self) -> &[Value] {
        self.body
            .get("errors")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Non-200 status or a non-empty `errors` list
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.status != 200 || !self.graphql_errors().is_empty()
    }
}

/// Meta flag suppressing replacement-character warnings
pub const IGNORE_BROKEN_CHARS: &str = "ignoreBrockenChars";

/// Per-response flags stored next to the response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaInfo(pub BTreeMap<String, bool>);

impl MetaInfo {
    /// Whether replacement-character warnings are suppressed
    #[must_use]
    pub fn ignores_broken_chars(&self) -> bool {
        self.0.get(IGNORE_BROKEN_CHARS).copied().unwrap_or(false)
    }

    /// Set or clear a flag
    pub fn set(&mut self, flag: &str, value: bool) {
        self.0.insert(flag.to_string(), value);
    }
}
