//! Request fingerprinting for deterministic cache keys
//!
//! Fingerprints must stay byte-for-byte identical to the ones already used as
//! fixture file names, so the fold below is a 31x rolling hash over UTF-16
//! code units with signed 32-bit wraparound. It is not collision resistant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MirraError, Result};

/// Literal prefix of every fingerprint
pub const FINGERPRINT_PREFIX: &str = "responseFor";

/// Identifier of a request, usable as a file stem
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestFingerprint(String);

impl RequestFingerprint {
    /// Wrap an existing identifier (e.g. a stored file stem)
    ///
    /// # Errors
    ///
    /// Returns error if the identifier lacks the fingerprint prefix
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.len() > FINGERPRINT_PREFIX.len() && raw.starts_with(FINGERPRINT_PREFIX) {
            Ok(Self(raw.to_string()))
        } else {
            Err(MirraError::InvalidRequest(format!(
                "'{raw}' is not a request fingerprint"
            )))
        }
    }

    /// Borrow the identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestFingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Serialize)]
struct Canonical<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// Compute the fingerprint of a request target and body
///
/// The HTTP method does not take part: a GET and a POST with the same target
/// and body share one cache entry.
///
/// # Errors
///
/// Returns `InvalidRequest` if `url` is absent or empty
pub fn fingerprint(url: Option<&str>, body: Option<&str>) -> Result<RequestFingerprint> {
    let url = url.filter(|u| !u.is_empty()).ok_or_else(|| {
        MirraError::InvalidRequest("Cannot fingerprint a request with missing URL".to_string())
    })?;

    let canonical = serde_json::to_string(&Canonical { url, body })?;
    // '-' is not wanted in file names
    let digits = fold(&canonical).to_string().replacen('-', "0", 1);

    Ok(RequestFingerprint(format!("{FINGERPRINT_PREFIX}{digits}")))
}

/// `h = 31 * h + unit` over the first UTF-16 unit of every char
fn fold(input: &str) -> i32 {
    let mut units = [0u16; 2];
    input.chars().fold(0i32, |hash, c| {
        let unit = c.encode_utf16(&mut units)[0];
        hash.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// Request as handed over by the transport layer
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Fingerprint of `url` and `body`
    pub id: RequestFingerprint,
    /// Path and query of the request
    pub url: String,
    /// HTTP method
    pub method: String,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body, only captured for POST requests
    pub body: Option<String>,
}

impl ProxyRequest {
    /// Build a request and compute its fingerprint
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if `url` is absent
    pub fn new(
        method: impl Into<String>,
        url: Option<String>,
        headers: Vec<(String, String)>,
        body: Option<String>,
    ) -> Result<Self> {
        let id = fingerprint(url.as_deref(), body.as_deref())?;
        Ok(Self {
            id,
            url: url.unwrap_or_default(),
            method: method.into(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(url: &str, body: Option<&str>) -> String {
        fingerprint(Some(url), body).unwrap().to_string()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let first = id("/graphql", Some(r#"{"query":"{ me { id } }"}"#));
        let second = id("/graphql", Some(r#"{"query":"{ me { id } }"}"#));

        assert_eq!(first, second, "Fingerprint must be deterministic");
    }

    #[test]
    fn test_fingerprint_known_values() {
        assert_eq!(id("/graphql", None), "responseFor1395794231");
        assert_eq!(id("/api/users?id=1", None), "responseFor0820660157");
        assert_eq!(
            id("/graphql", Some(r#"{"query":"{ me { id } }"}"#)),
            "responseFor02069244292"
        );
    }

    #[test]
    fn test_empty_body_differs_from_missing_body() {
        assert_eq!(id("/", Some("")), "responseFor0789304680");
        assert_ne!(id("/", Some("")), id("/", None));
    }

    #[test]
    fn test_non_ascii_uses_first_utf16_unit() {
        assert_eq!(id("/ä😀", None), "responseFor149216097");
    }

    #[test]
    fn test_missing_url_is_invalid() {
        assert!(matches!(
            fingerprint(None, Some("body")),
            Err(MirraError::InvalidRequest(_))
        ));
        assert!(matches!(
            fingerprint(Some(""), None),
            Err(MirraError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_method_is_not_fingerprinted() {
        let get = ProxyRequest::new("GET", Some("/a".to_string()), vec![], None).unwrap();
        let post = ProxyRequest::new("POST", Some("/a".to_string()), vec![], None).unwrap();

        assert_eq!(get.id, post.id);
    }

    #[test]
    fn test_parse_fingerprint() {
        assert!(RequestFingerprint::parse("responseFor123").is_ok());
        assert!(RequestFingerprint::parse("responseFor").is_err());
        assert!(RequestFingerprint::parse("apiQuery").is_err());
    }
}
