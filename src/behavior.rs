//! Behavior modes and the cached-vs-live decision

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fingerprint::RequestFingerprint;
use crate::response::CachedResponse;
use crate::{MirraError, Result};

/// Policy deciding between local and live responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BehaviorMode {
    /// Reuse anything stored, fetch only unknown requests
    #[default]
    SaveResponsesForNewQueries,
    /// Like the default, but refetch stored error responses
    ReloadResponsesWithErrors,
    /// Never contact the upstream
    NoRequestForwarding,
    /// Always refetch and overwrite
    ForceUpdateAll,
}

impl BehaviorMode {
    /// All modes
    pub const ALL: [Self; 4] = [
        Self::SaveResponsesForNewQueries,
        Self::ReloadResponsesWithErrors,
        Self::NoRequestForwarding,
        Self::ForceUpdateAll,
    ];

    /// Name as used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SaveResponsesForNewQueries => "SAVE_RESPONSES_FOR_NEW_QUERIES",
            Self::ReloadResponsesWithErrors => "RELOAD_RESPONSES_WITH_ERRORS",
            Self::NoRequestForwarding => "NO_REQUEST_FORWARDING",
            Self::ForceUpdateAll => "FORCE_UPDATE_ALL",
        }
    }
}

impl fmt::Display for BehaviorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BehaviorMode {
    type Err = MirraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| MirraError::ConfigError(format!("Unknown proxy behavior: {s}")))
    }
}

/// Outcome of the decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Serve the local response
    UseLocal,
    /// Fetch from upstream and persist
    Fetch,
    /// Fail with `NoCachedResponse`
    Refuse,
}

/// Decide what to do given the mode and the local response, if any
#[must_use]
pub fn decide(mode: BehaviorMode, local: Option<&CachedResponse>) -> Decision {
    match (mode, local) {
        (BehaviorMode::ForceUpdateAll, _) => Decision::Fetch,
        (BehaviorMode::ReloadResponsesWithErrors, Some(response)) if response.has_error() => {
            Decision::Fetch
        }
        (_, Some(_)) => Decision::UseLocal,
        (BehaviorMode::NoRequestForwarding, None) => Decision::Refuse,
        (_, None) => Decision::Fetch,
    }
}

/// Apply the decision table, running `fetch` only when it calls for it
///
/// `fetch` is expected to persist what it returns.
///
/// # Errors
///
/// Returns `NoCachedResponse` in `NO_REQUEST_FORWARDING` mode without a local response
pub async fn resolve<F, Fut>(
    mode: BehaviorMode,
    id: &RequestFingerprint,
    local: Option<CachedResponse>,
    fetch: F,
) -> Result<CachedResponse>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = CachedResponse>,
{
    match (decide(mode, local.as_ref()), local) {
        (Decision::UseLocal, Some(response)) => Ok(response),
        (Decision::Refuse, _) => Err(MirraError::NoCachedResponse {
            id: id.clone(),
            mode,
        }),
        _ => Ok(fetch().await),
    }
}
