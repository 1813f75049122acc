//! In-memory responses that take precedence over the persisted cache

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::fingerprint::RequestFingerprint;
use crate::response::CachedResponse;
use crate::state::Resettable;
use crate::{MirraError, Result};

/// Mapping of fingerprint to injected response
pub type OverwriteSet = HashMap<RequestFingerprint, CachedResponse>;

/// Caller-supplied overwrites with merge/reset support
#[derive(Debug, Clone)]
pub struct Overwrites {
    state: Resettable<OverwriteSet>,
}

impl Overwrites {
    /// Seed the layer; the map is owned, later changes by the caller cannot leak in
    #[must_use]
    pub fn new(seed: OverwriteSet) -> Self {
        Self {
            state: Resettable::new(seed),
        }
    }

    /// Load a seed from a JSON object of `fingerprint -> response`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MirraError::ConfigError(format!(
                "Failed to read overwrites file {}: {e}",
                path.display()
            ))
        })?;
        let seed: OverwriteSet = serde_json::from_str(&content)?;

        info!("Loaded {} overwrites from {}", seed.len(), path.display());
        Ok(Self::new(seed))
    }

    /// Look up an overwrite
    #[must_use]
    pub fn get(&self, id: &RequestFingerprint) -> Option<&CachedResponse> {
        self.state.current().get(id)
    }

    /// Add entries, replacing existing ones with the same fingerprint
    pub fn merge(&mut self, additional: OverwriteSet) {
        self.state.modify(|current| {
            let mut next = current.clone();
            next.extend(additional);
            next
        });
    }

    /// Drop everything merged since construction
    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Number of active overwrites
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.current().len()
    }

    /// Whether no overwrite is active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.current().is_empty()
    }
}

impl Default for Overwrites {
    fn default() -> Self {
        Self::new(OverwriteSet::new())
    }
}
