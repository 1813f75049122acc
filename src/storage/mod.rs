//! Persistent response cache
//!
//! Layout of a cache directory:
//!
//! - `<fingerprint>.json`: the stored [`CachedResponse`]
//! - `<fingerprint>.meta.json`: the stored [`MetaInfo`] (optional)
//! - `apiQuery.log`: one block per save, blocks separated by a blank line
//!
//! Every operation is best-effort: read failures count as "not found" and
//! write failures are logged, never returned.

mod disk;
mod log;
mod memory;

pub use disk::DiskStore;
pub use log::{prune_blocks, QueryLogEntry, LOG_FILE_NAME};
pub use memory::MemoryStore;

use crate::fingerprint::{ProxyRequest, RequestFingerprint};
use crate::response::{CachedResponse, MetaInfo};

/// Suffix of stored responses
pub const RESPONSE_SUFFIX: &str = ".json";

/// Suffix of stored metadata
pub const META_SUFFIX: &str = ".meta.json";

/// Storage interface used by the resolution engine
pub trait ResponseStore: Send + Sync {
    /// Stored response, if any
    fn get(&self, id: &RequestFingerprint) -> Option<CachedResponse>;

    /// Store `response` under the request's fingerprint and log the save
    fn save(&self, request: &ProxyRequest, response: &CachedResponse);

    /// Stored metadata, empty if none
    fn get_meta(&self, id: &RequestFingerprint) -> MetaInfo;

    /// Store metadata
    fn save_meta(&self, id: &RequestFingerprint, meta: &MetaInfo);

    /// Fingerprints of all stored responses, unordered
    fn list_ids(&self) -> Vec<RequestFingerprint>;

    /// Remove the response and its metadata; no-op if absent
    fn delete(&self, id: &RequestFingerprint);

    /// Remove the log entries describing `deleted`
    fn prune_log(&self, deleted: &[RequestFingerprint]);

    /// Where the response for `id` lives, as recorded in the log
    fn location(&self, id: &RequestFingerprint) -> String;
}

/// Fingerprint encoded in a response file name, if it is one
#[must_use]
pub fn id_from_file_name(file_name: &str) -> Option<RequestFingerprint> {
    if file_name.ends_with(META_SUFFIX) {
        return None;
    }
    let stem = file_name.strip_suffix(RESPONSE_SUFFIX)?;
    RequestFingerprint::parse(stem).ok()
}
