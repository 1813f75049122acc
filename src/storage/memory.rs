//! In-memory store for tests and embedding

use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;

use super::log::QueryLogEntry;
use super::{ResponseStore, RESPONSE_SUFFIX};
use crate::fingerprint::{ProxyRequest, RequestFingerprint};
use crate::response::{CachedResponse, MetaInfo};

/// Store that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    responses: DashMap<RequestFingerprint, CachedResponse>,
    meta: DashMap<RequestFingerprint, MetaInfo>,
    log: Mutex<Vec<QueryLogEntry>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a response in place without logging, like copying in a fixture
    pub fn seed(&self, id: RequestFingerprint, response: CachedResponse) {
        self.responses.insert(id, response);
    }

    /// Copy of the query log
    #[must_use]
    pub fn log_entries(&self) -> Vec<QueryLogEntry> {
        self.log_guard().clone()
    }

    fn log_guard(&self) -> MutexGuard<'_, Vec<QueryLogEntry>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponseStore for MemoryStore {
    fn get(&self, id: &RequestFingerprint) -> Option<CachedResponse> {
        self.responses.get(id).map(|entry| entry.value().clone())
    }

    fn save(&self, request: &ProxyRequest, response: &CachedResponse) {
        let entry = QueryLogEntry::new(self.location(&request.id), &request.url);
        self.log_guard().push(entry);
        self.responses.insert(request.id.clone(), response.clone());
    }

    fn get_meta(&self, id: &RequestFingerprint) -> MetaInfo {
        self.meta
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    fn save_meta(&self, id: &RequestFingerprint, meta: &MetaInfo) {
        self.meta.insert(id.clone(), meta.clone());
    }

    fn list_ids(&self) -> Vec<RequestFingerprint> {
        self.responses.iter().map(|entry| entry.key().clone()).collect()
    }

    fn delete(&self, id: &RequestFingerprint) {
        self.responses.remove(id);
        self.meta.remove(id);
    }

    fn prune_log(&self, deleted: &[RequestFingerprint]) {
        if deleted.is_empty() {
            return;
        }
        let paths: Vec<String> = deleted.iter().map(|id| self.location(id)).collect();
        self.log_guard()
            .retain(|entry| !paths.iter().any(|path| entry.describes(path)));
    }

    fn location(&self, id: &RequestFingerprint) -> String {
        format!("memory/{id}{RESPONSE_SUFFIX}")
    }
}
