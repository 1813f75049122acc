//! File-per-response cache directory

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::log::{prune_blocks, QueryLogEntry, LOG_FILE_NAME};
use super::{id_from_file_name, ResponseStore, META_SUFFIX, RESPONSE_SUFFIX};
use crate::fingerprint::{ProxyRequest, RequestFingerprint};
use crate::response::{CachedResponse, MetaInfo};
use crate::Result;

/// Cache directory on the local filesystem
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Store rooted at the joined path segments
    ///
    /// The directory is created on the first write.
    #[must_use]
    pub fn new<S: AsRef<Path>>(segments: &[S]) -> Self {
        Self {
            root: segments.iter().collect(),
        }
    }

    /// Store rooted at `root`
    #[must_use]
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn response_path(&self, id: &RequestFingerprint) -> PathBuf {
        self.root.join(format!("{id}{RESPONSE_SUFFIX}"))
    }

    fn meta_path(&self, id: &RequestFingerprint) -> PathBuf {
        self.root.join(format!("{id}{META_SUFFIX}"))
    }

    fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    fn require_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn append_log(&self, entry: &QueryLogEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        file.write_all(entry.to_block().as_bytes())?;
        Ok(())
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        fs::write(path, serde_json::to_string(value)?)?;
        Ok(())
    }

    /// Parsed JSON file; missing, unreadable and malformed files are `None`
    fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("FAILED to read {}: {}", path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("FAILED to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    fn remove_if_present(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn rewrite_log(&self, paths: &[String]) -> Result<()> {
        let log_path = self.log_path();
        let contents = match fs::read_to_string(&log_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let pruned = prune_blocks(&contents, paths);
        if pruned != contents {
            fs::write(&log_path, pruned)?;
        }
        Ok(())
    }
}

impl ResponseStore for DiskStore {
    fn get(&self, id: &RequestFingerprint) -> Option<CachedResponse> {
        Self::read_json(&self.response_path(id))
    }

    fn save(&self, request: &ProxyRequest, response: &CachedResponse) {
        let file_name = self.location(&request.id);

        if let Err(e) = self.require_dir() {
            warn!(
                "FAILED to create cache directory {}: {}",
                self.root.display(),
                e
            );
            return;
        }

        let entry = QueryLogEntry::new(file_name.clone(), &request.url);
        if let Err(e) = self.append_log(&entry) {
            warn!("FAILED to append log info for: {} ({})", file_name, e);
        }

        match Self::write_json(&self.response_path(&request.id), response) {
            Ok(()) => info!("Saved query response to: {}", file_name),
            Err(e) => warn!("FAILED to save response: {} ({})", file_name, e),
        }
    }

    fn get_meta(&self, id: &RequestFingerprint) -> MetaInfo {
        Self::read_json(&self.meta_path(id)).unwrap_or_default()
    }

    fn save_meta(&self, id: &RequestFingerprint, meta: &MetaInfo) {
        let path = self.meta_path(id);
        let result = self
            .require_dir()
            .and_then(|()| Self::write_json(&path, meta));

        match result {
            Ok(()) => info!("Saved metaInfo for response to: {}", path.display()),
            Err(e) => warn!("FAILED to save metaInfo: {} ({})", path.display(), e),
        }
    }

    fn list_ids(&self) -> Vec<RequestFingerprint> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cache directory {} not readable: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| id_from_file_name(entry.file_name().to_str()?))
            .collect()
    }

    fn delete(&self, id: &RequestFingerprint) {
        for path in [self.response_path(id), self.meta_path(id)] {
            match Self::remove_if_present(&path) {
                Ok(true) => info!("Deleted {}", path.display()),
                Ok(false) => {}
                Err(e) => warn!("FAILED to delete {}: {}", path.display(), e),
            }
        }
    }

    fn prune_log(&self, deleted: &[RequestFingerprint]) {
        if deleted.is_empty() {
            return;
        }

        let paths: Vec<String> = deleted.iter().map(|id| self.location(id)).collect();
        if let Err(e) = self.rewrite_log(&paths) {
            warn!(
                "FAILED to prune query log {}: {}",
                self.log_path().display(),
                e
            );
        }
    }

    fn location(&self, id: &RequestFingerprint) -> String {
        self.response_path(id).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::response::{fallback_headers, IGNORE_BROKEN_CHARS};

    fn request(url: &str) -> ProxyRequest {
        ProxyRequest::new("GET", Some(url.to_string()), vec![], None).unwrap()
    }

    fn read_log(store: &DiskStore) -> String {
        fs::read_to_string(store.root().join(LOG_FILE_NAME)).unwrap_or_default()
    }

    #[test]
    fn test_get_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path().join("nested"));
        let id = request("/missing").id;

        assert!(store.get(&id).is_none());
        assert!(store.list_ids().is_empty());
    }

    #[test]
    fn test_save_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path().join("a").join("b"));
        let req = request("/graphql");
        let response = CachedResponse::new(200, json!({"data": {"me": {"id": 1}}}));

        store.save(&req, &response);

        assert_eq!(store.get(&req.id), Some(response));
        assert_eq!(store.list_ids(), vec![req.id.clone()]);
    }

    #[test]
    fn test_save_overwrites_in_place() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let req = request("/graphql");

        store.save(&req, &CachedResponse::new(500, json!({})));
        store.save(&req, &CachedResponse::new(200, json!({"data": 2})));

        assert_eq!(store.list_ids().len(), 1);
        assert_eq!(store.get(&req.id).unwrap().status, 200);
    }

    #[test]
    fn test_get_fills_missing_headers() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let id = request("/legacy").id;
        fs::write(
            store.response_path(&id),
            r#"{"body":{"data":"legacy"},"status":200}"#,
        )
        .unwrap();

        let response = store.get(&id).unwrap();

        assert_eq!(response.headers, fallback_headers());
        assert_eq!(response.body, json!({"data": "legacy"}));
    }

    #[test]
    fn test_malformed_file_reads_as_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let id = request("/broken").id;
        fs::write(store.response_path(&id), "{not json").unwrap();

        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_save_appends_log_block() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let first = request("/search?q=hello%20world");
        let second = request("/other");

        store.save(&first, &CachedResponse::new(200, json!(null)));
        store.save(&second, &CachedResponse::new(200, json!(null)));

        let expected = format!(
            "{}, /search?q=hello world\n\n{}, /other\n\n",
            store.location(&first.id),
            store.location(&second.id)
        );
        assert_eq!(read_log(&store), expected);
    }

    #[test]
    fn test_list_ids_skips_meta_and_log() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let req = request("/graphql");
        let mut meta = MetaInfo::default();
        meta.set(IGNORE_BROKEN_CHARS, true);

        store.save(&req, &CachedResponse::new(200, json!({})));
        store.save_meta(&req.id, &meta);
        fs::write(temp_dir.path().join("notes.json"), "{}").unwrap();

        assert_eq!(store.list_ids(), vec![req.id.clone()]);
        assert_eq!(store.get_meta(&req.id), meta);
    }

    #[test]
    fn test_meta_defaults_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());

        assert_eq!(store.get_meta(&request("/x").id), MetaInfo::default());
    }

    #[test]
    fn test_delete_and_prune() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let keep_a = request("/a");
        let gone = request("/b");
        let keep_c = request("/c");

        for req in [&keep_a, &gone, &keep_c] {
            store.save(req, &CachedResponse::new(200, json!({})));
        }
        store.save_meta(&gone.id, &MetaInfo::default());

        store.delete(&gone.id);
        store.prune_log(&[gone.id.clone()]);

        assert!(store.get(&gone.id).is_none());
        assert!(!store.meta_path(&gone.id).exists());
        let expected = format!(
            "{}, /a\n\n{}, /c\n\n",
            store.location(&keep_a.id),
            store.location(&keep_c.id)
        );
        assert_eq!(read_log(&store), expected);
    }

    #[test]
    fn test_prune_after_url_with_trailing_line_break() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let keep = request("/a%0A");
        let gone = request("/b");

        store.save(&keep, &CachedResponse::new(200, json!({})));
        store.save(&gone, &CachedResponse::new(200, json!({})));
        store.delete(&gone.id);
        store.prune_log(&[gone.id.clone()]);

        assert_eq!(
            read_log(&store),
            format!("{}, /a\\n\n\n", store.location(&keep.id))
        );
    }

    #[test]
    fn test_prune_url_with_blank_line_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let req = request("/a%0A%0Atail");

        store.save(&req, &CachedResponse::new(200, json!({})));
        store.delete(&req.id);
        store.prune_log(&[req.id.clone()]);

        assert_eq!(read_log(&store), "");
    }

    #[test]
    fn test_prune_unknown_id_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let req = request("/a");
        store.save(&req, &CachedResponse::new(200, json!({})));
        let before = read_log(&store);

        store.prune_log(&[request("/never-saved").id]);
        store.prune_log(&[]);

        assert_eq!(read_log(&store), before);
    }

    #[test]
    fn test_prune_last_entry_clears_log() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());
        let req = request("/a");
        store.save(&req, &CachedResponse::new(200, json!({})));

        store.delete(&req.id);
        store.prune_log(&[req.id.clone()]);

        assert_eq!(read_log(&store), "");
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = DiskStore::at(temp_dir.path());

        store.delete(&request("/nothing").id);

        assert!(store.list_ids().is_empty());
    }

    #[test]
    fn test_new_joins_segments() {
        let store = DiskStore::new(&["fixtures", "api"]);
        assert_eq!(store.root(), Path::new("fixtures/api"));
        assert!(store
            .location(&request("/graphql").id)
            .ends_with("responseFor1395794231.json"));
    }
}
