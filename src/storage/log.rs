//! Query log blocks

use std::borrow::Cow;

/// File name of the query log inside the cache directory
pub const LOG_FILE_NAME: &str = "apiQuery.log";

const BLOCK_SEPARATOR: &str = "\n\n";

/// One save, as written to the query log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLogEntry {
    /// Path of the stored response file
    pub stored_file_path: String,
    /// Percent-decoded request URL
    pub original_decoded_url: String,
}

impl QueryLogEntry {
    /// Entry for a save of `url` to `stored_file_path`
    ///
    /// URLs that do not decode to UTF-8 are logged as received. Decoded line
    /// breaks are escaped so an entry always stays on one line.
    #[must_use]
    pub fn new(stored_file_path: String, url: &str) -> Self {
        let original_decoded_url = urlencoding::decode(url)
            .unwrap_or(Cow::Borrowed(url))
            .replace('\r', "\\r")
            .replace('\n', "\\n");
        Self {
            stored_file_path,
            original_decoded_url,
        }
    }

    /// Block text including the trailing blank line
    #[must_use]
    pub fn to_block(&self) -> String {
        format!(
            "{}, {}{BLOCK_SEPARATOR}",
            self.stored_file_path, self.original_decoded_url
        )
    }

    /// Whether this entry describes the file at `path`
    #[must_use]
    pub fn describes(&self, path: &str) -> bool {
        self.stored_file_path == path
    }
}

/// File path recorded on the first non-empty line of a block
fn block_path(block: &str) -> &str {
    let first_line = block
        .lines()
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    first_line
        .split_once(", ")
        .map_or(first_line, |(path, _)| path)
}

/// Log contents without the blocks that describe one of `paths`
///
/// Remaining blocks keep their content and order. Returns an empty string
/// when nothing remains.
#[must_use]
pub fn prune_blocks(contents: &str, paths: &[String]) -> String {
    contents
        .split(BLOCK_SEPARATOR)
        .filter(|block| !block.trim().is_empty())
        .filter(|block| !paths.iter().any(|path| block_path(block) == path))
        .map(|block| format!("{block}{BLOCK_SEPARATOR}"))
        .collect()
}
