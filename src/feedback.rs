//! Console feedback about served responses
//!
//! Nothing here influences what is returned to the client.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::fingerprint::ProxyRequest;
use crate::response::CachedResponse;
use crate::storage::ResponseStore;

/// Above this many matches the find helper only prints a summary
pub const FIND_MATCH_MAX: usize = 80;

const REPLACEMENT_CHAR: char = '\u{FFFD}';

/// Report everything the settings ask for about `response`
pub fn report(
    settings: &Settings,
    store: &dyn ResponseStore,
    request: &ProxyRequest,
    response: &CachedResponse,
) {
    let location = store.location(&request.id);

    if !store.get_meta(&request.id).ignores_broken_chars() {
        let serialized = response.body.to_string();
        if let Some(alert) = replacement_char_alert(&serialized, &location) {
            warn!("{}", alert);
        }
    }

    if let Some(find) = settings.find.as_deref().filter(|f| !f.is_empty()) {
        match find_help(request, response, find, &location) {
            FindHelp::NoMatch => info!("No value containing \"{}\" in {}", find, location),
            FindHelp::TooMany(count) => info!(
                "{} values contain \"{}\" in {}; showing none (limit is {})",
                count, find, location, FIND_MATCH_MAX
            ),
            FindHelp::Snippet(snippet) => info!("{}", snippet),
        }
    }

    if !settings.hide_errors {
        for message in error_messages(response) {
            warn!("{} {} in {}", response.status, message, location);
        }
    }

    if settings.responses_to_log.contains(&request.id) {
        info!("{}: {}", request.id, serde_json::to_string(response).unwrap_or_default());
    }
}

/// Warning text if the body contains U+FFFD replacement characters
#[must_use]
pub fn replacement_char_alert(serialized_body: &str, location: &str) -> Option<String> {
    let count = serialized_body
        .chars()
        .filter(|c| *c == REPLACEMENT_CHAR)
        .count();
    match count {
        0 => None,
        1 => Some(format!("WARNING replacement-char {REPLACEMENT_CHAR} in {location}")),
        n => Some(format!(
            "WARNING {n} replacement-chars {REPLACEMENT_CHAR} in {location}"
        )),
    }
}

/// Messages describing an error response; empty for successful ones
#[must_use]
pub fn error_messages(response: &CachedResponse) -> Vec<String> {
    if !response.has_error() {
        return Vec::new();
    }

    let messages: Vec<String> = response
        .graphql_errors()
        .iter()
        .map(|error| match error.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        })
        .collect();

    if messages.is_empty() {
        vec!["Server Error".to_string()]
    } else {
        messages
    }
}

/// A scalar inside a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPath {
    /// JSON text of the value
    pub value: String,
    /// Path like `.data.items[0].name`
    pub path: String,
}

/// Scalars whose JSON text contains `search`
///
/// Nulls are never matched.
#[must_use]
pub fn find_object_paths(value: &Value, search: &str) -> Vec<MatchPath> {
    let mut matches = Vec::new();
    collect_paths(value, String::new(), search, &mut matches);
    matches
}

/// Keys that read as a number, including `Infinity` but not `NaN`
fn is_number_key(key: &str) -> bool {
    let key = key.trim();
    match key.strip_prefix(&['+', '-'][..]).unwrap_or(key) {
        "Infinity" => true,
        unsigned => {
            unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.')
                && key.parse::<f64>().is_ok()
        }
    }
}

fn collect_paths(value: &Value, path: String, search: &str, matches: &mut Vec<MatchPath>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if is_number_key(key) {
                    format!("{path}[{key}]")
                } else {
                    format!("{path}.{key}")
                };
                collect_paths(child, child_path, search, matches);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_paths(child, format!("{path}[{index}]"), search, matches);
            }
        }
        Value::Null => {}
        scalar => {
            let text = scalar.to_string();
            if text.contains(search) {
                matches.push(MatchPath { value: text, path });
            }
        }
    }
}

/// Result of the find helper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindHelp {
    /// Nothing matched
    NoMatch,
    /// Too many matches to print
    TooMany(usize),
    /// Instructions for overwriting the matched values
    Snippet(String),
}

/// Explain how to overwrite the values of `response` containing `search`
#[must_use]
pub fn find_help(
    request: &ProxyRequest,
    response: &CachedResponse,
    search: &str,
    location: &str,
) -> FindHelp {
    let matches = find_object_paths(&response.body, search);

    if matches.is_empty() {
        return FindHelp::NoMatch;
    }
    if matches.len() > FIND_MATCH_MAX {
        return FindHelp::TooMany(matches.len());
    }

    let id = &request.id;
    let lines: Vec<String> = matches
        .iter()
        .map(|m| format!("    {id}.body{} = {}", m.path, m.value))
        .collect();

    FindHelp::Snippet(format!(
        "You can change values containing \"{search}\" as follows:\n\n\
         \x20   Copy {location} into your overwrites file under \"{id}\" and edit:\n\n\
         {}\n\n\
         \x20   Then point your config at it:\n\n\
         \x20   overwrites_file = \"overwrites.json\"\n",
        lines.join("\n")
    ))
}
