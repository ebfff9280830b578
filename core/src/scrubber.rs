//! Redaction of sensitive JSON field values in log text.
//!
//! # Design
//! Scrubbing is best-effort text rewriting, not a JSON parse: log bodies may
//! be truncated, pretty-printed or not JSON at all, and none of that may make
//! logging fail. One case-insensitive pattern is compiled per key fragment
//! and fragments are applied one after another over the progressively
//! rewritten text. Within a fragment, matches are rewritten right to left so
//! the offsets of the matches still waiting are never shifted.

use regex::{Regex, RegexBuilder};
use serde_json::Value;

/// Replacement written over every scrubbed value.
pub const REDACTION_MARKER: &str = "********";

#[derive(Debug, Clone)]
struct Fragment {
    lowercase: String,
    pattern: Regex,
}

/// Redacts the values of JSON fields whose names contain a sensitive
/// fragment.
#[derive(Debug, Clone)]
pub struct RequestScrubber {
    fragments: Vec<Fragment>,
}

impl RequestScrubber {
    /// Empty fragments are dropped; they would otherwise match every key.
    pub fn new<I, S>(keys_to_scrub: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fragments = keys_to_scrub
            .into_iter()
            .filter_map(|key| compile_fragment(key.as_ref()))
            .collect();
        Self { fragments }
    }

    /// Scrub free text. Absent or empty input yields an empty string.
    pub fn scrub(&self, text: Option<&str>) -> String {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return String::new();
        };
        self.fragments
            .iter()
            .fold(text.to_string(), |body, fragment| scrub_fragment(body, &fragment.pattern))
    }

    /// Scrub a parsed JSON value. Matching keys have their whole value
    /// replaced by the marker; everything else is walked recursively.
    pub fn scrub_value(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, val)| {
                        let scrubbed = if self.is_sensitive(key) {
                            Value::String(REDACTION_MARKER.to_string())
                        } else {
                            self.scrub_value(val)
                        };
                        (key.clone(), scrubbed)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.scrub_value(v)).collect()),
            other => other.clone(),
        }
    }

    /// True when `key` contains any fragment, ignoring case.
    pub fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.fragments.iter().any(|f| key.contains(&f.lowercase))
    }
}

/// A quoted key containing `fragment`, a colon, then the opening quote of a
/// string value. The match ends just after that opening quote.
fn compile_fragment(fragment: &str) -> Option<Fragment> {
    if fragment.is_empty() {
        return None;
    }
    let source = format!(r#""[^"]*{}[^"]*"\s*:\s*""#, regex::escape(fragment));
    match RegexBuilder::new(&source).case_insensitive(true).build() {
        Ok(pattern) => Some(Fragment {
            lowercase: fragment.to_lowercase(),
            pattern,
        }),
        Err(err) => {
            tracing::warn!(fragment, %err, "ignoring unusable scrub key");
            None
        }
    }
}

fn scrub_fragment(mut body: String, pattern: &Regex) -> String {
    let value_starts: Vec<usize> = pattern.find_iter(&body).map(|m| m.end()).collect();
    for start in value_starts.into_iter().rev() {
        if let Some(end) = closing_quote(&body, start) {
            body.replace_range(start..end, REDACTION_MARKER);
        }
    }
    body
}

/// Byte offset of the first unescaped `"` at or after `from`.
fn closing_quote(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}
