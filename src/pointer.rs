//! Reference pointer parsing and JSON-pointer navigation.
//!
//! A reference pointer has the shape `<file-or-url-or-empty>#<json-pointer>`.
//! An empty file segment means "same document". The JSON-pointer segment is a
//! `/`-delimited path of property names or numeric array indices; an empty
//! pointer denotes the document root.

use serde_json::Value;

use crate::error::OpenRefError;

/// A parsed `$ref` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefPointer {
    /// File path or URL before the `#`. Empty for same-document references.
    pub file: String,
    /// JSON pointer after the `#` (without the leading `#`).
    pub pointer: String,
}

impl RefPointer {
    /// Split a `$ref` string on the first `#`. A ref with no `#` at all is
    /// treated as a bare file reference pointing at that file's root.
    pub fn parse(reference: &str) -> RefPointer {
        match reference.split_once('#') {
            Some((file, pointer)) => RefPointer {
                file: file.to_string(),
                pointer: pointer.to_string(),
            },
            None => RefPointer {
                file: reference.to_string(),
                pointer: String::new(),
            },
        }
    }

    /// Whether the file segment is a URL (contains `://`).
    pub fn is_url(&self) -> bool {
        self.file.contains("://")
    }

    /// Whether this reference targets the containing document.
    pub fn is_local(&self) -> bool {
        self.file.is_empty()
    }

    /// The last pointer segment, e.g. `User` for `#/components/schemas/User`.
    /// Empty for root pointers.
    pub fn terminal_segment(&self) -> &str {
        self.pointer.rsplit('/').next().unwrap_or("")
    }
}

impl std::fmt::Display for RefPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.file, self.pointer)
    }
}

/// Unescape a single JSON-pointer segment per RFC 6901 (`~1` -> `/`, `~0` -> `~`).
fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Split a JSON pointer into its unescaped segments. Empty for the root
/// pointer.
pub fn segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(unescape_segment)
        .collect()
}

/// Navigate a JSON pointer against a value, returning the referenced subtree.
///
/// The leading empty segment produced by splitting `/a/b` on `/` is skipped.
/// A missing path is an error; callers decide whether that degrades the one
/// reference or the whole operation.
pub fn navigate<'a>(root: &'a Value, pointer: &str) -> Result<&'a Value, OpenRefError> {
    let mut current = root;
    for segment in pointer.split('/') {
        if segment.is_empty() {
            continue;
        }
        let segment = unescape_segment(segment);
        current = match current {
            Value::Object(map) => map.get(&segment).ok_or_else(|| OpenRefError::Pointer {
                pointer: pointer.to_string(),
                reason: format!("no property '{segment}'"),
            })?,
            Value::Array(items) => {
                let idx: usize = segment.parse().map_err(|_| OpenRefError::Pointer {
                    pointer: pointer.to_string(),
                    reason: format!("'{segment}' is not an array index"),
                })?;
                items.get(idx).ok_or_else(|| OpenRefError::Pointer {
                    pointer: pointer.to_string(),
                    reason: format!("index {idx} out of bounds"),
                })?
            }
            _ => {
                return Err(OpenRefError::Pointer {
                    pointer: pointer.to_string(),
                    reason: format!("cannot descend into scalar at '{segment}'"),
                })
            }
        };
    }
    Ok(current)
}
