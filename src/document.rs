//! Schema document loading and identity.
//!
//! Documents are arbitrarily nested JSON/YAML structures. No shape is assumed
//! beyond the `$ref` convention, except that documents parsed from text must
//! carry a top-level version discriminator (`openapi`, `asyncapi`, or
//! `swagger`) — without one there is nothing meaningful to resolve against.
//!
//! Every [`Document`] gets a stable [`DocumentId`] at construction. Resolution
//! results are memoized by this id, so resolving the same document twice is a
//! cache hit regardless of content equality elsewhere.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OpenRefError;

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity for a loaded document, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

impl DocumentId {
    fn next() -> DocumentId {
        DocumentId(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a document came from. Used for diagnostics and for resolving file
/// references relative to the document's own directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentSource {
    File(PathBuf),
    Url(String),
    Inline,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub id: DocumentId,
    pub source: DocumentSource,
    pub value: Value,
}

/// Parse text as JSON if it looks like JSON (starts with `{`), otherwise YAML.
pub fn parse_text(text: &str) -> Result<Value, OpenRefError> {
    if text.trim_start().starts_with('{') {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(serde_yaml::from_str(text)?)
    }
}

fn check_discriminator(value: &Value) -> Result<(), OpenRefError> {
    let Some(map) = value.as_object() else {
        return Err(OpenRefError::Document(
            "top level of a schema document must be an object".to_string(),
        ));
    };
    if ["openapi", "asyncapi", "swagger"]
        .iter()
        .any(|k| map.contains_key(*k))
    {
        Ok(())
    } else {
        Err(OpenRefError::Document(
            "missing version discriminator (expected one of 'openapi', 'asyncapi', 'swagger')"
                .to_string(),
        ))
    }
}

impl Document {
    /// Parse a document from JSON or YAML text, failing fast on malformed
    /// input or a missing version discriminator.
    pub fn parse(text: &str, source: DocumentSource) -> Result<Document, OpenRefError> {
        let value = parse_text(text)?;
        check_discriminator(&value)?;
        Ok(Document {
            id: DocumentId::next(),
            source,
            value,
        })
    }

    /// Wrap an already-parsed in-memory value. No discriminator check:
    /// in-memory inputs are trusted as-is per the resolver's contract.
    pub fn from_value(value: Value) -> Document {
        Document {
            id: DocumentId::next(),
            source: DocumentSource::Inline,
            value,
        }
    }

    /// Read and parse a document from a file on disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Document, OpenRefError> {
        let path = path.as_ref();
        tracing::debug!("Reading document from {:?}", path);
        let text = tokio::fs::read_to_string(path).await?;
        Document::parse(&text, DocumentSource::File(path.to_path_buf()))
    }

    /// Fetch and parse a document served at a URL.
    pub async fn from_url(url: &str) -> Result<Document, OpenRefError> {
        tracing::debug!("Fetching document from {url}");
        let parsed = url::Url::parse(url)?;
        let response = reqwest::get(parsed).await?.error_for_status()?;
        let text = response.text().await?;
        Document::parse(&text, DocumentSource::Url(url.to_string()))
    }

    /// The directory file references inside this document resolve against,
    /// when the document itself came from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        match &self.source {
            DocumentSource::File(path) => path.parent().map(Path::to_path_buf),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_is_sniffed_by_leading_brace() {
        let v = parse_text(r#"{"openapi": "3.1.0"}"#).unwrap();
        assert_eq!(v["openapi"], "3.1.0");
    }

    #[test]
    fn non_json_text_parses_as_yaml() {
        let v = parse_text("openapi: 3.1.0\ninfo:\n  title: t\n").unwrap();
        assert_eq!(v["info"]["title"], "t");
    }

    #[test]
    fn parse_rejects_missing_discriminator() {
        let err = Document::parse(r#"{"title": "no version"}"#, DocumentSource::Inline)
            .expect_err("should fail fast");
        assert!(matches!(err, OpenRefError::Document(_)));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(Document::parse("{not json", DocumentSource::Inline).is_err());
        assert!(Document::parse(":\n  - [broken", DocumentSource::Inline).is_err());
    }

    #[test]
    fn from_value_skips_discriminator_check() {
        let doc = Document::from_value(json!({"Node": {"type": "object"}}));
        assert_eq!(doc.source, DocumentSource::Inline);
    }

    #[test]
    fn document_ids_are_distinct() {
        let a = Document::from_value(json!({}));
        let b = Document::from_value(json!({}));
        assert_ne!(a.id, b.id);
    }
}
