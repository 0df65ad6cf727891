//! Reference resolution: turning `$ref` pointers into inline values.
//!
//! [`Resolver::resolve`] walks a document depth-first and replaces every
//! `$ref` object with the referenced subtree. For each ref it tries, in
//! order:
//!
//! 1. the chain of pluggable [`RefResolver`]s (custom caches, URL fetchers),
//! 2. the file resolver, when the ref's file segment is non-empty and not a
//!    URL (reads a sibling file, sniffs JSON vs YAML, then descends the
//!    JSON-pointer segment inside it),
//! 3. the local-pointer resolver against the in-progress root document.
//!
//! A ref that closes a cycle — it targets an ancestor of the position being
//! resolved, or a ref whose expansion is still in progress — short-circuits
//! to a stub carrying only the ref-path marker instead of recursing forever.
//! An unresolvable ref degrades to an explicit
//! unresolved marker with a warning; one bad reference never aborts the rest
//! of the document.
//!
//! Resolved output is memoized per [`DocumentId`]. The cache entry is an
//! in-flight initialization: concurrent first callers share one resolution
//! pass and late arrivals await the same result.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::{
    config::ClientConfig,
    document::{parse_text, Document, DocumentId, DocumentSource},
    error::OpenRefError,
    pointer::{navigate, segments, RefPointer},
};

/// The reference key recognized in schema objects.
pub const REF_KEY: &str = "$ref";

/// Internal annotation attached to nodes that originated from a `$ref`,
/// carrying the normalized ref path. Not part of the logical schema; consumed
/// by the encoder and code generator to tell "same logical ref" apart from
/// incidentally-equal content.
pub const REF_PATH_KEY: &str = "x-ref-path";

/// Marker left in place of a reference that could not be resolved.
pub const UNRESOLVED_KEY: &str = "x-unresolved";

/// A pluggable external resolver. Returning `Ok(None)` declines the reference
/// and passes it to the next resolver in the chain.
#[async_trait]
pub trait RefResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Option<Value>, OpenRefError>;
}

/// Same-process cache resolver: serves references from a fixed map.
#[derive(Debug, Default, Clone)]
pub struct MapResolver {
    entries: BTreeMap<String, Value>,
}

impl MapResolver {
    pub fn new(entries: BTreeMap<String, Value>) -> Self {
        MapResolver { entries }
    }

    pub fn insert(&mut self, reference: impl Into<String>, value: Value) {
        self.entries.insert(reference.into(), value);
    }
}

#[async_trait]
impl RefResolver for MapResolver {
    async fn resolve(&self, reference: &str) -> Result<Option<Value>, OpenRefError> {
        Ok(self.entries.get(reference).cloned())
    }
}

/// URL resolver: fetches `<scheme>://...#<pointer>` references over HTTP.
///
/// Declines non-URL references. Fetch or parse failures also decline (with a
/// warning) so the reference degrades through the normal fallback path
/// instead of aborting resolution.
pub struct HttpResolver {
    client: reqwest::Client,
}

impl Default for HttpResolver {
    fn default() -> Self {
        HttpResolver {
            client: reqwest::Client::new(),
        }
    }
}

impl HttpResolver {
    pub fn new(client: reqwest::Client) -> Self {
        HttpResolver { client }
    }
}

#[async_trait]
impl RefResolver for HttpResolver {
    async fn resolve(&self, reference: &str) -> Result<Option<Value>, OpenRefError> {
        let ptr = RefPointer::parse(reference);
        if !ptr.is_url() {
            return Ok(None);
        }
        let fetched = async {
            let response = self
                .client
                .get(&ptr.file)
                .send()
                .await?
                .error_for_status()?;
            let text = response.text().await?;
            let root = parse_text(&text)?;
            let target = navigate(&root, &ptr.pointer)?.clone();
            Ok::<Value, OpenRefError>(target)
        }
        .await;
        match fetched {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Failed to fetch reference '{reference}': {e}");
                Ok(None)
            }
        }
    }
}

type CacheEntry = Arc<OnceCell<Arc<Value>>>;

/// Per-resolution traversal state.
#[derive(Default)]
struct ResolveState {
    /// Position being resolved, as pointer segments within the document the
    /// traversal is currently inside.
    path: Vec<String>,
    /// Canonical file path of the document the traversal is currently inside,
    /// when it came from a file. Qualifies local refs so `#/P` in one file
    /// never collides with `#/P` in another.
    file: Option<PathBuf>,
    /// Canonical ref paths whose expansion is in progress on the current
    /// branch.
    in_progress: HashSet<String>,
}

/// A looked-up reference target.
enum Target {
    /// Answered by a custom resolver; carries no surrounding document.
    Detached(Value),
    /// A pointer into the current document.
    Local(Value),
    /// A pointer into an external file, with that file's root, canonical
    /// path, and directory.
    File {
        value: Value,
        root: Value,
        path: PathBuf,
        dir: Option<PathBuf>,
    },
}

fn is_prefix(candidate: &[String], path: &[String]) -> bool {
    candidate.len() <= path.len() && candidate.iter().zip(path).all(|(a, b)| a == b)
}

/// Canonical form of a ref: URL refs pass through, local refs are qualified
/// with the containing file, file refs are joined against the base directory
/// and canonicalized (falling back to the lexical join for unreadable paths).
/// This is the key used for cycle tracking and the ref-path marker, so the
/// same pointer spelled from two different files stays two distinct refs.
async fn canonical_reference(
    reference: &str,
    ptr: &RefPointer,
    base: Option<&Path>,
    file: Option<&Path>,
) -> String {
    if ptr.is_url() {
        return reference.to_string();
    }
    if ptr.is_local() {
        return match file {
            Some(file) => format!("{}#{}", file.display(), ptr.pointer),
            None => reference.to_string(),
        };
    }
    let joined = match base {
        Some(dir) => dir.join(&ptr.file),
        None => PathBuf::from(&ptr.file),
    };
    let canonical = tokio::fs::canonicalize(&joined).await.unwrap_or(joined);
    format!("{}#{}", canonical.display(), ptr.pointer)
}

/// Reference resolver with a per-document memoization cache.
#[derive(Default)]
pub struct Resolver {
    base_dir: Option<PathBuf>,
    resolvers: Vec<Arc<dyn RefResolver>>,
    cache: Mutex<HashMap<DocumentId, CacheEntry>>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver::default()
    }

    /// Build a resolver from client configuration, taking its base directory
    /// for file references.
    pub fn from_config(config: &ClientConfig) -> Self {
        let resolver = Resolver::new();
        match &config.base_dir {
            Some(dir) => resolver.with_base_dir(dir.clone()),
            None => resolver,
        }
    }

    /// Base directory for file references. Falls back to the document's own
    /// directory when the document was loaded from a file.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Append a custom resolver to the chain. Resolvers run in insertion
    /// order; the first to return a value wins.
    pub fn with_resolver(mut self, resolver: Arc<dyn RefResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Resolve all references in `doc`, memoized by document identity.
    ///
    /// Repeated calls for the same [`Document`] return the cached `Arc`
    /// without re-reading files or re-running custom resolvers.
    pub async fn resolve(&self, doc: &Document) -> Result<Arc<Value>, OpenRefError> {
        let cell = {
            let mut cache = self.cache.lock();
            cache.entry(doc.id).or_default().clone()
        };
        let resolved = cell
            .get_or_try_init(|| async {
                tracing::debug!("Resolving {}", doc.id);
                let base = self.base_dir.clone().or_else(|| doc.base_dir());
                let mut state = ResolveState::default();
                if let DocumentSource::File(path) = &doc.source {
                    state.file = Some(
                        tokio::fs::canonicalize(path)
                            .await
                            .unwrap_or_else(|_| path.clone()),
                    );
                }
                let value = self
                    .resolve_node(&doc.value, &doc.value, base.as_deref(), &mut state)
                    .await?;
                Ok::<Arc<Value>, OpenRefError>(Arc::new(value))
            })
            .await?;
        Ok(resolved.clone())
    }

    /// Drop the cached resolution for a document, e.g. after a dev-mode file
    /// change, so the next resolve runs against a fresh parse.
    pub fn invalidate(&self, id: DocumentId) {
        self.cache.lock().remove(&id);
    }

    fn resolve_node<'a>(
        &'a self,
        root: &'a Value,
        node: &'a Value,
        base: Option<&'a Path>,
        state: &'a mut ResolveState,
    ) -> BoxFuture<'a, Result<Value, OpenRefError>> {
        Box::pin(async move {
            match node {
                Value::Object(map) => {
                    if let Some(reference) = map.get(REF_KEY).and_then(Value::as_str) {
                        return self
                            .resolve_reference(root, reference.to_string(), base, state)
                            .await;
                    }
                    let mut out = Map::with_capacity(map.len());
                    for (key, child) in map {
                        state.path.push(key.clone());
                        let resolved = self.resolve_node(root, child, base, state).await;
                        state.path.pop();
                        out.insert(key.clone(), resolved?);
                    }
                    Ok(Value::Object(out))
                }
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for (idx, item) in items.iter().enumerate() {
                        state.path.push(idx.to_string());
                        let resolved = self.resolve_node(root, item, base, state).await;
                        state.path.pop();
                        out.push(resolved?);
                    }
                    Ok(Value::Array(out))
                }
                scalar => Ok(scalar.clone()),
            }
        })
    }

    async fn resolve_reference(
        &self,
        root: &Value,
        reference: String,
        base: Option<&Path>,
        state: &mut ResolveState,
    ) -> Result<Value, OpenRefError> {
        let ptr = RefPointer::parse(&reference);
        let canonical =
            canonical_reference(&reference, &ptr, base, state.file.as_deref()).await;

        // A local ref targeting the position being resolved or one of its
        // ancestors closes a cycle, as does re-entering a ref whose expansion
        // is still in progress. Either way the occurrence becomes a stub
        // carrying only the ref-path marker.
        let closes_cycle = state.in_progress.contains(&canonical)
            || (ptr.is_local() && is_prefix(&segments(&ptr.pointer), &state.path));
        if closes_cycle {
            let mut stub = Map::new();
            stub.insert(REF_PATH_KEY.to_string(), Value::String(canonical));
            return Ok(Value::Object(stub));
        }

        let Some(target) = self.lookup(root, &reference, &ptr, base).await else {
            tracing::warn!("Unresolved reference '{reference}'");
            let mut marker = Map::new();
            marker.insert(UNRESOLVED_KEY.to_string(), Value::String(reference));
            return Ok(Value::Object(marker));
        };

        // The expansion is traversed at the target's own position (and, for
        // file targets, against the external file's root, path, and
        // directory), so nested references inside it resolve in the right
        // context.
        let (target_value, next_path) = match &target {
            Target::Local(value) => (value, segments(&ptr.pointer)),
            Target::Detached(value) => (value, Vec::new()),
            Target::File { value, .. } => (value, segments(&ptr.pointer)),
        };
        let next_root = match &target {
            Target::File { root, .. } => root,
            _ => root,
        };
        let next_base = match &target {
            Target::File { dir, .. } => dir.as_deref().or(base),
            _ => base,
        };
        let next_file = match &target {
            Target::File { path, .. } => Some(path.clone()),
            _ => state.file.clone(),
        };

        state.in_progress.insert(canonical.clone());
        let saved_path = std::mem::replace(&mut state.path, next_path);
        let saved_file = std::mem::replace(&mut state.file, next_file);
        let resolved = self
            .resolve_node(next_root, target_value, next_base, state)
            .await;
        state.path = saved_path;
        state.file = saved_file;
        state.in_progress.remove(&canonical);
        let mut resolved = resolved?;

        if let Value::Object(ref mut map) = resolved {
            map.insert(REF_PATH_KEY.to_string(), Value::String(canonical));
        }
        Ok(resolved)
    }

    /// Try the custom chain, then the file resolver, then the local pointer.
    async fn lookup(
        &self,
        root: &Value,
        reference: &str,
        ptr: &RefPointer,
        base: Option<&Path>,
    ) -> Option<Target> {
        for resolver in &self.resolvers {
            match resolver.resolve(reference).await {
                Ok(Some(value)) => return Some(Target::Detached(value)),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!("Custom resolver failed for '{reference}': {e}");
                    continue;
                }
            }
        }

        if !ptr.is_local() && !ptr.is_url() {
            return self.lookup_file(reference, ptr, base).await;
        }

        match navigate(root, &ptr.pointer) {
            Ok(value) => Some(Target::Local(value.clone())),
            Err(e) => {
                tracing::warn!("Local pointer lookup failed for '{reference}': {e}");
                None
            }
        }
    }

    async fn lookup_file(
        &self,
        reference: &str,
        ptr: &RefPointer,
        base: Option<&Path>,
    ) -> Option<Target> {
        let joined = match base {
            Some(dir) => dir.join(&ptr.file),
            None => PathBuf::from(&ptr.file),
        };
        let path = tokio::fs::canonicalize(&joined).await.unwrap_or(joined);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Cannot read referenced file {:?}: {e}", path);
                return None;
            }
        };
        // A broken auxiliary file degrades one subtree, not the document.
        let file_root = match parse_text(&text) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Malformed referenced file {:?}: {e}", path);
                return None;
            }
        };
        let target = match navigate(&file_root, &ptr.pointer) {
            Ok(value) => value.clone(),
            Err(e) => {
                tracing::warn!("Pointer lookup failed in {:?} for '{reference}': {e}", path);
                return None;
            }
        };
        let file_dir = path.parent().map(Path::to_path_buf);
        Some(Target::File {
            value: target,
            root: file_root,
            path,
            dir: file_dir,
        })
    }
}
