//! Circular-reference-safe encoding.
//!
//! [`encode`] rewrites a resolved value graph into one that is guaranteed
//! finite-depth and serializable, even when the source document was cyclic.
//! Back-edges become sentinel strings:
//!
//! - `circular-reference:<label>` for a true cycle (a ref reachable from
//!   within its own expansion),
//! - `ref:<path>` when the same logical ref was already fully expanded
//!   earlier in the current branch, so re-expansion would only duplicate it.
//!
//! Two sibling branches referencing the same non-cyclic schema are each
//! expanded in full: the seen-ref-path set is scoped to the branch being
//! descended (added before entering a marked node, removed after returning),
//! while a separate global memo only short-cuts the re-encoding work, never
//! the output shape. This distinction is load-bearing for diamond-shaped
//! documents; collapsing the two sets into one makes sibling reuse collapse
//! into markers.
//!
//! Encoding is intentionally lossy: the consumer is a serialization boundary
//! where object identity cannot survive anyway. For identity-preserving
//! output use [`crate::codegen`] instead.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::pointer::RefPointer;
use crate::resolve::REF_PATH_KEY;

/// Sentinel prefix for true cycles.
pub const CIRCULAR_REF_PREFIX: &str = "circular-reference:";

/// Sentinel prefix for shared-ref reuse within one branch.
pub const SHARED_REF_PREFIX: &str = "ref:";

/// Structural keys skipped when choosing a human-readable cycle label, so the
/// label names the schema rather than the word "properties".
const GENERIC_KEYS: [&str; 5] = ["properties", "items", "allOf", "anyOf", "oneOf"];

struct EncodeState {
    /// Key names from the root to the current node.
    path: Vec<String>,
    /// Ref paths on the branch currently being descended.
    branch_refs: HashSet<String>,
    /// Fully encoded output per ref path, for non-cyclic reuse.
    encoded: BTreeMap<String, Value>,
}

/// Encode a resolved value into a finite, serializable counterpart.
pub fn encode(value: &Value) -> Value {
    let mut state = EncodeState {
        path: Vec::new(),
        branch_refs: HashSet::new(),
        encoded: BTreeMap::new(),
    };
    encode_node(value, &mut state)
}

fn encode_node(value: &Value, state: &mut EncodeState) -> Value {
    match value {
        Value::Object(map) => encode_object(map, state),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                state.path.push(idx.to_string());
                out.push(encode_node(item, state));
                state.path.pop();
            }
            Value::Array(out)
        }
        scalar => scalar.clone(),
    }
}

fn encode_object(map: &Map<String, Value>, state: &mut EncodeState) -> Value {
    let marker = map
        .get(REF_PATH_KEY)
        .and_then(Value::as_str)
        .map(str::to_string);

    if let Some(ref_path) = marker {
        // A marker-only stub is the resolver's short-circuit for a cycle.
        if map.len() == 1 {
            return Value::String(format!(
                "{CIRCULAR_REF_PREFIX}{}",
                cycle_label(&ref_path, &state.path)
            ));
        }
        // Same logical ref already being expanded on this branch: emit a
        // short reference marker instead of duplicating the expansion.
        if state.branch_refs.contains(&ref_path) {
            return Value::String(format!("{SHARED_REF_PREFIX}{ref_path}"));
        }
        // Encoded once before, on a branch that has since returned: reuse the
        // finished output rather than re-walking the subtree.
        if let Some(prev) = state.encoded.get(&ref_path) {
            return prev.clone();
        }

        state.branch_refs.insert(ref_path.clone());
        let out = encode_fields(map, state);
        state.branch_refs.remove(&ref_path);
        state.encoded.insert(ref_path, out.clone());
        return out;
    }

    encode_fields(map, state)
}

fn encode_fields(map: &Map<String, Value>, state: &mut EncodeState) -> Value {
    let mut out = Map::with_capacity(map.len());
    for (key, child) in map {
        // The ref-path marker is internal bookkeeping, not schema content.
        if key == REF_PATH_KEY {
            continue;
        }
        state.path.push(key.clone());
        out.insert(key.clone(), encode_node(child, state));
        state.path.pop();
    }
    Value::Object(out)
}

/// Label for a circular-reference sentinel. Prefers the ref's terminal
/// pointer segment; falls back to the nearest ancestor key that is not a
/// generic structural key, then to the ref path itself.
fn cycle_label(ref_path: &str, path: &[String]) -> String {
    let terminal = RefPointer::parse(ref_path).terminal_segment().to_string();
    if !terminal.is_empty() {
        return terminal;
    }
    path.iter()
        .rev()
        .skip(1)
        .find(|key| !GENERIC_KEYS.contains(&key.as_str()))
        .cloned()
        .unwrap_or_else(|| ref_path.to_string())
}
