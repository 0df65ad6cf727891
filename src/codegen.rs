//! Identity-preserving code generation.
//!
//! Where [`crate::encode`] flattens cycles into sentinel strings, this module
//! emits source text that reconstructs the document as a true object graph:
//! every location pointing at the same ref path ends up holding the *same*
//! object at runtime, including through cycles.
//!
//! The generated ES module works in four passes:
//!
//! 1. collect every distinct `$ref` string into an ordered slot table,
//! 2. allocate one empty placeholder object per slot before any content is
//!    filled in, so forward and cyclic references always land on a valid
//!    object,
//! 3. fill each slot with `Object.assign` onto its placeholder — an in-place
//!    merge, not a fresh literal, which is what lets every captured reference
//!    observe the population,
//! 4. emit the top-level document with its own `$ref` occurrences rewritten
//!    to slot lookups.
//!
//! A ref path that is never reachable from the root still gets a slot and is
//! still populated; the table stays uniform with no removal special case.

use std::{collections::HashMap, fmt::Write};

use serde_json::{Map, Value};

use crate::{
    error::OpenRefError,
    pointer::{navigate, RefPointer},
    resolve::REF_KEY,
};

/// Placeholder written into serialized JSON where a slot lookup belongs,
/// swapped for `slots[i]` in the emitted text.
fn slot_token(index: usize) -> String {
    format!("__openref_slot_{index}__")
}

/// Collect every distinct `$ref` string in deterministic traversal order.
pub fn collect_ref_table(value: &Value) -> Vec<String> {
    let mut table = Vec::new();
    let mut index = HashMap::new();
    collect_refs(value, &mut table, &mut index);
    table
}

fn collect_refs(value: &Value, table: &mut Vec<String>, index: &mut HashMap<String, usize>) {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get(REF_KEY).and_then(Value::as_str) {
                if !index.contains_key(reference) {
                    index.insert(reference.to_string(), table.len());
                    table.push(reference.to_string());
                }
            }
            for child in map.values() {
                collect_refs(child, table, index);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_refs(item, table, index);
            }
        }
        _ => {}
    }
}

/// Rewrite every nested `$ref` object into a slot token string.
fn rewrite_refs(value: &Value, index: &HashMap<String, usize>) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(reference) = map.get(REF_KEY).and_then(Value::as_str) {
                if let Some(slot) = index.get(reference) {
                    return Value::String(slot_token(*slot));
                }
            }
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key.clone(), rewrite_refs(child, index));
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| rewrite_refs(item, index)).collect())
        }
        scalar => scalar.clone(),
    }
}

/// Serialize a rewritten value, splicing slot tokens into bare `slots[i]`
/// expressions.
fn emit_value(value: &Value, table_len: usize) -> Result<String, OpenRefError> {
    let mut text = serde_json::to_string_pretty(value)?;
    for slot in 0..table_len {
        let quoted = format!("\"{}\"", slot_token(slot));
        text = text.replace(&quoted, &format!("slots[{slot}]"));
    }
    Ok(text)
}

/// Generate ES-module source text reconstructing `document` with shared
/// identity across every occurrence of the same ref path.
pub fn generate(document: &Value) -> Result<String, OpenRefError> {
    let table = collect_ref_table(document);
    let index: HashMap<String, usize> = table
        .iter()
        .enumerate()
        .map(|(i, r)| (r.clone(), i))
        .collect();

    let mut out = String::new();
    writeln!(out, "// Generated by openref-core. Do not edit.")?;

    // Pass 2: placeholders first, so cycles resolve before any fill runs.
    writeln!(out, "const slots = [")?;
    for reference in &table {
        writeln!(out, "  {{}}, // {reference}")?;
    }
    writeln!(out, "];")?;
    writeln!(out)?;

    // Pass 3: in-place merges onto the pre-allocated placeholders.
    for (slot, reference) in table.iter().enumerate() {
        let ptr = RefPointer::parse(reference);
        let subtree = if ptr.is_local() {
            match navigate(document, &ptr.pointer) {
                Ok(value) => rewrite_refs(value, &index),
                Err(e) => {
                    tracing::warn!("No subtree for slot {slot} ('{reference}'): {e}");
                    Value::Object(Map::new())
                }
            }
        } else {
            // External targets are not present in this document; the slot is
            // still allocated and populated so the table stays uniform.
            tracing::warn!("External reference '{reference}' emitted as an empty slot");
            Value::Object(Map::new())
        };
        writeln!(
            out,
            "Object.assign(slots[{slot}], {});",
            emit_value(&subtree, table.len())?
        )?;
    }
    writeln!(out)?;

    // Pass 4: the document itself, refs routed through the slot table.
    let root = rewrite_refs(document, &index);
    writeln!(out, "const document = {};", emit_value(&root, table.len())?)?;
    writeln!(out)?;
    writeln!(out, "export {{ document as default, slots }};")?;
    Ok(out)
}
