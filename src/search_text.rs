//! Derivation of the normalized search string stored on every block.
//!
//! The derived text is recomputed on each write and never authored or
//! persisted independently, so it cannot go stale relative to the fields
//! it is built from.

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::blocks::Block;

/// Flattens a block's searchable fields into one lowercase,
/// diacritic-stripped string ("Café" becomes "cafe").
pub fn derive_search_text(block: &Block) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = &block.title {
        if !title.is_empty() {
            parts.push(title.clone());
        }
    }
    if let Some(content) = &block.content {
        if !content.is_empty() {
            parts.push(content.clone());
        }
    }
    for item in &block.items {
        if !item.text.is_empty() {
            parts.push(item.text.clone());
        }
    }
    for value in block.data.values() {
        collect_leaves(value, &mut parts);
    }

    normalize(&parts.join(" "))
}

/// Collects string and number leaves, recursing through objects and
/// arrays. Booleans and nulls carry no searchable text and are skipped.
fn collect_leaves(value: &Value, parts: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            if !s.is_empty() {
                parts.push(s.clone());
            }
        }
        Value::Number(n) => parts.push(n.to_string()),
        Value::Array(values) => {
            for v in values {
                collect_leaves(v, parts);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                collect_leaves(v, parts);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

/// Lowercases, decomposes (NFD) and drops combining diacritical marks.
/// Keyword queries go through the same pipeline so accented input
/// matches the stored form.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect()
}
