//! Identifier rules for staged tables and columns.
//!
//! JSON keys are arbitrary strings while staged names must be usable in
//! hand-written SQL without quoting, so every name is reduced to
//! `[A-Za-z0-9_]` and compared case-insensitively (the store's identifiers
//! are case-insensitive).

use lazy_static::lazy_static;
use regex::Regex;

/// Name of the primary-key column every entity table carries.
pub const PRIMARY_KEY: &str = "id";

/// Column name used for a JSON field that is literally called `id`.
pub const ORIGINAL_ID: &str = "original_id";

/// Table holding the root object (or root array elements) when the root is
/// itself an entity rather than a set of query fields.
pub const ROOT_TABLE: &str = "root";

const MAX_IDENTIFIER_LEN: usize = 64;

lazy_static! {
    static ref INVALID_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_]+").unwrap();
    static ref EDGE_UNDERSCORES: Regex = Regex::new(r"^_+|_+$").unwrap();
}

/// Reduce an arbitrary key to a plain SQL identifier.
pub fn sanitize_identifier(raw: &str) -> String {
    let replaced = INVALID_CHARS.replace_all(raw, "_");
    let trimmed = EDGE_UNDERSCORES.replace_all(&replaced, "");

    let mut name: String = trimmed.chars().take(MAX_IDENTIFIER_LEN).collect();
    if name.is_empty() {
        name = "field".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Table name for entities found under `field`.
pub fn table_name(field: &str) -> String {
    let base = sanitize_identifier(field);
    let plural = pluralizer::pluralize(&base, 2, false);
    sanitize_identifier(&plural)
}

/// Column name for a scalar JSON field.
pub fn column_name(field: &str) -> String {
    let name = sanitize_identifier(field);
    if name.eq_ignore_ascii_case(PRIMARY_KEY) {
        ORIGINAL_ID.to_string()
    } else {
        name
    }
}

/// Foreign-key column on a parent row pointing at a nested object.
pub fn reference_column(field: &str) -> String {
    format!("{}_id", sanitize_identifier(field))
}

/// Foreign-key column on a child row pointing back at its parent table.
pub fn parent_column(parent_table: &str) -> String {
    format!("{}_id", parent_table)
}

/// Table name derived from a dotted JSON path, used to disambiguate.
pub fn path_name(path: &str) -> String {
    sanitize_identifier(&path.replace('.', "_"))
}

pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// First of `candidate`, `candidate_2`, `candidate_3`, ... not rejected by `taken`.
pub fn unique_name(candidate: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(candidate) {
        return candidate.to_string();
    }
    (2..)
        .map(|n| format!("{}_{}", candidate, n))
        .find(|name| !taken(name))
        .unwrap_or_else(|| candidate.to_string())
}

/// Double-quote an identifier for generated DDL/DML.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
