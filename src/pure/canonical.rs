// Canonical serialization of BSON values for deduplication keys
//
// Integers are normalized across Int32/Int64. Document and array order is kept,
// since sort specs and exact-match embedded documents depend on it. Only the top
// level of a filter is an unordered conjunction, and `canonical_filter` sorts it.

use mongodb::bson::{Bson, Document};
use std::fmt::Write;

/// Canonical string for any BSON value
pub fn canonical_bson(value: &Bson) -> String {
    let mut out = String::new();
    write_bson(&mut out, value);
    out
}

/// Canonical string for a document, in its own key order
pub fn canonical_document(doc: &Document) -> String {
    let mut out = String::new();
    write_document(&mut out, doc);
    out
}

/// Canonical string for a query filter.
///
/// Top-level predicates are sorted by field; their values keep their order.
pub fn canonical_filter(filter: &Document) -> String {
    let mut entries: Vec<(&String, &Bson)> = filter.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let mut out = String::new();
    write_entries(&mut out, entries);
    out
}

/// Canonical string for a set of `(field, direction)` pairs.
///
/// The pair order is irrelevant to the result.
pub fn canonical_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, i32)>) -> String {
    let mut sorted: Vec<(&str, i32)> = pairs.into_iter().collect();
    sorted.sort_unstable();

    let mut out = String::from("{");
    for (i, (key, direction)) in sorted.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_key(&mut out, key);
        let _ = write!(out, "{direction}");
    }
    out.push('}');
    out
}

fn write_document(out: &mut String, doc: &Document) {
    write_entries(out, doc.iter());
}

fn write_entries<'a>(out: &mut String, entries: impl IntoIterator<Item = (&'a String, &'a Bson)>) {
    out.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_key(out, key);
        write_bson(out, value);
    }
    out.push('}');
}

fn write_key(out: &mut String, key: &str) {
    let _ = write!(out, "{key:?}:");
}

fn write_bson(out: &mut String, value: &Bson) {
    match value {
        Bson::Document(doc) => write_document(out, doc),
        Bson::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_bson(out, item);
            }
            out.push(']');
        }
        Bson::Int32(n) => {
            let _ = write!(out, "{n}");
        }
        Bson::Int64(n) => {
            let _ = write!(out, "{n}");
        }
        Bson::Double(d) => {
            let _ = write!(out, "{d:?}");
        }
        Bson::String(s) => {
            let _ = write!(out, "{s:?}");
        }
        Bson::Boolean(b) => {
            let _ = write!(out, "{b}");
        }
        Bson::Null => out.push_str("null"),
        Bson::ObjectId(oid) => {
            let _ = write!(out, "ObjectId({})", oid.to_hex());
        }
        // Remaining types have stable extended-JSON renderings
        other => {
            let _ = write!(out, "{}", other.clone().into_canonical_extjson());
        }
    }
}
