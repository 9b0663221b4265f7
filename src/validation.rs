// Validation Layer
// Typed configuration errors and the checks that produce them

use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::path::PathBuf;

/// Configuration errors with enough context to fix the offending file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed test config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Test query #{index} ({name}): {field} is required")]
    MissingField {
        index: usize,
        name: String,
        field: &'static str,
    },

    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Require a present, non-blank string field of a test query entry
pub fn require_non_empty(
    value: Option<String>,
    index: usize,
    name: &str,
    field: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingField {
            index,
            name: name.to_string(),
            field,
        }),
    }
}

/// Interpret a BSON value as an index direction; only 1 and -1 are accepted
pub fn index_direction(field: &str, value: &Bson) -> Result<i32, ConfigError> {
    let direction = match value {
        Bson::Int32(n) => i64::from(*n),
        Bson::Int64(n) => *n,
        Bson::Double(d) if d.fract() == 0.0 => *d as i64,
        other => {
            return Err(ConfigError::invalid(
                format!("hint.{field}"),
                format!("direction must be 1 or -1, got {other}"),
            ))
        }
    };

    match direction {
        1 => Ok(1),
        -1 => Ok(-1),
        n => Err(ConfigError::invalid(
            format!("hint.{field}"),
            format!("direction must be 1 or -1, got {n}"),
        )),
    }
}

/// Parse an `ObjectId("...")` / `ObjectId('...')` literal.
///
/// Returns `Ok(None)` when the string is not such a literal at all.
pub fn parse_object_id_literal(value: &str) -> Result<Option<ObjectId>, ConfigError> {
    let Some(inner) = value
        .strip_prefix("ObjectId(")
        .and_then(|rest| rest.strip_suffix(')'))
    else {
        return Ok(None);
    };

    let hex = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .ok_or_else(|| ConfigError::invalid("ObjectId", format!("unquoted literal {value}")))?;

    ObjectId::parse_str(hex)
        .map(Some)
        .map_err(|e| ConfigError::invalid("ObjectId", format!("{value}: {e}")))
}

/// Rewrite every `ObjectId("...")` string inside a BSON value into a real ObjectId
pub fn rewrite_object_ids(value: Bson) -> Result<Bson, ConfigError> {
    match value {
        Bson::String(s) => match parse_object_id_literal(&s)? {
            Some(oid) => Ok(Bson::ObjectId(oid)),
            None => Ok(Bson::String(s)),
        },
        Bson::Document(doc) => Ok(Bson::Document(rewrite_document_object_ids(doc)?)),
        Bson::Array(items) => items
            .into_iter()
            .map(rewrite_object_ids)
            .collect::<Result<Vec<_>, _>>()
            .map(Bson::Array),
        other => Ok(other),
    }
}

/// Document flavour of [`rewrite_object_ids`], keeping key order
pub fn rewrite_document_object_ids(doc: Document) -> Result<Document, ConfigError> {
    let mut out = Document::new();
    for (key, value) in doc {
        out.insert(key, rewrite_object_ids(value)?);
    }
    Ok(out)
}

/// Path helpers for output files
pub mod path {
    /// Replace anything outside `[A-Za-z0-9._-]` so a query name can be a file stem
    pub fn sanitize_file_stem(name: &str) -> String {
        let sanitized: String = name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // A stem made only of dots would resolve to the directory itself or its parent
        if sanitized.chars().all(|c| c == '.') {
            sanitized.replace('.', "_")
        } else {
            sanitized
        }
    }
}
