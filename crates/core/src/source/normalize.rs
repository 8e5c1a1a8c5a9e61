use ledger_feed_protocol::PageBatch;
use serde_json::{Map, Value};

use crate::error::SourceError;

/// Keys that may hold the record array of a page object, in lookup order.
const RECORD_KEYS: &[&str] = &["records", "data", "items", "results"];
const HAS_MORE_KEYS: &[&str] = &["hasMore", "has_more"];
const TOTAL_KEYS: &[&str] = &["totalCount", "total_count", "total"];

/// Normalize a loosely-shaped JSON page into a `PageBatch`.
///
/// Accepted shapes:
/// 1. A top-level array of records.
/// 2. An object holding the array under one of `records`, `data`, `items`
///    or `results`.
/// 3. An object whose `data` member is itself such an object
///    (`{"data": {"records": [...], "hasMore": true}}`).
///
/// Paging metadata is read from the object that holds the array, falling back
/// to the outer object. Anything else is rejected as malformed; the engine
/// never guesses further.
pub fn normalize_payload(value: &Value) -> Result<PageBatch<Value>, SourceError> {
    match value {
        Value::Array(records) => Ok(PageBatch::new(records.clone())),
        Value::Object(outer) => {
            if let Some(records) = find_records(outer) {
                return with_metadata(records.clone(), outer, None);
            }

            if let Some(Value::Object(inner)) = outer.get("data")
                && let Some(records) = find_records(inner)
            {
                return with_metadata(records.clone(), inner, Some(outer));
            }

            Err(SourceError::malformed(format!(
                "no record array under any of {RECORD_KEYS:?}"
            )))
        }
        other => Err(SourceError::malformed(format!(
            "expected an array or object, got {}",
            kind_of(other)
        ))),
    }
}

/// Parse raw bytes and normalize them.
pub fn normalize_bytes(data: &[u8]) -> Result<PageBatch<Value>, SourceError> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| SourceError::malformed(format!("invalid JSON: {e}")))?;
    normalize_payload(&value)
}

fn find_records(obj: &Map<String, Value>) -> Option<&Vec<Value>> {
    RECORD_KEYS
        .iter()
        .find_map(|key| obj.get(*key).and_then(Value::as_array))
}

fn with_metadata(
    records: Vec<Value>,
    holder: &Map<String, Value>,
    outer: Option<&Map<String, Value>>,
) -> Result<PageBatch<Value>, SourceError> {
    let lookup = |keys: &[&str]| {
        keys.iter()
            .find_map(|key| holder.get(*key))
            .or_else(|| outer.and_then(|o| keys.iter().find_map(|key| o.get(*key))))
            .filter(|v| !v.is_null())
    };

    let has_more = match lookup(HAS_MORE_KEYS) {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(other) => {
            return Err(SourceError::malformed(format!(
                "hasMore must be a boolean, got {}",
                kind_of(other)
            )));
        }
    };

    let total_count = match lookup(TOTAL_KEYS) {
        None => None,
        Some(v) => Some(v.as_u64().ok_or_else(|| {
            SourceError::malformed(format!(
                "total count must be a non-negative integer, got {v}"
            ))
        })?),
    };

    Ok(PageBatch {
        records,
        has_more,
        total_count,
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
