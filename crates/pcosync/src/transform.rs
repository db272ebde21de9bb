//! Conversion of Planning Center JSON:API resources into warehouse rows.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::catalog::{Endpoint, FieldType};

/// One warehouse row, keyed by column name.
pub type Row = Map<String, Value>;

/// Convert API items into rows for `endpoint`.
///
/// Null or empty items and items without a usable id are skipped. When
/// the same id appears more than once, the first occurrence wins.
pub fn to_rows(endpoint: &Endpoint, items: &[Value]) -> Vec<Row> {
    let mut seen = HashSet::new();
    let mut rows = Vec::with_capacity(items.len());

    for item in items {
        if is_empty(item) {
            continue;
        }
        let Some(row) = to_row(endpoint, item) else {
            tracing::warn!(endpoint = endpoint.name, "skipping item without id");
            continue;
        };
        if seen.insert(row_id(endpoint, &row).to_owned()) {
            rows.push(row);
        }
    }
    rows
}

/// Convert a single item. Returns None when it has no usable id.
pub fn to_row(endpoint: &Endpoint, item: &Value) -> Option<Row> {
    let id = id_string(item.get("id")?)?;

    let mut row = Row::new();
    row.insert(endpoint.id_column.to_owned(), Value::String(id));
    for column in endpoint.columns {
        let value = match lookup(item, column.source) {
            Some(raw) => coerce(raw, column.field_type),
            None => missing(column.field_type),
        };
        row.insert(column.name.to_owned(), value);
    }
    Some(row)
}

/// The id of a row produced by [`to_row`].
pub fn row_id<'a>(endpoint: &Endpoint, row: &'a Row) -> &'a str {
    row.get(endpoint.id_column)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn is_empty(item: &Value) -> bool {
    match item {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `attributes[source]`, falling back to `relationships[source].data.id`.
fn lookup<'a>(item: &'a Value, source: &str) -> Option<&'a Value> {
    item.get("attributes")
        .and_then(|a| a.get(source))
        .filter(|v| !v.is_null())
        .or_else(|| {
            item.get("relationships")?
                .get(source)?
                .get("data")?
                .get("id")
                .filter(|v| !v.is_null())
        })
}

/// Value used when the source attribute is absent or null.
pub fn missing(field_type: FieldType) -> Value {
    match field_type {
        FieldType::String => Value::String(String::new()),
        FieldType::Float => Value::from(0.0),
        FieldType::Integer => Value::from(0),
        FieldType::Timestamp => Value::Null,
    }
}

/// Coerce a present value to the column type. Unconvertible numbers become
/// zero; unparseable timestamps become null.
pub fn coerce(value: &Value, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Float => Value::from(to_f64(value).unwrap_or(0.0)),
        FieldType::Integer => Value::from(to_i64(value).unwrap_or(0)),
        FieldType::Timestamp => to_timestamp(value).map_or(Value::Null, Value::String),
        FieldType::String => Value::String(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            // arch-lint: allow(no-silent-result-drop) reason="unparseable amounts load as 0.0"
            .ok()
            .filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.trunc() as i64)
        }),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            // arch-lint: allow(no-silent-result-drop) reason="unparseable integers load as 0"
            .ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// RFC 3339 in UTC. Bare dates are taken as midnight UTC.
fn to_timestamp(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    let parsed = DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
        // arch-lint: allow(no-silent-result-drop) reason="unparseable timestamps load as NULL"
        .ok()?;
    Some(parsed.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}
