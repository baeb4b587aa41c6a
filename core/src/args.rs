//! Argument coercion and shape checks.
//!
//! Typed Rust callers get list and map shapes for free; callers that hand
//! over loosely typed JSON (the C ABI, scripting bridges) go through the
//! `*_arg` helpers here, which reject wrong shapes with
//! `ServiceError::InvalidArgument` before anything reaches the network.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, ServiceError};
use crate::types::FieldMap;

/// Anything that can name a work item by integer id.
pub trait ToItemId {
    fn to_item_id(&self) -> Result<i64>;
}

impl ToItemId for i64 {
    fn to_item_id(&self) -> Result<i64> {
        Ok(*self)
    }
}

impl ToItemId for i32 {
    fn to_item_id(&self) -> Result<i64> {
        Ok(i64::from(*self))
    }
}

impl ToItemId for u32 {
    fn to_item_id(&self) -> Result<i64> {
        Ok(i64::from(*self))
    }
}

impl ToItemId for u64 {
    fn to_item_id(&self) -> Result<i64> {
        i64::try_from(*self).map_err(|_| ServiceError::invalid(format!("id {self} out of range")))
    }
}

impl ToItemId for str {
    fn to_item_id(&self) -> Result<i64> {
        self.trim()
            .parse()
            .map_err(|_| ServiceError::invalid(format!("'{self}' is not a work item id")))
    }
}

impl ToItemId for String {
    fn to_item_id(&self) -> Result<i64> {
        self.as_str().to_item_id()
    }
}

impl ToItemId for Value {
    fn to_item_id(&self) -> Result<i64> {
        match self {
            Value::Number(n) => {
                if let Some(id) = n.as_i64() {
                    return Ok(id);
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Ok(f as i64),
                    _ => Err(ServiceError::invalid(format!("{n} is not a work item id"))),
                }
            }
            Value::String(s) => s.to_item_id(),
            other => Err(ServiceError::invalid(format!("{other} is not a work item id"))),
        }
    }
}

impl<T: ToItemId + ?Sized> ToItemId for &T {
    fn to_item_id(&self) -> Result<i64> {
        (**self).to_item_id()
    }
}

/// Coerce every id up front so a bad entry fails before any remote call.
pub fn coerce_ids<I>(ids: I) -> Result<Vec<i64>>
where
    I: IntoIterator,
    I::Item: ToItemId,
{
    ids.into_iter().map(|id| id.to_item_id()).collect()
}

/// Reject maps with blank field names.
pub fn check_fields(fields: &FieldMap, name: &str) -> Result<()> {
    match fields.keys().find(|k| k.trim().is_empty()) {
        Some(_) => Err(ServiceError::invalid(format!("{name} contains a blank field name"))),
        None => Ok(()),
    }
}

/// Require a JSON array.
pub fn list_arg<'a>(value: &'a Value, name: &str) -> Result<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| ServiceError::invalid(format!("{name} should be a list")))
}

/// Require a JSON object with non-blank keys.
pub fn map_arg(value: &Value, name: &str) -> Result<FieldMap> {
    let map = value
        .as_object()
        .ok_or_else(|| ServiceError::invalid(format!("{name} should be a dictionary")))?;
    check_fields(map, name)?;
    Ok(map.clone())
}

/// Require a JSON object of scalar values, flattened to query parameters.
pub fn params_arg(value: &Value, name: &str) -> Result<BTreeMap<String, String>> {
    let map = map_arg(value, name)?;
    map.into_iter()
        .map(|(k, v)| {
            let text = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(ServiceError::invalid(format!(
                        "{name}: value for '{k}' must be a scalar, got {other}"
                    )))
                }
            };
            Ok((k, text))
        })
        .collect()
}
