//! Audit trail queries.

use super::{require_key, require_u64_param};
use module_registry::{ModuleRegistry, Result};
use serde_json::{json, Value};

pub fn history_get(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    let index = require_u64_param(params, "index", "index")?;
    Ok(serde_json::to_value(registry.history_at(&key, index)?)?)
}

pub fn history_get_all(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(json!({
        "key": key,
        "count": registry.history_count(&key)?,
        "records": registry.history_all(&key)?,
    }))
}

pub fn history_count(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(json!({ "key": key, "count": registry.history_count(&key)? }))
}
