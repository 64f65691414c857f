//! Timelocked upgrade workflow.

use super::{page_params, require_address, require_caller, require_key, require_str_array_param};
use module_registry::{ModuleKey, ModuleRegistry, Result};
use serde_json::{json, Value};

pub fn schedule(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    let proposed = require_address(params, "proposed_address", "proposedAddress")?;
    let caller = require_caller(params)?;
    Ok(serde_json::to_value(registry.schedule(key, proposed, caller)?)?)
}

pub fn execute(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    let caller = require_caller(params)?;
    Ok(serde_json::to_value(registry.execute(key, caller)?)?)
}

pub fn cancel(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    let caller = require_caller(params)?;
    Ok(serde_json::to_value(registry.cancel(key, caller)?)?)
}

pub fn batch_cancel(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let keys = require_str_array_param(params, "keys", "keys")?
        .into_iter()
        .map(ModuleKey::parse)
        .collect::<Result<Vec<_>>>()?;
    let caller = require_caller(params)?;
    Ok(json!({ "cancelled": registry.batch_cancel(&keys, caller)? }))
}

pub fn cancel_all(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let caller = require_caller(params)?;
    Ok(json!({ "cancelled": registry.cancel_all(caller)? }))
}

pub fn get_pending(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(serde_json::to_value(registry.pending(&key)?)?)
}

pub fn list_pending(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let (offset, limit) = page_params(params);
    Ok(serde_json::to_value(registry.list_pending(offset, limit)?)?)
}
