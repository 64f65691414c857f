//! Binding lookups and immediate rebinds.

use super::{
    page_params, require_address, require_caller, require_key, require_str_array_param,
};
use module_registry::{Address, ModuleKey, ModuleRegistry, Result};
use serde_json::{json, Value};

pub fn resolve(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(json!({ "key": key, "address": registry.resolve(&key)? }))
}

pub fn resolve_or_fail(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(json!({ "key": key, "address": registry.resolve_or_fail(&key)? }))
}

pub fn is_registered(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(json!({ "key": key, "registered": registry.is_registered(&key)? }))
}

pub fn get_binding(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    Ok(serde_json::to_value(registry.binding(&key)?)?)
}

pub fn list_keys(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let (offset, limit) = page_params(params);
    Ok(serde_json::to_value(registry.list_keys(offset, limit)?)?)
}

pub fn set_immediate(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let key = require_key(params)?;
    let address = require_address(params, "new_address", "newAddress")?;
    let caller = require_caller(params)?;
    Ok(serde_json::to_value(
        registry.set_immediate(key, address, caller)?,
    )?)
}

pub fn batch_set(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let keys = require_str_array_param(params, "keys", "keys")?
        .into_iter()
        .map(ModuleKey::parse)
        .collect::<Result<Vec<_>>>()?;
    let addresses = require_str_array_param(params, "addresses", "addresses")?
        .into_iter()
        .map(str::parse::<Address>)
        .collect::<Result<Vec<_>>>()?;
    let caller = require_caller(params)?;
    Ok(serde_json::to_value(
        registry.batch_set(&keys, &addresses, caller)?,
    )?)
}
