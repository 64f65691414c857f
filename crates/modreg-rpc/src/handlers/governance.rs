//! Roles, ownership handover, timelock and pause.

use super::{get_str_param, require_address, require_caller, require_u64_param};
use module_registry::{Action, ModuleRegistry, RegistryError, Result};
use serde_json::{json, Value};

fn governance_value(registry: &ModuleRegistry) -> Result<Value> {
    Ok(serde_json::to_value(registry.governance()?)?)
}

fn parse_action(text: &str) -> Result<Action> {
    Action::ALL
        .into_iter()
        .find(|action| action.as_str() == text)
        .ok_or_else(|| RegistryError::invalid("action", format!("unknown action {:?}", text)))
}

pub fn get_governance(registry: &ModuleRegistry, _params: &Value) -> Result<Value> {
    governance_value(registry)
}

pub fn has_role(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let action = parse_action(
        get_str_param(params, "action", "action")
            .ok_or_else(|| RegistryError::invalid("action", "missing required parameter"))?,
    )?;
    let caller = require_caller(params)?;
    Ok(json!({
        "action": action,
        "caller": caller,
        "allowed": registry.has_role(action, caller)?,
    }))
}

pub fn is_paused(registry: &ModuleRegistry, _params: &Value) -> Result<Value> {
    Ok(json!({ "paused": registry.is_paused()? }))
}

pub fn pause(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    registry.pause(require_caller(params)?)?;
    Ok(json!({ "paused": true }))
}

pub fn unpause(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    registry.unpause(require_caller(params)?)?;
    Ok(json!({ "paused": false }))
}

pub fn set_pending_admin(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let candidate = require_address(params, "candidate", "candidate")?;
    registry.set_pending_admin(candidate, require_caller(params)?)?;
    governance_value(registry)
}

pub fn accept_admin(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    registry.accept_admin(require_caller(params)?)?;
    governance_value(registry)
}

pub fn set_upgrade_admin(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let admin = require_address(params, "admin", "admin")?;
    registry.set_upgrade_admin(admin, require_caller(params)?)?;
    governance_value(registry)
}

pub fn set_emergency_admin(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let admin = require_address(params, "admin", "admin")?;
    registry.set_emergency_admin(admin, require_caller(params)?)?;
    governance_value(registry)
}

pub fn recover_upgrade_admin(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    registry.recover_upgrade_admin(require_caller(params)?)?;
    governance_value(registry)
}

pub fn set_min_delay(registry: &ModuleRegistry, params: &Value) -> Result<Value> {
    let delay = require_u64_param(params, "min_delay", "minDelay")?;
    registry.set_min_delay(delay, require_caller(params)?)?;
    governance_value(registry)
}
