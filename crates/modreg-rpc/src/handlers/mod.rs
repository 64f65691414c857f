//! JSON-RPC request handlers, split by domain.

mod bindings;
mod governance;
mod history;
mod upgrades;

use crate::server::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use module_registry::{Address, ErrorKind, ModuleKey, ModuleRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

// ============================================================================
// JSON-RPC types
// ============================================================================

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn from_registry(err: &RegistryError) -> Self {
        Self {
            code: err.to_rpc_error_code(),
            message: err.to_string(),
            data: Some(json!({ "kind": err.kind().as_str() })),
        }
    }
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self::failure(
            id,
            JsonRpcError {
                code,
                message,
                data: None,
            },
        )
    }

    fn from_outcome(id: Option<Value>, outcome: ReplayedOutcome) -> Self {
        match outcome {
            ReplayedOutcome::Success(value) => Self::success(id, value),
            ReplayedOutcome::Failure(error) => Self::failure(id, error),
        }
    }
}

/// Outcome of a mutating call, remembered for idempotent retries.
#[derive(Debug, Clone)]
pub enum ReplayedOutcome {
    Success(Value),
    Failure(JsonRpcError),
}

/// A remembered outcome together with the parameters that produced it.
#[derive(Debug, Clone)]
pub struct ReplayEntry {
    /// Request parameters minus the idempotency key, caller included.
    pub fingerprint: Value,
    pub outcome: ReplayedOutcome,
}

/// Parameters a retry must repeat exactly to be served from the cache.
fn replay_fingerprint(params: &Value) -> Value {
    let mut fingerprint = params.clone();
    if let Some(map) = fingerprint.as_object_mut() {
        map.remove("idempotency_key");
        map.remove("idempotencyKey");
    }
    fingerprint
}

/// Only outcomes that stay true on retry are remembered. A paused registry
/// or an unelapsed timelock can change, so those failures are re-evaluated.
fn is_replayable(err: &RegistryError) -> bool {
    !matches!(
        err.kind(),
        ErrorKind::Availability | ErrorKind::Timelock | ErrorKind::Internal
    )
}

// ============================================================================
// Parameter extraction helpers
// ============================================================================

/// Extract an optional string parameter, supporting both snake_case and camelCase.
pub(crate) fn get_str_param<'a>(params: &'a Value, snake: &str, camel: &str) -> Option<&'a str> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_str())
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param<'a>(
    params: &'a Value,
    snake: &str,
    camel: &str,
) -> module_registry::Result<&'a str> {
    get_str_param(params, snake, camel)
        .ok_or_else(|| RegistryError::invalid(snake, "missing required parameter"))
}

/// Extract an optional u64 parameter, supporting both snake_case and camelCase.
pub(crate) fn get_u64_param(params: &Value, snake: &str, camel: &str) -> Option<u64> {
    params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_u64())
}

pub(crate) fn require_u64_param(
    params: &Value,
    snake: &str,
    camel: &str,
) -> module_registry::Result<u64> {
    get_u64_param(params, snake, camel)
        .ok_or_else(|| RegistryError::invalid(snake, "missing or non-integer parameter"))
}

/// Extract a required array-of-strings parameter.
pub(crate) fn require_str_array_param<'a>(
    params: &'a Value,
    snake: &str,
    camel: &str,
) -> module_registry::Result<Vec<&'a str>> {
    let items = params
        .get(snake)
        .or_else(|| params.get(camel))
        .and_then(|v| v.as_array())
        .ok_or_else(|| RegistryError::invalid(snake, "missing required array parameter"))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| RegistryError::invalid(snake, "array items must be strings"))
        })
        .collect()
}

/// A module key given by name or as 0x-prefixed hex.
pub(crate) fn require_key(params: &Value) -> module_registry::Result<ModuleKey> {
    ModuleKey::parse(require_str_param(params, "key", "key")?)
}

pub(crate) fn require_address(
    params: &Value,
    snake: &str,
    camel: &str,
) -> module_registry::Result<Address> {
    require_str_param(params, snake, camel)?.parse()
}

pub(crate) fn require_caller(params: &Value) -> module_registry::Result<Address> {
    require_address(params, "caller", "caller")
}

pub(crate) fn page_params(params: &Value) -> (u64, u64) {
    (
        get_u64_param(params, "offset", "offset").unwrap_or(0),
        get_u64_param(params, "limit", "limit").unwrap_or(50),
    )
}

// ============================================================================
// HTTP endpoints
// ============================================================================

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id;

    debug!("RPC call: {}({:?})", method, params);

    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    let replay_key = if is_mutation(&method) {
        get_str_param(&params, "idempotency_key", "idempotencyKey")
            .map(|k| (method.clone(), k.to_string()))
    } else {
        None
    };

    let fingerprint = replay_key.as_ref().map(|_| replay_fingerprint(&params));

    if let (Some(cache_key), Some(fingerprint)) = (&replay_key, &fingerprint) {
        if let Some(entry) = state.replays.get(cache_key) {
            if entry.fingerprint != *fingerprint {
                warn!(
                    "Idempotency key {} reused for {} with different parameters",
                    cache_key.1, method
                );
                let err = RegistryError::invalid(
                    "idempotency_key",
                    "already used with different parameters",
                );
                return (
                    StatusCode::OK,
                    Json(JsonRpcResponse::failure(id, JsonRpcError::from_registry(&err))),
                );
            }
            debug!("Replaying {} for idempotency key {}", method, cache_key.1);
            return (
                StatusCode::OK,
                Json(JsonRpcResponse::from_outcome(id, entry.outcome)),
            );
        }
    }

    // Registry calls block on SQLite; keep them off the async workers.
    let registry = Arc::clone(&state.registry);
    let call_method = method.clone();
    let result = tokio::task::spawn_blocking(move || {
        dispatch_method(&registry, &call_method, &params)
    })
    .await;

    let (outcome, replayable) = match result {
        Ok(Some(Ok(value))) => (ReplayedOutcome::Success(value), true),
        Ok(Some(Err(e))) => {
            warn!("RPC error for {}: {}", method, e);
            (
                ReplayedOutcome::Failure(JsonRpcError::from_registry(&e)),
                is_replayable(&e),
            )
        }
        Ok(None) => {
            return (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    -32601,
                    format!("Method not found: {}", method),
                )),
            );
        }
        Err(e) => {
            error!("RPC task for {} failed: {}", method, e);
            return (
                StatusCode::OK,
                Json(JsonRpcResponse::error(
                    id,
                    -32603,
                    format!("Internal error: {}", e),
                )),
            );
        }
    };

    if let (Some(cache_key), Some(fingerprint), true) = (replay_key, fingerprint, replayable) {
        state.replays.insert(
            cache_key,
            ReplayEntry {
                fingerprint,
                outcome: outcome.clone(),
            },
        );
    }
    (StatusCode::OK, Json(JsonRpcResponse::from_outcome(id, outcome)))
}

// ============================================================================
// Method dispatcher
// ============================================================================

const MUTATIONS: &[&str] = &[
    "set_immediate",
    "batch_set",
    "schedule",
    "execute",
    "cancel",
    "batch_cancel",
    "cancel_all",
    "pause",
    "unpause",
    "set_pending_admin",
    "accept_admin",
    "set_upgrade_admin",
    "set_emergency_admin",
    "recover_upgrade_admin",
    "set_min_delay",
];

fn is_mutation(method: &str) -> bool {
    MUTATIONS.contains(&method)
}

/// Dispatch a method call to the appropriate domain handler.
///
/// Returns `None` for unknown methods.
fn dispatch_method(
    registry: &ModuleRegistry,
    method: &str,
    params: &Value,
) -> Option<module_registry::Result<Value>> {
    let result = match method {
        // Bindings
        "resolve" => bindings::resolve(registry, params),
        "resolve_or_fail" => bindings::resolve_or_fail(registry, params),
        "is_registered" => bindings::is_registered(registry, params),
        "get_binding" => bindings::get_binding(registry, params),
        "list_keys" => bindings::list_keys(registry, params),
        "set_immediate" => bindings::set_immediate(registry, params),
        "batch_set" => bindings::batch_set(registry, params),

        // Timelocked upgrades
        "schedule" => upgrades::schedule(registry, params),
        "execute" => upgrades::execute(registry, params),
        "cancel" => upgrades::cancel(registry, params),
        "batch_cancel" => upgrades::batch_cancel(registry, params),
        "cancel_all" => upgrades::cancel_all(registry, params),
        "get_pending" => upgrades::get_pending(registry, params),
        "list_pending" => upgrades::list_pending(registry, params),

        // History
        "history_get" => history::history_get(registry, params),
        "history_get_all" => history::history_get_all(registry, params),
        "history_count" => history::history_count(registry, params),

        // Governance and pause
        "get_governance" => governance::get_governance(registry, params),
        "has_role" => governance::has_role(registry, params),
        "is_paused" => governance::is_paused(registry, params),
        "pause" => governance::pause(registry, params),
        "unpause" => governance::unpause(registry, params),
        "set_pending_admin" => governance::set_pending_admin(registry, params),
        "accept_admin" => governance::accept_admin(registry, params),
        "set_upgrade_admin" => governance::set_upgrade_admin(registry, params),
        "set_emergency_admin" => governance::set_emergency_admin(registry, params),
        "recover_upgrade_admin" => governance::recover_upgrade_admin(registry, params),
        "set_min_delay" => governance::set_min_delay(registry, params),

        _ => return None,
    };
    Some(result)
}
