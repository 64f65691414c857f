//! Registry events and the sinks that receive them.
//!
//! Events are buffered while an operation runs and handed to the sink only
//! after its transaction commits. A reverted call therefore emits nothing.

use crate::types::{Address, ModuleKey};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// Observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Upgraded {
        key: ModuleKey,
        old_address: Address,
        new_address: Address,
        executor: Address,
    },
    /// A set that would not change the binding.
    NoOp {
        key: ModuleKey,
        address: Address,
        caller: Address,
    },
    UpgradeScheduled {
        key: ModuleKey,
        proposed_address: Address,
        eligible_at: u64,
        scheduled_by: Address,
    },
    UpgradeCancelled {
        key: ModuleKey,
        proposed_address: Address,
        cancelled_by: Address,
    },
    PendingAdminChanged {
        old_pending: Address,
        new_pending: Address,
    },
    OwnershipTransferred {
        old_owner: Address,
        new_owner: Address,
    },
    UpgradeAdminChanged {
        old_admin: Address,
        new_admin: Address,
    },
    EmergencyAdminChanged {
        old_admin: Address,
        new_admin: Address,
    },
    MinDelayChanged {
        old_delay: u64,
        new_delay: u64,
    },
    Paused {
        by: Address,
    },
    Unpaused {
        by: Address,
    },
}

/// Receiver of committed registry events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RegistryEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RegistryEvent) {
        match serde_json::to_string(event) {
            Ok(json) => info!(target: "module_registry::events", "{}", json),
            Err(_) => info!(target: "module_registry::events", "{:?}", event),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<RegistryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn events(&self) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Drain the buffer.
    pub fn take(&self) -> Vec<RegistryEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &RegistryEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
