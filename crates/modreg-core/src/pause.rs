//! Global circuit breaker for mutating operations.
//!
//! Binding changes and scheduling check the gate before anything except pure
//! argument validation. Cancellation and `pause` itself stay callable while
//! paused so the kill switch always works.

use crate::access::{self, Action};
use crate::error::{RegistryError, Result};
use crate::events::RegistryEvent;
use crate::governance::{self, GovernanceState};
use crate::registry::{ModuleRegistry, TxContext};
use crate::types::Address;

pub(crate) fn ensure_not_paused(gov: &GovernanceState) -> Result<()> {
    if gov.paused {
        Err(RegistryError::Paused)
    } else {
        Ok(())
    }
}

/// Pause gate followed by role check, in that order.
pub(crate) fn guard_mutation(
    ctx: &TxContext<'_>,
    action: Action,
    caller: Address,
) -> Result<GovernanceState> {
    let gov = ctx.governance()?;
    ensure_not_paused(&gov)?;
    access::authorize(&gov, action, caller)?;
    Ok(gov)
}

impl ModuleRegistry {
    pub fn is_paused(&self) -> Result<bool> {
        Ok(self.governance()?.paused)
    }

    /// Owner or emergency admin. Fails `AlreadyPaused` if already paused.
    pub fn pause(&self, caller: Address) -> Result<()> {
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::Pause, caller)?;
            if gov.paused {
                return Err(RegistryError::AlreadyPaused);
            }
            gov.paused = true;
            governance::save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::Paused { by: caller });
            Ok(())
        })
    }

    /// Owner only. Fails `NotPaused` if not paused.
    pub fn unpause(&self, caller: Address) -> Result<()> {
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::Unpause, caller)?;
            if !gov.paused {
                return Err(RegistryError::NotPaused);
            }
            gov.paused = false;
            governance::save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::Unpaused { by: caller });
            Ok(())
        })
    }
}
