//! Governance roles: owner, two-step ownership handover, upgrade and
//! emergency admins, and the configurable timelock.

use crate::access::{self, Action};
use crate::error::{RegistryError, Result};
use crate::events::RegistryEvent;
use crate::registry::ModuleRegistry;
use crate::types::Address;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The single governance row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceState {
    pub owner: Address,
    /// Candidate owner awaiting `accept_admin`; zero when none.
    pub pending_admin: Address,
    /// Zero when unset.
    pub upgrade_admin: Address,
    /// Zero when unset.
    pub emergency_admin: Address,
    pub paused: bool,
    /// Seconds between `schedule` and the earliest `execute`.
    pub min_delay: u64,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<GovernanceState> {
    Ok(GovernanceState {
        owner: row.get(0)?,
        pending_admin: row.get(1)?,
        upgrade_admin: row.get(2)?,
        emergency_admin: row.get(3)?,
        paused: row.get(4)?,
        min_delay: row.get(5)?,
    })
}

pub(crate) fn load_optional(conn: &Connection) -> Result<Option<GovernanceState>> {
    Ok(conn
        .query_row(
            "SELECT owner, pending_admin, upgrade_admin, emergency_admin, paused, min_delay
             FROM governance WHERE id = 1",
            [],
            from_row,
        )
        .optional()?)
}

pub(crate) fn load(conn: &Connection) -> Result<GovernanceState> {
    load_optional(conn)?.ok_or_else(|| RegistryError::Config {
        message: "Governance state missing from registry database".to_string(),
    })
}

pub(crate) fn initialize(conn: &Connection, owner: Address, min_delay: u64) -> Result<()> {
    conn.execute(
        "INSERT INTO governance (id, owner, pending_admin, upgrade_admin, emergency_admin, paused, min_delay)
         VALUES (1, ?1, ?2, ?2, ?2, 0, ?3)",
        params![owner, Address::ZERO, min_delay],
    )?;
    Ok(())
}

pub(crate) fn save(conn: &Connection, state: &GovernanceState) -> Result<()> {
    conn.execute(
        "UPDATE governance SET owner = ?1, pending_admin = ?2, upgrade_admin = ?3,
             emergency_admin = ?4, paused = ?5, min_delay = ?6
         WHERE id = 1",
        params![
            state.owner,
            state.pending_admin,
            state.upgrade_admin,
            state.emergency_admin,
            state.paused,
            state.min_delay,
        ],
    )?;
    Ok(())
}

impl ModuleRegistry {
    /// Snapshot of the governance state.
    pub fn governance(&self) -> Result<GovernanceState> {
        self.read(load)
    }

    /// Whether `caller` currently holds a role permitted to perform `action`.
    pub fn has_role(&self, action: Action, caller: Address) -> Result<bool> {
        let gov = self.governance()?;
        Ok(access::has_role(&gov, action, caller))
    }

    /// Nominate a new owner. Passing zero withdraws an outstanding nomination.
    pub fn set_pending_admin(&self, candidate: Address, caller: Address) -> Result<()> {
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::ManageRoles, caller)?;
            let old_pending = gov.pending_admin;
            gov.pending_admin = candidate;
            save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::PendingAdminChanged {
                old_pending,
                new_pending: candidate,
            });
            Ok(())
        })
    }

    /// Complete the ownership handover. Only the nominated address may call.
    pub fn accept_admin(&self, caller: Address) -> Result<()> {
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            if gov.pending_admin.is_zero() || caller != gov.pending_admin {
                return Err(RegistryError::NotPendingAdmin {
                    caller,
                    expected: gov.pending_admin,
                });
            }
            let old_owner = gov.owner;
            gov.owner = caller;
            gov.pending_admin = Address::ZERO;
            save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::OwnershipTransferred {
                old_owner,
                new_owner: caller,
            });
            Ok(())
        })
    }

    pub fn set_upgrade_admin(&self, admin: Address, caller: Address) -> Result<()> {
        let admin = admin.require_nonzero()?;
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::ManageRoles, caller)?;
            let old_admin = std::mem::replace(&mut gov.upgrade_admin, admin);
            save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::UpgradeAdminChanged {
                old_admin,
                new_admin: admin,
            });
            Ok(())
        })
    }

    pub fn set_emergency_admin(&self, admin: Address, caller: Address) -> Result<()> {
        let admin = admin.require_nonzero()?;
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::ManageRoles, caller)?;
            let old_admin = std::mem::replace(&mut gov.emergency_admin, admin);
            save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::EmergencyAdminChanged {
                old_admin,
                new_admin: admin,
            });
            Ok(())
        })
    }

    /// Emergency admin takes over the upgrade admin slot.
    ///
    /// Lets incident response lock out a compromised upgrade key without
    /// touching ownership.
    pub fn recover_upgrade_admin(&self, caller: Address) -> Result<()> {
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::RecoverUpgradeAdmin, caller)?;
            let old_admin = std::mem::replace(&mut gov.upgrade_admin, caller);
            save(ctx.conn, &gov)?;
            ctx.emit(RegistryEvent::UpgradeAdminChanged {
                old_admin,
                new_admin: caller,
            });
            Ok(())
        })
    }

    /// Change the timelock for future schedules. Bounded by the ceiling fixed
    /// at construction; pending upgrades keep their deadline.
    pub fn set_min_delay(&self, delay: u64, caller: Address) -> Result<()> {
        let max = self.config().max_min_delay;
        if delay > max {
            return Err(RegistryError::DelayTooLong {
                requested: delay,
                max,
            });
        }
        self.transact(|ctx| {
            let mut gov = ctx.governance()?;
            access::authorize(&gov, Action::ManageRoles, caller)?;
            let old_delay = std::mem::replace(&mut gov.min_delay, delay);
            save(ctx.conn, &gov)?;
            debug!("min_delay {}s -> {}s", old_delay, delay);
            ctx.emit(RegistryEvent::MinDelayChanged {
                old_delay,
                new_delay: delay,
            });
            Ok(())
        })
    }
}
