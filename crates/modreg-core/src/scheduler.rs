//! Timelocked upgrade workflow.
//!
//! Per key: `NoPending -> Pending -> NoPending`, leaving `Pending` through
//! either `execute` (after `eligible_at`) or `cancel`. A pending upgrade is a
//! row in `pending_upgrades`; the row's absence is the `NoPending` state.

use crate::access::{self, Action};
use crate::error::{RegistryError, Result};
use crate::events::RegistryEvent;
use crate::history::ChangeOrigin;
use crate::pause;
use crate::registry::{ModuleRegistry, TxContext};
use crate::table::{self, page_window, SetOutcome};
use crate::types::{Address, ModuleKey, Page};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A proposed binding waiting out its delay.
///
/// An inactive value (returned when nothing is pending) has every other field
/// zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpgrade {
    pub key: ModuleKey,
    pub proposed_address: Address,
    pub scheduled_at: u64,
    /// `scheduled_at + min_delay` at scheduling time.
    pub eligible_at: u64,
    pub scheduled_by: Address,
    pub active: bool,
}

impl PendingUpgrade {
    fn inactive(key: ModuleKey) -> Self {
        Self {
            key,
            proposed_address: Address::ZERO,
            scheduled_at: 0,
            eligible_at: 0,
            scheduled_by: Address::ZERO,
            active: false,
        }
    }

    pub fn is_executable(&self, now: u64) -> bool {
        self.active && now >= self.eligible_at
    }
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<PendingUpgrade> {
    Ok(PendingUpgrade {
        key: row.get(0)?,
        proposed_address: row.get(1)?,
        scheduled_at: row.get(2)?,
        eligible_at: row.get(3)?,
        scheduled_by: row.get(4)?,
        active: true,
    })
}

pub(crate) fn load(conn: &Connection, key: &ModuleKey) -> Result<Option<PendingUpgrade>> {
    Ok(conn
        .query_row(
            "SELECT key, proposed_address, scheduled_at, eligible_at, scheduled_by
             FROM pending_upgrades WHERE key = ?1",
            params![key],
            from_row,
        )
        .optional()?)
}

fn load_all(conn: &Connection) -> Result<Vec<PendingUpgrade>> {
    let mut stmt = conn.prepare(
        "SELECT key, proposed_address, scheduled_at, eligible_at, scheduled_by
         FROM pending_upgrades ORDER BY key ASC",
    )?;
    let rows = stmt.query_map([], from_row)?;

    let mut pending = Vec::new();
    for row in rows {
        pending.push(row?);
    }
    Ok(pending)
}

/// Remove the pending upgrade for `key`; `NoPendingUpgrade` if there is none.
pub(crate) fn take(ctx: &mut TxContext<'_>, key: &ModuleKey) -> Result<PendingUpgrade> {
    let pending = load(ctx.conn, key)?.ok_or(RegistryError::NoPendingUpgrade { key: *key })?;
    ctx.conn
        .execute("DELETE FROM pending_upgrades WHERE key = ?1", params![key])?;
    Ok(pending)
}

/// `take` plus the cancellation event.
pub(crate) fn cancel_one(
    ctx: &mut TxContext<'_>,
    key: &ModuleKey,
    caller: Address,
) -> Result<PendingUpgrade> {
    let pending = take(ctx, key)?;
    ctx.emit(RegistryEvent::UpgradeCancelled {
        key: *key,
        proposed_address: pending.proposed_address,
        cancelled_by: caller,
    });
    Ok(pending)
}

impl ModuleRegistry {
    /// Propose `proposed_address` for `key`, executable after the current
    /// `min_delay`.
    pub fn schedule(
        &self,
        key: ModuleKey,
        proposed_address: Address,
        caller: Address,
    ) -> Result<PendingUpgrade> {
        let proposed_address = proposed_address.require_nonzero()?;
        self.transact(|ctx| {
            let gov = pause::guard_mutation(ctx, Action::Schedule, caller)?;
            if let Some(existing) = load(ctx.conn, &key)? {
                return Err(RegistryError::UpgradeAlreadyPending {
                    key,
                    proposed: existing.proposed_address,
                    eligible_at: existing.eligible_at,
                });
            }

            let pending = PendingUpgrade {
                key,
                proposed_address,
                scheduled_at: ctx.now,
                eligible_at: ctx.now.saturating_add(gov.min_delay),
                scheduled_by: caller,
                active: true,
            };
            ctx.conn.execute(
                "INSERT INTO pending_upgrades (key, proposed_address, scheduled_at, eligible_at, scheduled_by)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    key,
                    pending.proposed_address,
                    pending.scheduled_at,
                    pending.eligible_at,
                    pending.scheduled_by,
                ],
            )?;
            ctx.emit(RegistryEvent::UpgradeScheduled {
                key,
                proposed_address,
                eligible_at: pending.eligible_at,
                scheduled_by: caller,
            });
            Ok(pending)
        })
    }

    /// Drop the pending upgrade for `key` without touching its binding.
    /// Callable while paused.
    pub fn cancel(&self, key: ModuleKey, caller: Address) -> Result<PendingUpgrade> {
        self.transact(|ctx| {
            let gov = ctx.governance()?;
            access::authorize(&gov, Action::Cancel, caller)?;
            cancel_one(ctx, &key, caller)
        })
    }

    /// Cancel every pending upgrade. Callable while paused.
    ///
    /// Succeeds with an empty list when nothing is pending.
    pub fn cancel_all(&self, caller: Address) -> Result<Vec<PendingUpgrade>> {
        self.transact(|ctx| {
            let gov = ctx.governance()?;
            access::authorize(&gov, Action::CancelAll, caller)?;
            let pending = load_all(ctx.conn)?;
            ctx.conn.execute("DELETE FROM pending_upgrades", [])?;
            for upgrade in &pending {
                ctx.emit(RegistryEvent::UpgradeCancelled {
                    key: upgrade.key,
                    proposed_address: upgrade.proposed_address,
                    cancelled_by: caller,
                });
            }
            debug!("Cancelled {} pending upgrades", pending.len());
            Ok(pending)
        })
    }

    /// Apply the pending upgrade for `key` once its delay has elapsed.
    pub fn execute(&self, key: ModuleKey, caller: Address) -> Result<SetOutcome> {
        self.transact(|ctx| {
            pause::guard_mutation(ctx, Action::Execute, caller)?;
            let pending = load(ctx.conn, &key)?.ok_or(RegistryError::NoPendingUpgrade { key })?;
            if !pending.is_executable(ctx.now) {
                return Err(RegistryError::TooEarly {
                    key,
                    eligible_at: pending.eligible_at,
                    now: ctx.now,
                });
            }
            take(ctx, &key)?;
            table::rebind(
                ctx,
                key,
                pending.proposed_address,
                caller,
                ChangeOrigin::Scheduled,
            )
        })
    }

    /// Pending upgrade for `key`; inactive when there is none.
    pub fn pending(&self, key: &ModuleKey) -> Result<PendingUpgrade> {
        self.read(|conn| Ok(load(conn, key)?.unwrap_or_else(|| PendingUpgrade::inactive(*key))))
    }

    /// Pending upgrades ordered by key.
    pub fn list_pending(&self, offset: u64, limit: u64) -> Result<Page<PendingUpgrade>> {
        let max = self.config().max_page_size;
        self.read(|conn| {
            let total_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM pending_upgrades", [], |row| {
                    row.get(0)
                })?;
            let (limit, any) = page_window(offset, limit, max, total_count);

            let mut items = Vec::new();
            if any {
                let mut stmt = conn.prepare(
                    "SELECT key, proposed_address, scheduled_at, eligible_at, scheduled_by
                     FROM pending_upgrades ORDER BY key ASC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit, offset], from_row)?;
                for row in rows {
                    items.push(row?);
                }
            }

            Ok(Page {
                items,
                offset,
                limit,
                total_count,
            })
        })
    }
}
