//! Key to address bindings.
//!
//! A key is unbound until its first successful set and, once bound, can be
//! rebound but never unbound. The zero address is never stored.

use crate::access::Action;
use crate::error::{RegistryError, Result};
use crate::events::RegistryEvent;
use crate::history::{self, ChangeOrigin, HistoryRecord};
use crate::pause;
use crate::registry::{ModuleRegistry, TxContext};
use crate::types::{Address, ModuleKey, Page};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A bound key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub key: ModuleKey,
    pub address: Address,
    /// Time of the first binding.
    pub bound_at: u64,
    /// Time of the latest rebinding.
    pub updated_at: u64,
}

/// Result of a set or executed upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SetOutcome {
    /// The binding changed and a history record was written.
    Updated { record: HistoryRecord },
    /// The key was already bound to the requested address.
    Unchanged { address: Address },
}

impl SetOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SetOutcome::Updated { .. })
    }
}

fn binding_from_row(row: &Row<'_>) -> rusqlite::Result<Binding> {
    Ok(Binding {
        key: row.get(0)?,
        address: row.get(1)?,
        bound_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

pub(crate) fn lookup(conn: &Connection, key: &ModuleKey) -> Result<Option<Binding>> {
    Ok(conn
        .query_row(
            "SELECT key, address, bound_at, updated_at FROM bindings WHERE key = ?1",
            params![key],
            binding_from_row,
        )
        .optional()?)
}

/// Point `key` at `new_address`, recording the change.
///
/// Setting the current value is a no-op: a `NoOp` event is emitted and no
/// history is written.
pub(crate) fn rebind(
    ctx: &mut TxContext<'_>,
    key: ModuleKey,
    new_address: Address,
    executor: Address,
    origin: ChangeOrigin,
) -> Result<SetOutcome> {
    let new_address = new_address.require_nonzero()?;
    let current = lookup(ctx.conn, &key)?.map(|b| b.address);

    if current == Some(new_address) {
        debug!("{} already bound to {}; nothing to do", key, new_address);
        ctx.emit(RegistryEvent::NoOp {
            key,
            address: new_address,
            caller: executor,
        });
        return Ok(SetOutcome::Unchanged {
            address: new_address,
        });
    }

    ctx.conn.execute(
        "INSERT INTO bindings (key, address, bound_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(key) DO UPDATE SET address = excluded.address, updated_at = excluded.updated_at",
        params![key, new_address, ctx.now],
    )?;

    let old_address = current.unwrap_or(Address::ZERO);
    let record = history::append(
        ctx.conn,
        ctx.config.history_capacity,
        &key,
        old_address,
        new_address,
        executor,
        ctx.now,
        origin,
    )?;
    ctx.emit(RegistryEvent::Upgraded {
        key,
        old_address,
        new_address,
        executor,
    });
    Ok(SetOutcome::Updated { record })
}

/// Clamp a `(offset, limit)` request and report whether any row can match.
pub(crate) fn page_window(offset: u64, limit: u64, max: u64, total: u64) -> (u64, bool) {
    let limit = limit.min(max);
    (limit, limit > 0 && offset < total)
}

impl ModuleRegistry {
    /// Bound address for `key`, or zero when unbound.
    pub fn resolve(&self, key: &ModuleKey) -> Result<Address> {
        self.read(|conn| Ok(lookup(conn, key)?.map(|b| b.address).unwrap_or(Address::ZERO)))
    }

    /// Bound address for `key`; `NotRegistered` when unbound.
    pub fn resolve_or_fail(&self, key: &ModuleKey) -> Result<Address> {
        let address = self.resolve(key)?;
        if address.is_zero() {
            return Err(RegistryError::NotRegistered { key: *key });
        }
        Ok(address)
    }

    pub fn is_registered(&self, key: &ModuleKey) -> Result<bool> {
        Ok(!self.resolve(key)?.is_zero())
    }

    /// Full binding row for `key`, if bound.
    pub fn binding(&self, key: &ModuleKey) -> Result<Option<Binding>> {
        self.read(|conn| lookup(conn, key))
    }

    /// Owner-only break-glass rebind that bypasses the timelock.
    pub fn set_immediate(
        &self,
        key: ModuleKey,
        new_address: Address,
        caller: Address,
    ) -> Result<SetOutcome> {
        let new_address = new_address.require_nonzero()?;
        self.transact(|ctx| {
            pause::guard_mutation(ctx, Action::SetImmediate, caller)?;
            rebind(ctx, key, new_address, caller, ChangeOrigin::Immediate)
        })
    }

    /// Bindings in first-registration order.
    pub fn list_keys(&self, offset: u64, limit: u64) -> Result<Page<Binding>> {
        let max = self.config().max_page_size;
        self.read(|conn| {
            let total_count: u64 =
                conn.query_row("SELECT COUNT(*) FROM bindings", [], |row| row.get(0))?;
            let (limit, any) = page_window(offset, limit, max, total_count);

            let mut items = Vec::new();
            if any {
                let mut stmt = conn.prepare(
                    "SELECT key, address, bound_at, updated_at FROM bindings
                     ORDER BY id ASC LIMIT ?1 OFFSET ?2",
                )?;
                let rows = stmt.query_map(params![limit, offset], binding_from_row)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::MemorySink;
    use std::sync::Arc;

    const OWNER: Address = Address::from_bytes([1; 20]);
    const STRANGER: Address = Address::from_bytes([2; 20]);

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn key(name: &str) -> ModuleKey {
        ModuleKey::from_name(name).unwrap()
    }

    fn registry() -> (ModuleRegistry, ManualClock, Arc<MemorySink>) {
        let clock = ManualClock::new(1_000);
        let sink = Arc::new(MemorySink::new());
        let registry = ModuleRegistry::builder()
            .owner(OWNER)
            .clock(clock.clone())
            .event_sink(sink.clone())
            .open_in_memory()
            .unwrap();
        (registry, clock, sink)
    }

    #[test]
    fn test_resolve_unbound_is_zero() {
        let (registry, _, _) = registry();
        let k = key("PriceOracle");
        assert!(registry.resolve(&k).unwrap().is_zero());
        assert!(!registry.is_registered(&k).unwrap());
        assert!(matches!(
            registry.resolve_or_fail(&k),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_first_set_records_zero_old_address() {
        let (registry, _, sink) = registry();
        let k = key("PriceOracle");
        let outcome = registry.set_immediate(k, addr(7), OWNER).unwrap();

        match outcome {
            SetOutcome::Updated { record } => {
                assert!(record.old_address.is_zero());
                assert_eq!(record.new_address, addr(7));
                assert_eq!(record.executor, OWNER);
                assert_eq!(record.timestamp, 1_000);
                assert_eq!(record.sequence, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(registry.resolve_or_fail(&k).unwrap(), addr(7));
        assert_eq!(
            sink.events(),
            vec![RegistryEvent::Upgraded {
                key: k,
                old_address: Address::ZERO,
                new_address: addr(7),
                executor: OWNER,
            }]
        );
    }

    #[test]
    fn test_redundant_set_is_noop() {
        let (registry, _, sink) = registry();
        let k = key("PriceOracle");
        registry.set_immediate(k, addr(7), OWNER).unwrap();
        let second = registry.set_immediate(k, addr(7), OWNER).unwrap();

        assert!(!second.is_updated());
        assert_eq!(registry.history_count(&k).unwrap(), 1);
        assert!(matches!(
            sink.events().last(),
            Some(RegistryEvent::NoOp { .. })
        ));
    }

    #[test]
    fn test_rebind_updates_timestamps() {
        let (registry, clock, _) = registry();
        let k = key("PriceOracle");
        registry.set_immediate(k, addr(7), OWNER).unwrap();
        clock.advance(60);
        registry.set_immediate(k, addr(8), OWNER).unwrap();

        let binding = registry.binding(&k).unwrap().unwrap();
        assert_eq!(binding.address, addr(8));
        assert_eq!(binding.bound_at, 1_000);
        assert_eq!(binding.updated_at, 1_060);
        let last = registry.history_at(&k, 1).unwrap();
        assert_eq!(last.old_address, addr(7));
    }

    #[test]
    fn test_set_immediate_rejections() {
        let (registry, _, sink) = registry();
        let k = key("PriceOracle");
        assert!(matches!(
            registry.set_immediate(k, Address::ZERO, OWNER),
            Err(RegistryError::ZeroAddress)
        ));
        assert!(matches!(
            registry.set_immediate(k, addr(7), STRANGER),
            Err(RegistryError::Unauthorized { .. })
        ));
        registry.pause(OWNER).unwrap();
        sink.take();
        assert!(matches!(
            registry.set_immediate(k, addr(7), OWNER),
            Err(RegistryError::Paused)
        ));
        assert!(sink.events().is_empty());
        assert!(!registry.is_registered(&k).unwrap());
    }

    #[test]
    fn test_list_keys_pagination() {
        let (registry, _, _) = registry();
        for (i, name) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            registry
                .set_immediate(key(name), addr(i as u8 + 1), OWNER)
                .unwrap();
        }
        // Rebinding keeps registration order.
        registry.set_immediate(key("A"), addr(42), OWNER).unwrap();

        let page = registry.list_keys(0, 2).unwrap();
        assert_eq!(page.total_count, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].key, key("A"));
        assert_eq!(page.items[0].address, addr(42));

        let tail = registry.list_keys(4, 10).unwrap();
        assert_eq!(tail.items.len(), 1);
        assert_eq!(tail.items[0].key, key("E"));

        let beyond = registry.list_keys(50, 10).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 5);
    }

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(page_window(0, 1_000, 200, 5), (200, true));
        assert_eq!(page_window(0, 0, 200, 5), (0, false));
        assert_eq!(page_window(5, 10, 200, 5), (10, false));
    }
}
