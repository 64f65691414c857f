//! SQLite-backed registry handle.
//!
//! [`ModuleRegistry`] owns the only connection to the registry database.
//! Every public mutating operation runs inside one `BEGIN IMMEDIATE`
//! transaction on the mutex-guarded connection: either all of its writes
//! commit or none do, and events are delivered only after the commit.

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::{EventSink, RegistryEvent, TracingSink};
use crate::governance::{self, GovernanceState};
use crate::types::Address;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Handle to a module registry.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct ModuleRegistry {
    conn: Arc<Mutex<Connection>>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

/// Per-operation view handed to component code while a transaction is open.
pub(crate) struct TxContext<'a> {
    pub conn: &'a Connection,
    pub now: u64,
    pub config: &'a RegistryConfig,
    events: Vec<RegistryEvent>,
}

impl TxContext<'_> {
    /// Queue an event for delivery after commit.
    pub fn emit(&mut self, event: RegistryEvent) {
        self.events.push(event);
    }

    pub fn governance(&self) -> Result<GovernanceState> {
        governance::load(self.conn)
    }
}

/// Builder for opening or creating a [`ModuleRegistry`].
///
/// # Example
///
/// ```rust,ignore
/// let registry = ModuleRegistry::builder()
///     .owner(owner)
///     .min_delay(3600)
///     .open_at(Path::new("registry.db"))?;
/// ```
pub struct RegistryBuilder {
    owner: Option<Address>,
    min_delay: u64,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            owner: None,
            min_delay: RegistryConfig::DEFAULT_MIN_DELAY_SECS,
            config: RegistryConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
        }
    }

    /// Initial owner. Required only when the database is created.
    pub fn owner(mut self, owner: Address) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Initial timelock. Only used when the database is created.
    pub fn min_delay(mut self, secs: u64) -> Self {
        self.min_delay = secs;
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn history_capacity(mut self, capacity: u32) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    pub fn max_min_delay(mut self, secs: u64) -> Self {
        self.config.max_min_delay = secs;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Open the registry at `db_path`, creating it if needed.
    pub fn open_at(self, db_path: &Path) -> Result<ModuleRegistry> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| RegistryError::Io {
                    message: format!(
                        "Failed to create registry directory: {}",
                        parent.display()
                    ),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(&format!(
            "PRAGMA journal_mode=WAL;\n\
             PRAGMA busy_timeout={};\n\
             PRAGMA synchronous=NORMAL;",
            RegistryConfig::BUSY_TIMEOUT_MS,
        ))?;
        debug!("Opened registry database at {}", db_path.display());
        self.finish(conn)
    }

    /// Open a private in-memory registry.
    pub fn open_in_memory(self) -> Result<ModuleRegistry> {
        self.finish(Connection::open_in_memory()?)
    }

    fn finish(self, mut conn: Connection) -> Result<ModuleRegistry> {
        self.config.validate()?;
        ensure_schema(&conn)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let config = init_config(&tx, self.config)?;
        match governance::load_optional(&tx)? {
            Some(existing) => {
                if let Some(owner) = self.owner.filter(|o| *o != existing.owner) {
                    debug!(
                        "Ignoring requested owner {} for existing registry owned by {}",
                        owner, existing.owner
                    );
                }
            }
            None => {
                let owner = self.owner.ok_or_else(|| RegistryError::Config {
                    message: "Registry is not initialized; an owner is required".to_string(),
                })?;
                let owner = owner.require_nonzero()?;
                if self.min_delay > config.max_min_delay {
                    return Err(RegistryError::DelayTooLong {
                        requested: self.min_delay,
                        max: config.max_min_delay,
                    });
                }
                governance::initialize(&tx, owner, self.min_delay)?;
                debug!(
                    "Initialized registry: owner {} min_delay {}s capacity {}",
                    owner, self.min_delay, config.history_capacity
                );
            }
        }
        tx.commit()?;

        Ok(ModuleRegistry {
            conn: Arc::new(Mutex::new(conn)),
            config,
            clock: self.clock,
            sink: self.sink,
        })
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bindings (
            id INTEGER PRIMARY KEY,
            key BLOB NOT NULL UNIQUE,
            address BLOB NOT NULL CHECK (address != zeroblob(20)),
            bound_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS history (
            key BLOB NOT NULL,
            seq INTEGER NOT NULL,
            old_address BLOB NOT NULL,
            new_address BLOB NOT NULL,
            executor BLOB NOT NULL,
            timestamp INTEGER NOT NULL,
            origin TEXT NOT NULL,
            PRIMARY KEY (key, seq)
        );

        CREATE TABLE IF NOT EXISTS history_counters (
            key BLOB PRIMARY KEY,
            total INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pending_upgrades (
            key BLOB PRIMARY KEY,
            proposed_address BLOB NOT NULL,
            scheduled_at INTEGER NOT NULL,
            eligible_at INTEGER NOT NULL,
            scheduled_by BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS governance (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            owner BLOB NOT NULL,
            pending_admin BLOB NOT NULL,
            upgrade_admin BLOB NOT NULL,
            emergency_admin BLOB NOT NULL,
            paused INTEGER NOT NULL DEFAULT 0,
            min_delay INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS registry_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Persist construction-time settings on first open and read them back.
fn init_config(conn: &Connection, requested: RegistryConfig) -> Result<RegistryConfig> {
    let defaults = [
        ("history_capacity", requested.history_capacity.to_string()),
        ("max_min_delay", requested.max_min_delay.to_string()),
    ];
    for (key, value) in defaults {
        conn.execute(
            "INSERT OR IGNORE INTO registry_config (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    let read = |key: &str| -> Result<String> {
        Ok(conn.query_row(
            "SELECT value FROM registry_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?)
    };
    let corrupt = |key: &str, value: &str| RegistryError::Config {
        message: format!("Stored {} is not a number: {:?}", key, value),
    };

    let capacity = read("history_capacity")?;
    let max_delay = read("max_min_delay")?;
    let config = RegistryConfig {
        history_capacity: capacity
            .parse()
            .map_err(|_| corrupt("history_capacity", &capacity))?,
        max_min_delay: max_delay
            .parse()
            .map_err(|_| corrupt("max_min_delay", &max_delay))?,
        ..requested
    };
    config.validate()?;
    Ok(config)
}

impl ModuleRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Effective configuration, including the persisted construction-time values.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Current time according to the registry clock.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RegistryError::Database {
            message: "Failed to acquire registry connection lock".to_string(),
            source: None,
        })
    }

    /// Run a read-only query against the current committed state.
    ///
    /// Every statement in `f` sees the same snapshot, even if another process
    /// commits in between.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `f` as one all-or-nothing operation.
    pub(crate) fn transact<T>(
        &self,
        f: impl FnOnce(&mut TxContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (value, events) = {
            let mut ctx = TxContext {
                conn: &tx,
                now: self.clock.now(),
                config: &self.config,
                events: Vec::new(),
            };
            let value = f(&mut ctx)?;
            (value, ctx.events)
        };
        tx.commit()?;
        drop(conn);

        for event in &events {
            self.sink.emit(event);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModuleKey;
    use tempfile::TempDir;

    const OWNER: Address = Address::from_bytes([1; 20]);

    #[test]
    fn test_new_registry_requires_owner() {
        let result = ModuleRegistry::builder().open_in_memory();
        assert!(matches!(result, Err(RegistryError::Config { .. })));
    }

    #[test]
    fn test_zero_owner_rejected() {
        let result = ModuleRegistry::builder()
            .owner(Address::ZERO)
            .open_in_memory();
        assert!(matches!(result, Err(RegistryError::ZeroAddress)));
    }

    #[test]
    fn test_initial_delay_above_ceiling_rejected() {
        let result = ModuleRegistry::builder()
            .owner(OWNER)
            .max_min_delay(100)
            .min_delay(101)
            .open_in_memory();
        assert!(matches!(
            result,
            Err(RegistryError::DelayTooLong {
                requested: 101,
                max: 100
            })
        ));
    }

    #[test]
    fn test_reopen_keeps_state_and_construction_settings() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("registry.db");
        let key = ModuleKey::from_name("PriceOracle").unwrap();
        let addr = Address::from_bytes([9; 20]);

        {
            let registry = ModuleRegistry::builder()
                .owner(OWNER)
                .history_capacity(3)
                .open_at(&db_path)
                .unwrap();
            registry.set_immediate(key, addr, OWNER).unwrap();
        }

        let reopened = ModuleRegistry::builder()
            .history_capacity(99)
            .open_at(&db_path)
            .unwrap();
        assert_eq!(reopened.config().history_capacity, 3);
        assert_eq!(reopened.resolve(&key).unwrap(), addr);
        assert_eq!(reopened.governance().unwrap().owner, OWNER);
    }

    #[test]
    fn test_two_handles_same_db_see_each_other() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("shared.db");
        let key = ModuleKey::from_name("LendingEngine").unwrap();
        let addr = Address::from_bytes([5; 20]);

        let first = ModuleRegistry::builder()
            .owner(OWNER)
            .open_at(&db_path)
            .unwrap();
        let second = ModuleRegistry::builder().open_at(&db_path).unwrap();

        first.set_immediate(key, addr, OWNER).unwrap();
        assert_eq!(second.resolve(&key).unwrap(), addr);
    }
}
