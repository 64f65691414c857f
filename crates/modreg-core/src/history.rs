//! Per-key bounded audit log.
//!
//! Each key keeps its most recent `history_capacity` records. A separate
//! per-key counter tracks the lifetime number of changes and keeps growing
//! after old records are overwritten. Record `seq` values are that counter at
//! the time of the write, so the retained window is always
//! `total - retained + 1 ..= total`.

use crate::error::{RegistryError, Result};
use crate::registry::ModuleRegistry;
use crate::types::{Address, ModuleKey};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// Which path produced a binding change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Owner break-glass `set_immediate`.
    Immediate,
    /// One element of `batch_set`.
    Batch,
    /// `execute` of a timelocked upgrade.
    Scheduled,
}

impl ChangeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOrigin::Immediate => "immediate",
            ChangeOrigin::Batch => "batch",
            ChangeOrigin::Scheduled => "scheduled",
        }
    }
}

impl ToSql for ChangeOrigin {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ChangeOrigin {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "immediate" => Ok(ChangeOrigin::Immediate),
            "batch" => Ok(ChangeOrigin::Batch),
            "scheduled" => Ok(ChangeOrigin::Scheduled),
            other => Err(FromSqlError::Other(
                format!("unknown change origin {:?}", other).into(),
            )),
        }
    }
}

/// One binding change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// 1-based lifetime sequence number for this key.
    pub sequence: u64,
    /// Zero for the first binding of a key.
    pub old_address: Address,
    pub new_address: Address,
    pub executor: Address,
    pub timestamp: u64,
    pub origin: ChangeOrigin,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    Ok(HistoryRecord {
        sequence: row.get(0)?,
        old_address: row.get(1)?,
        new_address: row.get(2)?,
        executor: row.get(3)?,
        timestamp: row.get(4)?,
        origin: row.get(5)?,
    })
}

/// Number of records currently retained for a key.
pub(crate) fn retained(total: u64, capacity: u32) -> u64 {
    total.min(u64::from(capacity))
}

/// Lifetime number of changes recorded for `key`.
pub(crate) fn count(conn: &Connection, key: &ModuleKey) -> Result<u64> {
    let total: Option<u64> = conn
        .query_row(
            "SELECT total FROM history_counters WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(total.unwrap_or(0))
}

/// Append a record, evicting the oldest one once the buffer is full.
#[allow(clippy::too_many_arguments)]
pub(crate) fn append(
    conn: &Connection,
    capacity: u32,
    key: &ModuleKey,
    old_address: Address,
    new_address: Address,
    executor: Address,
    timestamp: u64,
    origin: ChangeOrigin,
) -> Result<HistoryRecord> {
    let sequence = count(conn, key)? + 1;

    conn.execute(
        "INSERT INTO history_counters (key, total) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET total = excluded.total",
        params![key, sequence],
    )?;
    conn.execute(
        "INSERT INTO history (key, seq, old_address, new_address, executor, timestamp, origin)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![key, sequence, old_address, new_address, executor, timestamp, origin],
    )?;

    let capacity = u64::from(capacity);
    if sequence > capacity {
        conn.execute(
            "DELETE FROM history WHERE key = ?1 AND seq = ?2",
            params![key, sequence - capacity],
        )?;
    }

    Ok(HistoryRecord {
        sequence,
        old_address,
        new_address,
        executor,
        timestamp,
        origin,
    })
}

/// The `index`-th retained record, oldest first.
pub(crate) fn get(
    conn: &Connection,
    capacity: u32,
    key: &ModuleKey,
    index: u64,
) -> Result<HistoryRecord> {
    let total = count(conn, key)?;
    let len = retained(total, capacity);
    if index >= len {
        return Err(RegistryError::IndexOutOfBounds {
            key: *key,
            index,
            len,
        });
    }
    let seq = total - len + 1 + index;
    Ok(conn.query_row(
        "SELECT seq, old_address, new_address, executor, timestamp, origin
         FROM history WHERE key = ?1 AND seq = ?2",
        params![key, seq],
        from_row,
    )?)
}

/// All retained records, oldest first.
pub(crate) fn get_all(conn: &Connection, key: &ModuleKey) -> Result<Vec<HistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT seq, old_address, new_address, executor, timestamp, origin
         FROM history WHERE key = ?1 ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map(params![key], from_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}

impl ModuleRegistry {
    /// Retained record at `index` (0 = oldest retained).
    pub fn history_at(&self, key: &ModuleKey, index: u64) -> Result<HistoryRecord> {
        let capacity = self.config().history_capacity;
        self.read(|conn| get(conn, capacity, key, index))
    }

    /// Every retained record for `key`, oldest to newest.
    pub fn history_all(&self, key: &ModuleKey) -> Result<Vec<HistoryRecord>> {
        self.read(|conn| get_all(conn, key))
    }

    /// Lifetime change count for `key`. Can exceed the retained length.
    pub fn history_count(&self, key: &ModuleKey) -> Result<u64> {
        self.read(|conn| count(conn, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE history (
                key BLOB NOT NULL, seq INTEGER NOT NULL, old_address BLOB NOT NULL,
                new_address BLOB NOT NULL, executor BLOB NOT NULL, timestamp INTEGER NOT NULL,
                origin TEXT NOT NULL, PRIMARY KEY (key, seq)
            );
            CREATE TABLE history_counters (key BLOB PRIMARY KEY, total INTEGER NOT NULL);",
        )
        .unwrap();
        conn
    }

    fn addr(n: u8) -> Address {
        Address::from_bytes([n; 20])
    }

    fn write(conn: &Connection, capacity: u32, key: &ModuleKey, n: u8) {
        append(
            conn,
            capacity,
            key,
            addr(n.wrapping_sub(1)),
            addr(n),
            addr(200),
            u64::from(n),
            ChangeOrigin::Immediate,
        )
        .unwrap();
    }

    #[test]
    fn test_counter_outgrows_buffer() {
        let conn = conn();
        let key = ModuleKey::from_name("Oracle").unwrap();
        for n in 1..=7 {
            write(&conn, 3, &key, n);
        }

        assert_eq!(count(&conn, &key).unwrap(), 7);
        let all = get_all(&conn, &key).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(
            all.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![5, 6, 7]
        );
        assert_eq!(all.last().unwrap().new_address, addr(7));
    }

    #[test]
    fn test_get_indexes_oldest_retained_first() {
        let conn = conn();
        let key = ModuleKey::from_name("Oracle").unwrap();
        for n in 1..=5 {
            write(&conn, 2, &key, n);
        }
        assert_eq!(get(&conn, 2, &key, 0).unwrap().new_address, addr(4));
        assert_eq!(get(&conn, 2, &key, 1).unwrap().new_address, addr(5));
        assert!(matches!(
            get(&conn, 2, &key, 2),
            Err(RegistryError::IndexOutOfBounds { index: 2, len: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_key_is_empty() {
        let conn = conn();
        let key = ModuleKey::from_name("Nothing").unwrap();
        assert_eq!(count(&conn, &key).unwrap(), 0);
        assert!(get_all(&conn, &key).unwrap().is_empty());
        assert!(matches!(
            get(&conn, 4, &key, 0),
            Err(RegistryError::IndexOutOfBounds { len: 0, .. })
        ));
    }

    #[test]
    fn test_history_at_reads_one_snapshot() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("registry.db");
        let owner = addr(1);
        let key = ModuleKey::from_name("Oracle").unwrap();

        let reader = ModuleRegistry::builder()
            .owner(owner)
            .history_capacity(2)
            .open_at(&db_path)
            .unwrap();
        reader.set_immediate(key, addr(10), owner).unwrap();
        reader.set_immediate(key, addr(11), owner).unwrap();
        let writer = ModuleRegistry::builder().open_at(&db_path).unwrap();

        reader
            .read(|conn| {
                assert_eq!(count(conn, &key)?, 2);
                // Evicts seq 1 on disk; this snapshot still holds it.
                writer.set_immediate(key, addr(12), owner)?;
                assert_eq!(get(conn, 2, &key, 0)?.new_address, addr(10));
                Ok(())
            })
            .unwrap();

        assert_eq!(reader.history_at(&key, 0).unwrap().new_address, addr(11));
        assert_eq!(reader.history_count(&key).unwrap(), 3);
    }

    #[test]
    fn test_keys_are_isolated() {
        let conn = conn();
        let a = ModuleKey::from_name("A").unwrap();
        let b = ModuleKey::from_name("B").unwrap();
        write(&conn, 4, &a, 1);
        write(&conn, 4, &a, 2);
        write(&conn, 4, &b, 9);
        assert_eq!(count(&conn, &a).unwrap(), 2);
        assert_eq!(count(&conn, &b).unwrap(), 1);
        assert_eq!(get_all(&conn, &b).unwrap()[0].new_address, addr(9));
    }
}
