//! Command execution. Each command maps to one registry call.

use crate::{Cli, Command, HistoryCommand};
use anyhow::{Context, Result};
use module_registry::{
    default_db_path, Address, ManualClock, ModuleKey, ModuleRegistry, RegistryBuilder,
    RegistryError,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

fn db_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.db {
        Some(path) => Ok(path.clone()),
        None => Ok(default_db_path()?),
    }
}

/// Only `init` may create the database file.
fn open(cli: &Cli, builder: RegistryBuilder, create: bool) -> Result<ModuleRegistry> {
    let path = db_path(cli)?;
    if !create && !path.exists() {
        return Err(RegistryError::Config {
            message: format!(
                "No registry at {}; run `modreg init` first",
                path.display()
            ),
        }
        .into());
    }
    let builder = match cli.at {
        Some(at) => builder.clock(ManualClock::new(at)),
        None => builder,
    };
    debug!("Opening registry at {}", path.display());
    let registry = builder
        .open_at(&path)
        .with_context(|| format!("Failed to open registry at {}", path.display()))?;
    Ok(registry)
}

fn caller(cli: &Cli) -> Result<Address> {
    let text = cli.caller.as_deref().ok_or_else(|| {
        RegistryError::invalid("caller", "--caller or MODREG_CALLER is required")
    })?;
    Ok(text.parse()?)
}

fn key(text: &str) -> Result<ModuleKey> {
    Ok(ModuleKey::parse(text)?)
}

fn address(text: &str) -> Result<Address> {
    Ok(text.parse()?)
}

/// Split a `KEY=ADDRESS` batch entry.
fn entry(text: &str) -> Result<(ModuleKey, Address)> {
    let (k, a) = text.split_once('=').ok_or_else(|| {
        RegistryError::invalid("entry", format!("{:?} is not KEY=ADDRESS", text))
    })?;
    Ok((key(k)?, address(a)?))
}

pub fn run(cli: &Cli) -> Result<Value> {
    let (builder, create) = match &cli.command {
        Command::Init {
            owner,
            min_delay,
            history_capacity,
        } => (
            ModuleRegistry::builder()
                .owner(address(owner)?)
                .min_delay(*min_delay)
                .history_capacity(*history_capacity),
            true,
        ),
        _ => (ModuleRegistry::builder(), false),
    };
    let registry = open(cli, builder, create)?;

    let value = match &cli.command {
        Command::Init { .. } => json!({
            "db": db_path(cli)?,
            "governance": registry.governance()?,
            "config": registry.config(),
        }),

        Command::Resolve { key: k, strict } => {
            let module = key(k)?;
            let resolved = if *strict {
                registry.resolve_or_fail(&module)?
            } else {
                registry.resolve(&module)?
            };
            json!({ "key": module, "address": resolved })
        }

        Command::IsRegistered { key: k } => {
            let module = key(k)?;
            json!({ "key": module, "registered": registry.is_registered(&module)? })
        }

        Command::Set { key: k, address: a } => {
            let outcome = registry.set_immediate(key(k)?, address(a)?, caller(cli)?)?;
            serde_json::to_value(outcome)?
        }

        Command::BatchSet { entries } => {
            let (keys, addresses): (Vec<_>, Vec<_>) = entries
                .iter()
                .map(|e| entry(e))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .unzip();
            let outcomes = registry.batch_set(&keys, &addresses, caller(cli)?)?;
            serde_json::to_value(outcomes)?
        }

        Command::Schedule { key: k, address: a } => {
            let pending = registry.schedule(key(k)?, address(a)?, caller(cli)?)?;
            serde_json::to_value(pending)?
        }

        Command::Execute { key: k } => {
            serde_json::to_value(registry.execute(key(k)?, caller(cli)?)?)?
        }

        Command::Cancel { key: k } => {
            serde_json::to_value(registry.cancel(key(k)?, caller(cli)?)?)?
        }

        Command::BatchCancel { keys } => {
            let keys = keys.iter().map(|k| key(k)).collect::<Result<Vec<_>>>()?;
            serde_json::to_value(registry.batch_cancel(&keys, caller(cli)?)?)?
        }

        Command::CancelAll => {
            let cancelled = registry.cancel_all(caller(cli)?)?;
            json!({ "cancelled": cancelled })
        }

        Command::Pending { key: k } => serde_json::to_value(registry.pending(&key(k)?)?)?,

        Command::ListPending(page) => {
            serde_json::to_value(registry.list_pending(page.offset, page.limit)?)?
        }

        Command::Pause => {
            registry.pause(caller(cli)?)?;
            json!({ "paused": true })
        }

        Command::Unpause => {
            registry.unpause(caller(cli)?)?;
            json!({ "paused": false })
        }

        Command::SetAdmin { candidate } => {
            registry.set_pending_admin(address(candidate)?, caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::AcceptAdmin => {
            registry.accept_admin(caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::SetUpgradeAdmin { admin } => {
            registry.set_upgrade_admin(address(admin)?, caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::SetEmergencyAdmin { admin } => {
            registry.set_emergency_admin(address(admin)?, caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::RecoverUpgradeAdmin => {
            registry.recover_upgrade_admin(caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::SetMinDelay { secs } => {
            registry.set_min_delay(*secs, caller(cli)?)?;
            serde_json::to_value(registry.governance()?)?
        }

        Command::History(HistoryCommand::Get { key: k, index }) => {
            serde_json::to_value(registry.history_at(&key(k)?, *index)?)?
        }

        Command::History(HistoryCommand::GetAll { key: k }) => {
            let module = key(k)?;
            json!({
                "key": module,
                "count": registry.history_count(&module)?,
                "records": registry.history_all(&module)?,
            })
        }

        Command::History(HistoryCommand::Count { key: k }) => {
            let module = key(k)?;
            json!({ "key": module, "count": registry.history_count(&module)? })
        }

        Command::ListKeys(page) => {
            serde_json::to_value(registry.list_keys(page.offset, page.limit)?)?
        }

        Command::Status => json!({
            "db": db_path(cli)?,
            "now": registry.now(),
            "governance": registry.governance()?,
            "config": registry.config(),
            "registered": registry.list_keys(0, 0)?.total_count,
            "pending": registry.list_pending(0, 0)?.total_count,
        }),
    };

    Ok(value)
}
