//! `modreg` - operator CLI for the module registry.
//!
//! Every command prints a single JSON document on stdout. Failures print
//! `{"error": {...}}` and exit with the code for the error's kind
//! (1 validation, 2 authorization, 3 state, 4 timelock, 5 paused, 6 internal).

mod commands;

use clap::{Args, Parser, Subcommand};
use module_registry::{RegistryConfig, RegistryError};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modreg", version)]
#[command(about = "Inspect and govern a module registry")]
pub struct Cli {
    /// Registry database (defaults to <config dir>/modreg/registry.db)
    #[arg(long, env = "MODREG_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Address the command is issued as
    #[arg(long, env = "MODREG_CALLER", global = true)]
    pub caller: Option<String>,

    /// Pin the clock to this unix time instead of the system clock
    #[arg(long, global = true)]
    pub at: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the registry database, or report on an existing one
    Init {
        /// Initial owner
        #[arg(long)]
        owner: String,
        /// Initial timelock in seconds
        #[arg(long, default_value_t = RegistryConfig::DEFAULT_MIN_DELAY_SECS)]
        min_delay: u64,
        /// Retained history records per key
        #[arg(long, default_value_t = RegistryConfig::DEFAULT_HISTORY_CAPACITY)]
        history_capacity: u32,
    },
    /// Address bound to a module (zero when unbound)
    Resolve {
        key: String,
        /// Fail instead of printing the zero address
        #[arg(long)]
        strict: bool,
    },
    /// Whether a module is bound
    IsRegistered { key: String },
    /// Rebind a module immediately (owner only)
    Set { key: String, address: String },
    /// Rebind several modules at once: KEY=ADDRESS ...
    BatchSet {
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Propose a timelocked upgrade
    Schedule { key: String, address: String },
    /// Apply a pending upgrade whose delay has elapsed
    Execute { key: String },
    /// Drop a pending upgrade
    Cancel { key: String },
    /// Drop several pending upgrades at once
    BatchCancel {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Drop every pending upgrade
    CancelAll,
    /// Pending upgrade for a module
    Pending { key: String },
    /// All pending upgrades
    ListPending(PageArgs),
    /// Halt all binding changes
    Pause,
    /// Resume binding changes (owner only)
    Unpause,
    /// Nominate the next owner (zero address clears the nomination)
    SetAdmin { candidate: String },
    /// Accept a pending ownership nomination
    AcceptAdmin,
    /// Appoint the upgrade admin
    SetUpgradeAdmin { admin: String },
    /// Appoint the emergency admin
    SetEmergencyAdmin { admin: String },
    /// Revoke the upgrade admin (emergency admin only)
    RecoverUpgradeAdmin,
    /// Change the timelock for future schedules
    SetMinDelay { secs: u64 },
    /// Audit trail queries
    #[command(subcommand)]
    History(HistoryCommand),
    /// Bound modules in registration order
    ListKeys(PageArgs),
    /// Governance, configuration and counts
    Status,
}

#[derive(Subcommand, Debug)]
pub enum HistoryCommand {
    /// Retained record at INDEX (0 = oldest retained)
    Get { key: String, index: u64 },
    /// Every retained record
    GetAll { key: String },
    /// Lifetime change count
    Count { key: String },
}

#[derive(Args, Debug)]
pub struct PageArgs {
    #[arg(long, default_value_t = 0)]
    pub offset: u64,
    #[arg(long, default_value_t = 50)]
    pub limit: u64,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match commands::run(&cli) {
        Ok(output) => {
            print_json(&output);
            ExitCode::SUCCESS
        }
        Err(err) => {
            let (code, kind) = match err.downcast_ref::<RegistryError>() {
                Some(e) => (e.exit_code(), e.kind().as_str()),
                None => (6, "internal"),
            };
            error!("{:#}", err);
            print_json(&json!({
                "error": {
                    "kind": kind,
                    "code": code,
                    "message": format!("{:#}", err),
                }
            }));
            ExitCode::from(code as u8)
        }
    }
}
