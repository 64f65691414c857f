//! Module registry RPC server - JSON-RPC admin surface for operators.
//!
//! Wraps a single on-disk registry. Callers identify themselves with a
//! `caller` parameter on every mutating method; the service is meant to be
//! bound to a local interface.

mod handlers;
mod server;

use anyhow::Result;
use clap::Parser;
use module_registry::{default_db_path, Address, ModuleRegistry};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modreg-rpc")]
#[command(about = "JSON-RPC server for a module registry")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Registry database (defaults to <config dir>/modreg/registry.db)
    #[arg(long, env = "MODREG_DB")]
    db: Option<PathBuf>,

    /// Owner to install if the database does not exist yet
    #[arg(long)]
    owner: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!("Starting module registry RPC server");

    let db = match args.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!("Registry database: {}", db.display());

    let mut builder = ModuleRegistry::builder();
    if let Some(owner) = &args.owner {
        builder = builder.owner(owner.parse::<Address>()?);
    }
    let registry = builder.open_at(&db)?;

    let addr = server::start_server(registry, &args.host, args.port).await?;

    // Supervisors read the bound port from stdout.
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
