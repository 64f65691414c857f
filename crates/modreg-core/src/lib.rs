//! Module Registry - the trust anchor that resolves logical dependencies to
//! concrete addresses.
//!
//! The registry keeps key to address bindings, governs how they change
//! through a timelocked and role-gated upgrade workflow with an emergency
//! override, and keeps a bounded audit trail of every change.
//!
//! Consumers only ever call [`ModuleRegistry::resolve`] or
//! [`ModuleRegistry::resolve_or_fail`]. Operators change bindings either
//! immediately (owner only) or through `schedule` / `execute`.
//!
//! # Example
//!
//! ```rust,ignore
//! use module_registry::{Address, ModuleKey, ModuleRegistry};
//!
//! let registry = ModuleRegistry::builder()
//!     .owner(owner)
//!     .min_delay(86_400)
//!     .open_at(Path::new("registry.db"))?;
//!
//! let oracle = ModuleKey::from_name("PriceOracle")?;
//! registry.schedule(oracle, new_oracle, upgrade_admin)?;
//! // ... one day later
//! registry.execute(oracle, upgrade_admin)?;
//! assert_eq!(registry.resolve_or_fail(&oracle)?, new_oracle);
//! ```

pub mod access;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod governance;
pub mod history;
pub mod scheduler;
pub mod table;
pub mod types;

mod batch;
mod pause;
mod registry;

pub use access::{Action, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{default_db_path, RegistryConfig};
pub use error::{ErrorKind, RegistryError, Result};
pub use events::{EventSink, MemorySink, RegistryEvent, TracingSink};
pub use governance::GovernanceState;
pub use history::{ChangeOrigin, HistoryRecord};
pub use registry::{ModuleRegistry, RegistryBuilder};
pub use scheduler::PendingUpgrade;
pub use table::{Binding, SetOutcome};
pub use types::{Address, ModuleKey, Page};
