//! Bulk set and cancel.
//!
//! A batch runs in a single transaction: if any element fails, nothing in the
//! batch is applied and no events are emitted.

use crate::access::{self, Action};
use crate::error::{RegistryError, Result};
use crate::history::ChangeOrigin;
use crate::pause;
use crate::registry::ModuleRegistry;
use crate::scheduler::{self, PendingUpgrade};
use crate::table::{self, SetOutcome};
use crate::types::{Address, ModuleKey};

impl ModuleRegistry {
    fn check_batch_len(&self, len: usize) -> Result<()> {
        let max = self.config().max_batch_size;
        if len > max {
            return Err(RegistryError::BatchTooLarge { len, max });
        }
        Ok(())
    }

    /// Owner-only element-wise `set_immediate`, all or nothing.
    pub fn batch_set(
        &self,
        keys: &[ModuleKey],
        addresses: &[Address],
        caller: Address,
    ) -> Result<Vec<SetOutcome>> {
        if keys.len() != addresses.len() {
            return Err(RegistryError::MismatchedLengths {
                keys: keys.len(),
                addresses: addresses.len(),
            });
        }
        self.check_batch_len(keys.len())?;
        for address in addresses {
            address.require_nonzero()?;
        }

        self.transact(|ctx| {
            pause::guard_mutation(ctx, Action::BatchSet, caller)?;
            keys.iter()
                .zip(addresses)
                .map(|(key, address)| table::rebind(ctx, *key, *address, caller, ChangeOrigin::Batch))
                .collect()
        })
    }

    /// Element-wise `cancel`, all or nothing. Callable while paused.
    pub fn batch_cancel(&self, keys: &[ModuleKey], caller: Address) -> Result<Vec<PendingUpgrade>> {
        self.check_batch_len(keys.len())?;
        self.transact(|ctx| {
            let gov = ctx.governance()?;
            access::authorize(&gov, Action::BatchCancel, caller)?;
            keys.iter()
                .map(|key| scheduler::cancel_one(ctx, key, caller))
                .collect()
        })
    }
}
