use core::cmp::Reverse;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocator, BatchId, CancelOrigin, CanceledIdentifier, Error, Result, Store,
    pool::{restore, retire},
};

impl<S: Store> Allocator<S> {
    /// Undoes a batch.
    ///
    /// Every identifier of the batch that is still live is removed:
    ///
    /// - reissued pool entries go back to the pool as plain cancellations;
    /// - minted values that form the tail just below the cursor rewind it;
    /// - any other minted value enters the pool with origin
    ///   [`CancelOrigin::Deleted`].
    ///
    /// Identifiers cancelled earlier stay where they are. The batch record is
    /// kept, marked deleted, with `deleted_count` set.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownBatch`] and [`Error::AlreadyDeleted`].
    /// - [`Error::AlreadyUsedElsewhere`] if the reference guard objects to any
    ///   live identifier of the batch; nothing is removed.
    /// - [`Error::Contention`] and [`Error::Corruption`] from the store.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn delete_batch(&self, id: BatchId) -> Result<()> {
        let batch = self.batch(id)?;
        if batch.deleted {
            return Err(Error::AlreadyDeleted { batch: id });
        }
        let referenced = batch
            .identifiers
            .iter()
            .filter_map(|value| self.store.identifier(value))
            .find(|row| row.batch == id && self.guard.is_referenced(row));
        if let Some(row) = referenced {
            return Err(Error::AlreadyUsedElsewhere {
                identifier: row.value,
            });
        }
        let now = self.clock.current_millis();

        let removed = self.store.transact(&[batch.owner], |tx| {
            let mut batch = tx.batch(id).ok_or(Error::UnknownBatch { batch: id })?;
            if batch.deleted {
                return Err(Error::AlreadyDeleted { batch: id });
            }
            let owner = batch.owner;
            let category = tx.owner(owner)?.category();
            let rows = tx.batch_identifiers(&batch);

            let mut minted = Vec::with_capacity(rows.len());
            for row in &rows {
                tx.remove_identifier(&row.value)?;
                if row.reused {
                    restore(tx, owner, &row.value, id)?;
                } else {
                    minted.push(row);
                }
            }

            minted.sort_unstable_by_key(|row| Reverse(row.item));
            let mut stranded = Vec::new();
            for row in minted {
                let current = tx.owner_mut(owner)?;
                if row.item + 1 == current.interval().next() {
                    current.interval_mut().rewind_to(row.item);
                    let counters = current.counters_mut();
                    counters.taken = counters.taken.checked_sub(1).ok_or_else(|| {
                        Error::corruption(owner, Some(id), "taken underflow on rewind")
                    })?;
                    counters.free += 1;
                } else {
                    stranded.push(row);
                }
            }
            // Ascending, so reuse hands them out in item order.
            for row in stranded.into_iter().rev() {
                retire(
                    tx,
                    CanceledIdentifier {
                        value: row.value.clone(),
                        item: row.item,
                        owner,
                        category,
                        canceled_by: None,
                        canceled_at: now,
                        origin: CancelOrigin::Deleted,
                        reuse: None,
                    },
                )?;
            }

            batch.deleted = true;
            batch.deleted_count = u32::try_from(rows.len()).unwrap_or(u32::MAX);
            tx.put_batch(batch);
            Ok(rows.len())
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(batch = %id, removed, "batch deleted");
        #[cfg(not(feature = "tracing"))]
        let _ = removed;
        Ok(())
    }
}
