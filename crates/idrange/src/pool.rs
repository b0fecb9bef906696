use std::collections::VecDeque;

use crate::{
    BatchId, CancelOrigin, CanceledIdentifier, Counters, Error, OwnerId, Result, ReuseRecord,
    Transaction,
};

/// The cancellation/reuse pool of one Range or SubRange.
///
/// Available entries are handed out oldest first. Once claimed an entry is
/// moved to the used list with its [`ReuseRecord`] and never offered again;
/// cancelling the reissued identifier produces a fresh entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReusePool {
    available: VecDeque<CanceledIdentifier>,
    used: Vec<CanceledIdentifier>,
}

impl ReusePool {
    pub const fn new() -> Self {
        Self {
            available: VecDeque::new(),
            used: Vec::new(),
        }
    }

    /// Rebuilds a pool from stored entries, splitting them on their reuse
    /// record. Available entries keep the order given.
    pub fn from_entries(entries: impl IntoIterator<Item = CanceledIdentifier>) -> Self {
        let (available, used): (Vec<_>, Vec<_>) =
            entries.into_iter().partition(CanceledIdentifier::is_available);
        Self {
            available: available.into(),
            used,
        }
    }

    /// Entries that may still be reissued, oldest first.
    pub fn available(&self) -> impl ExactSizeIterator<Item = &CanceledIdentifier> {
        self.available.iter()
    }

    /// Entries that were reissued.
    pub fn used(&self) -> &[CanceledIdentifier] {
        &self.used
    }

    pub fn available_len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty() && self.used.is_empty()
    }

    /// Available entries of one origin.
    pub fn count(&self, origin: CancelOrigin) -> u64 {
        self.available.iter().filter(|e| e.origin == origin).count() as u64
    }

    /// Whether `value` waits in the pool.
    pub fn contains(&self, value: &str) -> bool {
        self.available.iter().any(|e| e.value == value)
    }

    pub(crate) fn push(&mut self, entry: CanceledIdentifier) {
        debug_assert!(entry.is_available());
        self.available.push_back(entry);
    }

    /// Claims the oldest available entry and marks it used in one step.
    pub(crate) fn claim(&mut self, batch: Option<BatchId>, now: u64) -> Option<CanceledIdentifier> {
        let mut entry = self.available.pop_front()?;
        entry.reuse = Some(ReuseRecord {
            batch,
            used_at: now,
        });
        self.used.push(entry.clone());
        Some(entry)
    }

    /// Undoes a [`ReusePool::claim`] made by `batch`. The entry goes to the
    /// back of the queue as a plain cancellation.
    pub(crate) fn release(&mut self, value: &str, batch: BatchId) -> Option<CanceledIdentifier> {
        let pos = self
            .used
            .iter()
            .position(|e| e.value == value && e.reuse.is_some_and(|r| r.batch == Some(batch)))?;
        let mut entry = self.used.remove(pos);
        entry.reuse = None;
        entry.origin = CancelOrigin::Canceled;
        self.available.push_back(entry.clone());
        Some(entry)
    }
}

/// Takes the oldest reusable entry of `owner` for reissue under `batch`.
///
/// The claim and its counter update (`canceled` or `deleted` down by one,
/// `free` down, `taken` up) happen on the transaction's copy of the locked
/// owner row, so no two issuances can claim the same entry. Returns
/// `Ok(None)` when the pool is empty.
///
/// # Errors
///
/// [`Error::Corruption`] if the owner's counters disagree with its pool.
pub fn take_for_reuse(
    tx: &mut dyn Transaction,
    owner: OwnerId,
    batch: Option<BatchId>,
    now: u64,
) -> Result<Option<CanceledIdentifier>> {
    let Some(entry) = tx.pool_mut(owner)?.claim(batch, now) else {
        return Ok(None);
    };
    let counters = tx.owner_mut(owner)?.counters_mut();
    let bucket = match entry.origin {
        CancelOrigin::Canceled => &mut counters.canceled,
        CancelOrigin::Deleted => &mut counters.deleted,
    };
    *bucket = bucket
        .checked_sub(1)
        .ok_or_else(|| drift(owner, batch, "pool entry without a counter"))?;
    counters.free = counters
        .free
        .checked_sub(1)
        .ok_or_else(|| drift(owner, batch, "free underflow on reuse"))?;
    counters.taken += 1;
    Ok(Some(entry))
}

/// Moves a live unit of `owner` into its pool: `taken` down, `canceled` or
/// `deleted` up by the entry's origin, `free` up.
pub(crate) fn retire(tx: &mut dyn Transaction, entry: CanceledIdentifier) -> Result<()> {
    let owner = entry.owner;
    let origin = entry.origin;
    tx.pool_mut(owner)?.push(entry);
    give_back(tx.owner_mut(owner)?.counters_mut(), owner, origin)
}

/// Returns a reissued identifier to the pool after its batch was deleted.
pub(crate) fn restore(tx: &mut dyn Transaction, owner: OwnerId, value: &str, batch: BatchId) -> Result<()> {
    tx.pool_mut(owner)?
        .release(value, batch)
        .ok_or_else(|| drift(owner, Some(batch), format!("no reuse record for `{value}`")))?;
    give_back(tx.owner_mut(owner)?.counters_mut(), owner, CancelOrigin::Canceled)
}

fn give_back(counters: &mut Counters, owner: OwnerId, origin: CancelOrigin) -> Result<()> {
    counters.taken = counters
        .taken
        .checked_sub(1)
        .ok_or_else(|| drift(owner, None, "taken underflow on return"))?;
    match origin {
        CancelOrigin::Canceled => counters.canceled += 1,
        CancelOrigin::Deleted => counters.deleted += 1,
    }
    counters.free += 1;
    Ok(())
}

fn drift(owner: OwnerId, batch: Option<BatchId>, detail: impl Into<String>) -> Error {
    Error::corruption(owner, batch, detail)
}
