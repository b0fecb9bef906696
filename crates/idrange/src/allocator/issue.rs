#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocator, BatchId, BatchResult, Error, IdentifierBatch, IssuedIdentifier, OwnerId,
    PublicationId, PublicationType, Result, Store, Transaction, take_for_reuse,
};

/// Input to [`Allocator::issue_batch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueRequest {
    /// A SubRange, or an ISSN Range.
    pub owner: OwnerId,
    pub count: u32,
    pub publication: PublicationId,
    pub publication_type: Option<PublicationType>,
    pub issued_by: String,
    /// Replaying a request with the same key returns the original batch.
    pub idempotency_key: Option<String>,
}

impl IssueRequest {
    pub fn new(
        owner: OwnerId,
        count: u32,
        publication: PublicationId,
        issued_by: impl Into<String>,
    ) -> Self {
        Self {
            owner,
            count,
            publication,
            publication_type: None,
            issued_by: issued_by.into(),
            idempotency_key: None,
        }
    }

    #[must_use]
    pub const fn with_publication_type(mut self, publication_type: PublicationType) -> Self {
        self.publication_type = Some(publication_type);
        self
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// One unit handed out by [`claim_units`].
pub(crate) struct Unit {
    pub(crate) value: String,
    pub(crate) item: u32,
    pub(crate) reused: bool,
}

/// Hands out `count` units of `owner`: pool entries first, oldest first,
/// then fresh values under the cursor. The caller has already checked that
/// `free >= count`.
pub(crate) fn claim_units(
    tx: &mut dyn Transaction,
    owner: OwnerId,
    count: u32,
    batch: Option<BatchId>,
    now: u64,
) -> Result<Vec<Unit>> {
    let count = count as usize;
    let mut units = Vec::with_capacity(count);
    while units.len() < count {
        let Some(entry) = take_for_reuse(tx, owner, batch, now)? else {
            break;
        };
        units.push(Unit {
            value: entry.value,
            item: entry.item,
            reused: true,
        });
    }

    while units.len() < count {
        let row = tx.owner_mut(owner)?;
        let item = row
            .interval_mut()
            .advance()
            .ok_or_else(|| Error::corruption(owner, batch, "cursor exhausted while free > 0"))?;
        let counters = row.counters_mut();
        counters.free = counters
            .free
            .checked_sub(1)
            .ok_or_else(|| Error::corruption(owner, batch, "free underflow on mint"))?;
        counters.taken += 1;
        units.push(Unit {
            value: row.format_unit(item)?,
            item,
            reused: false,
        });
    }
    Ok(units)
}

impl<S: Store> Allocator<S> {
    /// Issues `request.count` identifiers for one publication, atomically.
    ///
    /// Reusable pool entries are handed out before new values are minted, so
    /// the result lists reused identifiers first. Reaching the end of the
    /// interval does not close the owner.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCount`] for 0 or more than the configured maximum.
    /// - [`Error::UnknownPublication`] if the lookup does not know the
    ///   publication.
    /// - [`Error::InvalidOwnerKind`] for an ISBN or ISMN Range, which only
    ///   grants subranges.
    /// - [`Error::InvalidOwnerState`] unless the owner is active.
    /// - [`Error::RangeExhausted`] if pool plus unminted capacity is smaller
    ///   than `count`; nothing is issued.
    /// - [`Error::IdempotencyConflict`] if the key belongs to another owner.
    /// - [`Error::AlreadyDeleted`] if the key belongs to a deleted batch.
    /// - [`Error::Contention`] and [`Error::Corruption`] from the store.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, request), fields(owner = %request.owner, count = request.count))
    )]
    pub fn issue_batch(&self, request: IssueRequest) -> Result<BatchResult> {
        let max = self.config.max_batch_size;
        if request.count == 0 || request.count > max {
            return Err(Error::InvalidCount {
                count: request.count,
                max,
            });
        }
        if !self.lookup.publication_exists(request.publication) {
            return Err(Error::UnknownPublication {
                publication: request.publication,
            });
        }
        let now = self.clock.current_millis();

        let result = self.store.transact(&[request.owner], |tx| {
            if let Some(replayed) = replay(tx, &request)? {
                return Ok(replayed);
            }

            let owner = tx.owner(request.owner)?;
            if !owner.issues_identifiers() {
                return Err(Error::InvalidOwnerKind {
                    owner: request.owner,
                    expected: "identifiers",
                });
            }
            if !owner.state().is_active() {
                return Err(Error::InvalidOwnerState {
                    owner: request.owner,
                    state: owner.state(),
                });
            }
            let available = owner.counters().free;
            if u64::from(request.count) > available {
                return Err(Error::RangeExhausted {
                    owner: request.owner,
                    requested: request.count,
                    available,
                });
            }
            let namespace = owner.namespace();

            let id = tx.next_batch_id();
            let units = claim_units(tx, request.owner, request.count, Some(id), now)?;
            let mut reused = 0;
            let mut identifiers = Vec::with_capacity(units.len());
            for unit in units {
                reused += u32::from(unit.reused);
                tx.insert_identifier(IssuedIdentifier {
                    value: unit.value.clone(),
                    owner: request.owner,
                    item: unit.item,
                    publication: request.publication,
                    publication_type: request.publication_type,
                    batch: id,
                    reused: unit.reused,
                })?;
                identifiers.push(unit.value);
            }

            let batch = IdentifierBatch {
                id,
                namespace,
                owner: request.owner,
                publication: request.publication,
                publication_type: request.publication_type,
                issued_by: request.issued_by.clone(),
                identifiers,
                identifier_count: request.count,
                canceled_used_count: reused,
                canceled_count: 0,
                deleted_count: 0,
                idempotency_key: request.idempotency_key.clone(),
                created_at: now,
                deleted: false,
            };
            let result = BatchResult::from(&batch);
            tx.put_batch(batch);
            Ok(result)
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            batch = %result.id,
            reused = result.reused_count,
            minted = result.minted_count,
            "batch issued"
        );
        Ok(result)
    }
}

/// Looks up a batch already bound to the request's idempotency key.
fn replay(tx: &dyn Transaction, request: &IssueRequest) -> Result<Option<BatchResult>> {
    let Some(key) = &request.idempotency_key else {
        return Ok(None);
    };
    let Some(id) = tx.batch_for_key(key) else {
        return Ok(None);
    };
    let batch = tx
        .batch(id)
        .ok_or_else(|| Error::corruption(request.owner, Some(id), "idempotency key of a missing batch"))?;
    if batch.owner != request.owner {
        return Err(Error::IdempotencyConflict {
            key: key.clone(),
            batch: id,
        });
    }
    // Its values may already be live in a later batch.
    if batch.deleted {
        return Err(Error::AlreadyDeleted { batch: id });
    }
    Ok(Some(BatchResult::from(&batch)))
}
