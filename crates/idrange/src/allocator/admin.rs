#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocator, CancelOrigin, CanceledIdentifier, Error, Namespace, NewRange, Owner, OwnerId,
    OwnerState, OwnerStatus, PublisherId, Range, Result, Store, SubRange,
    allocator::{engine::status_of, issue::claim_units},
    pool::retire,
};

impl<S: Store> Allocator<S> {
    /// Creates a Range with its cursor at `range_begin` and every unit free.
    ///
    /// Ranges under one prefix may not cover the same identifiers. For ISBN
    /// and ISMN this compares digit spans, so category 1 value `1` collides
    /// with category 2 values `10..=19`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] for an invalid definition, a `Closed` initial
    /// state or an overlap with an existing range.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn create_range(&self, new: NewRange) -> Result<Range> {
        if new.state.is_closed() {
            return Err(Error::invalid_range("a new range cannot start closed"));
        }
        // Validate before an id is reserved.
        let draft = Range::new(OwnerId::default(), new)?;
        self.check_overlap(&draft)?;

        let range = self.store.transact(&[], |tx| {
            let range = Range {
                id: tx.next_owner_id(),
                ..draft
            };
            tx.insert_owner(Owner::Range(range.clone()))?;
            Ok(range)
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!(range = %range.id, prefix = %range.prefix, "range created");
        Ok(range)
    }

    /// Grants one publisher identifier of an ISBN or ISMN Range to
    /// `publisher` as a new active SubRange.
    ///
    /// A publisher identifier returned by an earlier subrange deletion is
    /// reused before a new one is minted.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownPublisher`] if the lookup does not know `publisher`.
    /// - [`Error::InvalidOwnerKind`] unless `range` is an ISBN or ISMN Range.
    /// - [`Error::InvalidOwnerState`] unless the range is active.
    /// - [`Error::RangeExhausted`] if no publisher identifier is left.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn grant_subrange(&self, range: OwnerId, publisher: PublisherId) -> Result<SubRange> {
        if !self.lookup.publisher_exists(publisher) {
            return Err(Error::UnknownPublisher { publisher });
        }
        let now = self.clock.current_millis();

        let sub = self.store.transact(&[range], |tx| {
            let parent = match tx.owner(range)? {
                Owner::Range(parent) if parent.namespace.has_subranges() => parent.clone(),
                _ => {
                    return Err(Error::InvalidOwnerKind {
                        owner: range,
                        expected: "subrange grants",
                    });
                }
            };
            if !parent.state.is_active() {
                return Err(Error::InvalidOwnerState {
                    owner: range,
                    state: parent.state,
                });
            }
            if parent.counters.free == 0 {
                return Err(Error::RangeExhausted {
                    owner: range,
                    requested: 1,
                    available: 0,
                });
            }

            let unit = claim_units(tx, range, 1, None, now)?
                .pop()
                .ok_or_else(|| Error::corruption(range, None, "grant produced no unit"))?;
            let sub = SubRange::grant(tx.next_owner_id(), &parent, publisher, unit.item)?;
            tx.insert_owner(Owner::SubRange(sub.clone()))?;
            Ok(sub)
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!(subrange = %sub.id, publisher_identifier = %sub.publisher_identifier, "subrange granted");
        Ok(sub)
    }

    /// Removes a SubRange that never issued anything and returns its
    /// publisher identifier to the parent's pool.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOwnerKind`] unless `subrange` is a SubRange.
    /// - [`Error::OwnerInUse`] once it has issued any identifier.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn delete_subrange(&self, subrange: OwnerId) -> Result<()> {
        let parent = match self.store.owner(subrange)? {
            Owner::SubRange(sub) => sub.parent,
            Owner::Range(_) => {
                return Err(Error::InvalidOwnerKind {
                    owner: subrange,
                    expected: "a subrange",
                });
            }
        };
        let now = self.clock.current_millis();

        self.store.transact(&[subrange, parent], |tx| {
            let sub = tx
                .owner(subrange)?
                .as_subrange()
                .cloned()
                .ok_or_else(|| Error::corruption(subrange, None, "subrange changed kind"))?;
            let untouched = sub.counters.taken == 0
                && sub.interval.next() == sub.interval.begin()
                && tx.pool(subrange)?.is_empty();
            if !untouched {
                return Err(Error::OwnerInUse {
                    owner: subrange,
                    taken: sub.counters.taken,
                });
            }

            tx.remove_owner(subrange)?;
            retire(
                tx,
                CanceledIdentifier {
                    item: sub.publisher_value()?,
                    value: sub.publisher_identifier,
                    owner: sub.parent,
                    category: Some(sub.category),
                    canceled_by: None,
                    canceled_at: now,
                    origin: CancelOrigin::Deleted,
                    reuse: None,
                },
            )
        })
    }

    /// Moves an owner to `state`.
    ///
    /// # Errors
    ///
    /// [`Error::RangeExhausted`] when activating an owner without free
    /// capacity.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn set_state(&self, owner: OwnerId, state: OwnerState) -> Result<OwnerStatus> {
        self.store.transact(&[owner], |tx| {
            let row = tx.owner_mut(owner)?;
            if state.is_active() && row.counters().free == 0 {
                return Err(Error::RangeExhausted {
                    owner,
                    requested: 1,
                    available: 0,
                });
            }
            row.set_state(state);
            Ok(status_of(row))
        })
    }

    /// Rejects `new` if it shares identifiers with an existing range.
    fn check_overlap(&self, new: &Range) -> Result<()> {
        let (begin, end) = digit_span(new);
        let clash = self.store.owners()?.into_iter().find_map(|owner| match owner {
            Owner::Range(range)
                if range.namespace == new.namespace && range.prefix == new.prefix =>
            {
                let (b, e) = digit_span(&range);
                (b < end && begin < e).then_some(range.id)
            }
            _ => None,
        });
        match clash {
            Some(id) => Err(Error::invalid_range(format!(
                "{}..={} under `{}` overlaps range {id}",
                new.interval.format(new.interval.begin()),
                new.interval.format(new.interval.end()),
                new.prefix
            ))),
            None => Ok(()),
        }
    }
}

/// The half-open span of body digits a range covers. Publisher identifiers
/// are scaled to the full body width so different categories compare.
fn digit_span(range: &Range) -> (u64, u64) {
    let interval = &range.interval;
    let scale = match range.namespace {
        Namespace::Issn => 1,
        ns => 10_u64.pow(u32::from(ns.body_width().saturating_sub(interval.width()))),
    };
    (
        u64::from(interval.begin()) * scale,
        (u64::from(interval.end()) + 1) * scale,
    )
}
