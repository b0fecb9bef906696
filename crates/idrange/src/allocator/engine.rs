use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    AcceptAll, AllocatorConfig, BatchId, Error, IdentifierBatch, Namespace, Owner, OwnerId,
    OwnerStatus, PublicationLookup, PublisherId, Range, ReferenceGuard, Result, ReusePool, Store,
    SubRange, SystemClock, TimeSource, Unreferenced, model::parse_digits,
};

/// The single writer of counters and cursors.
///
/// Every mutating call runs in one [`Store::transact`] and either commits all
/// of its effects or none. The allocator itself holds no mutable state, so
/// one instance can be shared across threads; owners are serialized by the
/// store's row locks and different owners proceed in parallel.
///
/// ## Collaborators
///
/// - [`ReferenceGuard`]: vetoes cancellation and batch deletion of
///   identifiers still referenced downstream. Defaults to [`Unreferenced`].
/// - [`PublicationLookup`]: publisher and publication existence. Defaults to
///   [`AcceptAll`].
/// - [`TimeSource`]: timestamps for batches and pool entries. Defaults to
///   [`SystemClock`].
///
/// # Example
///
/// ```
/// use idrange::{
///     Allocator, AllocatorConfig, IssueRequest, MemoryStore, Namespace, NewRange, OwnerState,
///     PublicationId,
/// };
///
/// let allocator = Allocator::new(MemoryStore::default(), AllocatorConfig::default());
/// let range = allocator
///     .create_range(NewRange {
///         namespace: Namespace::Issn,
///         prefix: "1234".into(),
///         category: None,
///         range_begin: "000".into(),
///         range_end: "999".into(),
///         state: OwnerState::Active,
///     })
///     .unwrap();
///
/// let batch = allocator
///     .issue_batch(IssueRequest::new(range.id, 1, PublicationId::new(1), "editor"))
///     .unwrap();
/// assert_eq!(batch.identifiers, ["1234-0006"]);
/// ```
pub struct Allocator<S> {
    pub(crate) store: S,
    pub(crate) config: AllocatorConfig,
    pub(crate) guard: Arc<dyn ReferenceGuard>,
    pub(crate) lookup: Arc<dyn PublicationLookup>,
    pub(crate) clock: Arc<dyn TimeSource>,
}

impl<S: Store> Allocator<S> {
    pub fn new(store: S, config: AllocatorConfig) -> Self {
        Self {
            store,
            config,
            guard: Arc::new(Unreferenced),
            lookup: Arc::new(AcceptAll),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_reference_guard(mut self, guard: impl ReferenceGuard + 'static) -> Self {
        self.guard = Arc::new(guard);
        self
    }

    #[must_use]
    pub fn with_publication_lookup(mut self, lookup: impl PublicationLookup + 'static) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl TimeSource + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Current counters and cursor of a Range or SubRange.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownOwner`], or [`Error::Corruption`] if the stored row
    /// breaks an invariant.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn owner_status(&self, owner: OwnerId) -> Result<OwnerStatus> {
        Ok(status_of(&self.store.owner(owner)?))
    }

    /// The reuse pool of an owner.
    pub fn pool(&self, owner: OwnerId) -> Result<ReusePool> {
        self.store.pool(owner)
    }

    /// A batch record, deleted or not.
    pub fn batch(&self, id: BatchId) -> Result<IdentifierBatch> {
        self.store.batch(id).ok_or(Error::UnknownBatch { batch: id })
    }

    /// The lowest-id active subrange of `publisher` in `namespace` that still
    /// has free capacity.
    ///
    /// # Errors
    ///
    /// [`Error::NoCandidate`] if none qualifies.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn candidate_subrange(&self, publisher: PublisherId, namespace: Namespace) -> Result<SubRange> {
        self.store
            .owners()?
            .into_iter()
            .filter(Owner::is_candidate)
            .find_map(|owner| match owner {
                Owner::SubRange(sub) if sub.publisher == publisher && sub.namespace == namespace => {
                    Some(sub)
                }
                _ => None,
            })
            .ok_or(Error::NoCandidate { namespace })
    }

    /// The lowest-id active range of `namespace` (and `category`, when
    /// given) that still has free capacity.
    ///
    /// # Errors
    ///
    /// [`Error::NoCandidate`] if none qualifies.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn candidate_range(&self, namespace: Namespace, category: Option<u8>) -> Result<Range> {
        self.store
            .owners()?
            .into_iter()
            .filter(Owner::is_candidate)
            .find_map(|owner| match owner {
                Owner::Range(range)
                    if range.namespace == namespace
                        && category.is_none_or(|c| range.category == Some(c)) =>
                {
                    Some(range)
                }
                _ => None,
            })
            .ok_or(Error::NoCandidate { namespace })
    }

    /// Finds the owner that would have issued `identifier`, whether or not it
    /// is live.
    pub(crate) fn locate(&self, identifier: &str) -> Result<Option<Owner>> {
        Ok(self
            .store
            .owners()?
            .into_iter()
            .filter(Owner::issues_identifiers)
            .find(|owner| owns(owner, identifier)))
    }
}

pub(crate) fn status_of(owner: &Owner) -> OwnerStatus {
    let counters = owner.counters();
    let interval = owner.interval();
    OwnerStatus {
        owner: owner.id(),
        free: counters.free,
        taken: counters.taken,
        canceled: counters.canceled,
        deleted: counters.deleted,
        next: interval.format(interval.next()),
        state: owner.state(),
    }
}

/// Whether `identifier` is the formatted form of some item of `owner`.
fn owns(owner: &Owner, identifier: &str) -> bool {
    let head = match owner {
        Owner::Range(range) => &range.prefix,
        Owner::SubRange(sub) => &sub.publisher_identifier,
    };
    let width = usize::from(owner.interval().width());
    let Some(item) = identifier
        .strip_prefix(head.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|rest| rest.get(..width))
    else {
        return false;
    };
    parse_digits(item).is_ok_and(|item| {
        owner.interval().contains(item)
            && owner
                .format_unit(item)
                .is_ok_and(|formatted| formatted == identifier)
    })
}
