use core::sync::atomic::{AtomicU64, Ordering};
use std::{collections::HashSet, thread};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    Allocator, AllocatorConfig, BatchResult, CancelOrigin, Error, IssueRequest, IssuedIdentifier,
    MemoryStore, Namespace, NewRange, OwnerId, OwnerState, PublicationId, PublicationLookup,
    PublicationType, PublisherId, Store, StoreConfig, TimeSource, validate_identifier,
};

struct StepClock(AtomicU64);

impl TimeSource for StepClock {
    fn current_millis(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

struct KnownIds;

impl PublicationLookup for KnownIds {
    fn publisher_exists(&self, publisher: PublisherId) -> bool {
        publisher.get() < 100
    }

    fn publication_exists(&self, publication: PublicationId) -> bool {
        publication.get() < 100
    }
}

const PUBLICATION: PublicationId = PublicationId::new(1);
const PUBLISHER: PublisherId = PublisherId::new(7);

fn allocator() -> Allocator<MemoryStore> {
    Allocator::new(MemoryStore::default(), AllocatorConfig::default())
        .with_clock(StepClock(AtomicU64::new(1_000)))
}

fn issn_range(allocator: &Allocator<MemoryStore>, begin: &str, end: &str) -> OwnerId {
    allocator
        .create_range(NewRange {
            namespace: Namespace::Issn,
            prefix: "1234".into(),
            category: None,
            range_begin: begin.into(),
            range_end: end.into(),
            state: OwnerState::Active,
        })
        .unwrap()
        .id
}

/// A category 2 ISBN range under `978-951` starting at publisher `12`, and
/// one subrange granted from it.
fn isbn_subrange(allocator: &Allocator<MemoryStore>) -> (OwnerId, OwnerId) {
    let range = allocator
        .create_range(NewRange {
            namespace: Namespace::Isbn,
            prefix: "978-951".into(),
            category: Some(2),
            range_begin: "12".into(),
            range_end: "19".into(),
            state: OwnerState::Active,
        })
        .unwrap();
    let sub = allocator.grant_subrange(range.id, PUBLISHER).unwrap();
    (range.id, sub.id)
}

fn issue(allocator: &Allocator<MemoryStore>, owner: OwnerId, count: u32) -> BatchResult {
    allocator
        .issue_batch(IssueRequest::new(owner, count, PUBLICATION, "tester"))
        .unwrap()
}

/// Every owner satisfies its counter identities and `taken` matches the live
/// rows; reloading a snapshot checks exactly that.
fn assert_at_rest(allocator: &Allocator<MemoryStore>) {
    let snapshot = allocator.store().snapshot().unwrap();
    if let Err(e) = MemoryStore::from_snapshot(snapshot, StoreConfig::default()) {
        panic!("state at rest is inconsistent: {e}");
    }
}

#[test]
fn issn_scenario_issues_then_exhausts() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "000");

    let batch = issue(&allocator, owner, 1);
    assert_eq!(batch.identifiers, ["1234-0006"]);
    assert_eq!(batch.minted_count, 1);

    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.free, 0);
    assert_eq!(status.taken, 1);
    assert_eq!(status.next, "001");
    assert_eq!(status.state, OwnerState::Active);

    assert_eq!(
        allocator.issue_batch(IssueRequest::new(owner, 1, PUBLICATION, "tester")),
        Err(Error::RangeExhausted {
            owner,
            requested: 1,
            available: 0
        })
    );
}

#[test]
fn isbn_scenario_issues_from_granted_subrange() {
    let allocator = allocator();
    let (range, sub) = isbn_subrange(&allocator);

    let granted = allocator.store().owner(sub).unwrap();
    let granted = granted.as_subrange().unwrap();
    assert_eq!(granted.publisher_identifier, "978-951-12");
    assert_eq!(granted.category, 2);
    assert_eq!(granted.interval.total(), 10_000);

    let batch = issue(&allocator, sub, 1);
    assert_eq!(batch.identifiers, ["978-951-12-0000-0"]);
    assert_eq!(allocator.owner_status(sub).unwrap().next, "0001");

    let parent = allocator.owner_status(range).unwrap();
    assert_eq!(parent.taken, 1);
    assert_eq!(parent.free, 7);
    assert_eq!(parent.next, "13");
    assert_at_rest(&allocator);
}

#[test]
fn issued_identifiers_validate() {
    let allocator = allocator();
    let (_, sub) = isbn_subrange(&allocator);
    let issn = issn_range(&allocator, "000", "999");

    for value in issue(&allocator, sub, 50).identifiers {
        assert_eq!(validate_identifier(&value, Namespace::Isbn), Ok(()), "{value}");
    }
    for value in issue(&allocator, issn, 50).identifiers {
        assert_eq!(validate_identifier(&value, Namespace::Issn), Ok(()), "{value}");
    }
}

#[test]
fn ismn_subrange_uses_remaining_body_digits() {
    let allocator = allocator();
    let range = allocator
        .create_range(NewRange {
            namespace: Namespace::Ismn,
            prefix: "979-0".into(),
            category: Some(5),
            range_begin: "50000".into(),
            range_end: "50009".into(),
            state: OwnerState::Active,
        })
        .unwrap();
    let sub = allocator.grant_subrange(range.id, PUBLISHER).unwrap();
    assert_eq!(sub.publisher_identifier, "979-0-50000");
    assert_eq!(sub.interval.width(), 3);

    let batch = issue(&allocator, sub.id, 2);
    for value in &batch.identifiers {
        assert!(value.starts_with("979-0-50000-00"), "{value}");
        assert_eq!(validate_identifier(value, Namespace::Ismn), Ok(()));
    }
}

#[test]
fn exhaustion_boundary_is_all_or_nothing() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "009");
    issue(&allocator, owner, 7);
    let before = allocator.owner_status(owner).unwrap();

    assert_eq!(
        allocator.issue_batch(IssueRequest::new(owner, 4, PUBLICATION, "tester")),
        Err(Error::RangeExhausted {
            owner,
            requested: 4,
            available: 3
        })
    );
    assert_eq!(allocator.owner_status(owner).unwrap(), before);

    let last = issue(&allocator, owner, 3);
    assert_eq!(last.identifiers.len(), 3);
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.free, 0);
    assert_eq!(status.taken, 10);
    // one past the end, still active
    assert_eq!(status.next, "010");
    assert_eq!(status.state, OwnerState::Active);
    assert_at_rest(&allocator);
}

#[test]
fn two_slot_range_refuses_what_it_cannot_fill() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "001");

    let fresh = allocator.owner_status(owner).unwrap();
    assert_eq!(
        allocator.issue_batch(IssueRequest::new(owner, 3, PUBLICATION, "tester")),
        Err(Error::RangeExhausted {
            owner,
            requested: 3,
            available: 2
        })
    );
    assert_eq!(allocator.owner_status(owner).unwrap(), fresh);
    assert_eq!(fresh.next, "000");

    let both = issue(&allocator, owner, 2);
    assert_eq!(both.identifiers, ["1234-0006", "1234-0014"]);
    let full = allocator.owner_status(owner).unwrap();
    assert_eq!(full.next, "002");

    assert_eq!(
        allocator.issue_batch(IssueRequest::new(owner, 3, PUBLICATION, "tester")),
        Err(Error::RangeExhausted {
            owner,
            requested: 3,
            available: 0
        })
    );
    assert_eq!(allocator.owner_status(owner).unwrap(), full);
    assert_eq!(allocator.store().snapshot().unwrap().batches.len(), 1);
    assert_at_rest(&allocator);
}

#[test]
fn reuse_takes_precedence_in_cancellation_order() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let first = issue(&allocator, owner, 5).identifiers;

    allocator.cancel(&first[3], "editor").unwrap();
    allocator.cancel(&first[1], "editor").unwrap();
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!((status.taken, status.canceled, status.free), (3, 2, 997));

    let second = issue(&allocator, owner, 3);
    assert_eq!(second.reused_count, 2);
    assert_eq!(second.minted_count, 1);
    assert_eq!(second.identifiers[0], first[3]);
    assert_eq!(second.identifiers[1], first[1]);
    assert!(!first.contains(&second.identifiers[2]));

    let row = allocator.store().identifier(&first[3]).unwrap();
    assert!(row.reused);
    assert_eq!(row.batch, second.id);

    let pool = allocator.pool(owner).unwrap();
    assert_eq!(pool.available_len(), 0);
    assert_eq!(pool.used().len(), 2);
    assert!(pool.used().iter().all(|e| e.reuse.unwrap().batch == Some(second.id)));

    let status = allocator.owner_status(owner).unwrap();
    assert_eq!((status.taken, status.canceled, status.free), (6, 0, 994));
    assert_at_rest(&allocator);
}

#[test]
fn cancel_updates_pool_and_batch() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let batch = issue(&allocator, owner, 2);

    allocator.cancel(&batch.identifiers[0], "editor").unwrap();
    let entry = allocator
        .pool(owner)
        .unwrap()
        .available()
        .next()
        .cloned()
        .unwrap();
    assert_eq!(entry.value, batch.identifiers[0]);
    assert_eq!(entry.canceled_by.as_deref(), Some("editor"));
    assert_eq!(entry.origin, CancelOrigin::Canceled);
    assert!(entry.reuse.is_none());
    assert_eq!(allocator.batch(batch.id).unwrap().canceled_count, 1);
    assert!(allocator.store().identifier(&batch.identifiers[0]).is_none());
}

#[test]
fn cancel_rejects_bad_and_repeated_identifiers() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let value = issue(&allocator, owner, 1).identifiers.remove(0);

    assert!(matches!(
        allocator.cancel("1234-0007", "editor"),
        Err(Error::InvalidChecksum { .. })
    ));
    assert!(matches!(
        allocator.cancel("hello", "editor"),
        Err(Error::InvalidFormat { .. })
    ));
    // well formed, inside the range, never issued
    let unissued = crate::append_check_digit("1234-500", Namespace::Issn).unwrap();
    assert_eq!(
        allocator.cancel(&unissued, "editor"),
        Err(Error::UnknownIdentifier {
            identifier: unissued.clone()
        })
    );

    allocator.cancel(&value, "editor").unwrap();
    assert_eq!(
        allocator.cancel(&value, "editor"),
        Err(Error::AlreadyCanceled {
            identifier: value.clone()
        })
    );
}

#[test]
fn reissued_identifier_cancelled_again_gets_a_new_entry() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let value = issue(&allocator, owner, 1).identifiers.remove(0);

    allocator.cancel(&value, "first").unwrap();
    let again = issue(&allocator, owner, 1);
    assert_eq!(again.identifiers, [value.clone()]);
    allocator.cancel(&value, "second").unwrap();

    let pool = allocator.pool(owner).unwrap();
    assert_eq!(pool.used().len(), 1);
    assert_eq!(pool.used()[0].canceled_by.as_deref(), Some("first"));
    let available: Vec<_> = pool.available().collect();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].canceled_by.as_deref(), Some("second"));
    assert_at_rest(&allocator);
}

#[test]
fn reference_guard_blocks_cancel_and_delete() {
    let allocator = allocator().with_reference_guard(|row: &IssuedIdentifier| row.item == 1);
    let owner = issn_range(&allocator, "000", "999");
    let batch = issue(&allocator, owner, 3);

    assert_eq!(
        allocator.cancel(&batch.identifiers[1], "editor"),
        Err(Error::AlreadyUsedElsewhere {
            identifier: batch.identifiers[1].clone()
        })
    );
    assert_eq!(
        allocator.delete_batch(batch.id),
        Err(Error::AlreadyUsedElsewhere {
            identifier: batch.identifiers[1].clone()
        })
    );
    assert_eq!(allocator.owner_status(owner).unwrap().taken, 3);
    allocator.cancel(&batch.identifiers[0], "editor").unwrap();
}

#[test]
fn deleting_the_latest_batch_rewinds_the_cursor() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    issue(&allocator, owner, 2);
    let batch = issue(&allocator, owner, 3);

    allocator.delete_batch(batch.id).unwrap();
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.next, "002");
    assert_eq!((status.taken, status.deleted, status.free), (2, 0, 998));
    assert_eq!(allocator.pool(owner).unwrap().available_len(), 0);

    let stored = allocator.batch(batch.id).unwrap();
    assert!(stored.deleted);
    assert_eq!(stored.deleted_count, 3);
    assert_eq!(stored.identifiers, batch.identifiers);

    // the same values come back from the cursor
    assert_eq!(issue(&allocator, owner, 3).identifiers, batch.identifiers);
    assert_at_rest(&allocator);
}

#[test]
fn deleting_an_older_batch_fills_the_pool() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let older = issue(&allocator, owner, 3);
    issue(&allocator, owner, 2);

    allocator.delete_batch(older.id).unwrap();
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.next, "005");
    assert_eq!((status.taken, status.deleted, status.free), (2, 3, 998));
    let pool = allocator.pool(owner).unwrap();
    assert!(pool.available().all(|e| e.origin == CancelOrigin::Deleted && e.canceled_by.is_none()));

    let next = issue(&allocator, owner, 4);
    assert_eq!(next.reused_count, 3);
    assert_eq!(&next.identifiers[..3], &older.identifiers[..]);
    assert_eq!(allocator.owner_status(owner).unwrap().deleted, 0);
    assert_at_rest(&allocator);
}

#[test]
fn deleting_a_batch_with_reused_and_canceled_members() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let first = issue(&allocator, owner, 3);
    allocator.cancel(&first.identifiers[0], "editor").unwrap();

    // one reused, two minted at the tail
    let second = issue(&allocator, owner, 3);
    assert_eq!(second.reused_count, 1);
    allocator.cancel(&second.identifiers[2], "editor").unwrap();

    allocator.delete_batch(second.id).unwrap();
    let stored = allocator.batch(second.id).unwrap();
    assert_eq!(stored.deleted_count, 2);
    assert_eq!(stored.canceled_count, 1);
    assert_eq!(stored.canceled_used_count, 1);

    // item 3 is minted and live but not at the tail: item 4 sits in the pool
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.next, "005");
    assert_eq!(status.taken, 2);
    assert_eq!(status.canceled, 2);
    assert_eq!(status.deleted, 1);
    assert_at_rest(&allocator);

    assert_eq!(
        allocator.delete_batch(second.id),
        Err(Error::AlreadyDeleted { batch: second.id })
    );
}

#[test]
fn idempotent_replay_returns_the_original_batch() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let request = IssueRequest::new(owner, 3, PUBLICATION, "tester")
        .with_publication_type(PublicationType::ElectronicPdf)
        .with_idempotency_key("req-1");

    let first = allocator.issue_batch(request.clone()).unwrap();
    let replayed = allocator.issue_batch(request).unwrap();
    assert_eq!(first, replayed);
    assert_eq!(allocator.owner_status(owner).unwrap().taken, 3);

    let other = allocator
        .create_range(NewRange {
            namespace: Namespace::Issn,
            prefix: "5678".into(),
            category: None,
            range_begin: "000".into(),
            range_end: "999".into(),
            state: OwnerState::Active,
        })
        .unwrap();
    assert_eq!(
        allocator.issue_batch(
            IssueRequest::new(other.id, 1, PUBLICATION, "tester").with_idempotency_key("req-1")
        ),
        Err(Error::IdempotencyConflict {
            key: "req-1".into(),
            batch: first.id
        })
    );
}

#[test]
fn replaying_a_deleted_batch_is_refused() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let request = IssueRequest::new(owner, 2, PUBLICATION, "tester").with_idempotency_key("req-1");

    let first = allocator.issue_batch(request.clone()).unwrap();
    allocator.delete_batch(first.id).unwrap();

    // The rewound cursor hands the same values to the next publication.
    let second = allocator
        .issue_batch(IssueRequest::new(owner, 2, PublicationId::new(2), "tester"))
        .unwrap();
    assert_eq!(second.identifiers, first.identifiers);

    assert_eq!(
        allocator.issue_batch(request),
        Err(Error::AlreadyDeleted { batch: first.id })
    );
    for value in &second.identifiers {
        let row = allocator.store().identifier(value).unwrap();
        assert_eq!(row.batch, second.id);
        assert_eq!(row.publication, PublicationId::new(2));
    }
    assert_eq!(allocator.owner_status(owner).unwrap().taken, 2);
    assert_at_rest(&allocator);
}

#[test]
fn issue_rejects_invalid_requests() {
    let allocator = allocator().with_publication_lookup(KnownIds);
    let (range, sub) = isbn_subrange(&allocator);

    assert_eq!(
        allocator.issue_batch(IssueRequest::new(sub, 0, PUBLICATION, "tester")),
        Err(Error::InvalidCount { count: 0, max: 1_000 })
    );
    assert_eq!(
        allocator.issue_batch(IssueRequest::new(sub, 1_001, PUBLICATION, "tester")),
        Err(Error::InvalidCount {
            count: 1_001,
            max: 1_000
        })
    );
    assert_eq!(
        allocator.issue_batch(IssueRequest::new(sub, 1, PublicationId::new(500), "tester")),
        Err(Error::UnknownPublication {
            publication: PublicationId::new(500)
        })
    );
    assert!(matches!(
        allocator.issue_batch(IssueRequest::new(range, 1, PUBLICATION, "tester")),
        Err(Error::InvalidOwnerKind { .. })
    ));
    assert_eq!(
        allocator.issue_batch(IssueRequest::new(OwnerId::new(99), 1, PUBLICATION, "tester")),
        Err(Error::UnknownOwner {
            owner: OwnerId::new(99)
        })
    );

    allocator.set_state(sub, OwnerState::Inactive).unwrap();
    assert_eq!(
        allocator.issue_batch(IssueRequest::new(sub, 1, PUBLICATION, "tester")),
        Err(Error::InvalidOwnerState {
            owner: sub,
            state: OwnerState::Inactive
        })
    );
    assert_eq!(
        allocator.grant_subrange(range, PublisherId::new(500)),
        Err(Error::UnknownPublisher {
            publisher: PublisherId::new(500)
        })
    );
}

#[test]
fn subrange_lifecycle() {
    let allocator = allocator();
    let (range, sub) = isbn_subrange(&allocator);

    // an untouched subrange may be deleted; its publisher identifier is reused
    allocator.delete_subrange(sub).unwrap();
    let parent = allocator.owner_status(range).unwrap();
    assert_eq!((parent.taken, parent.deleted, parent.free), (0, 1, 8));

    let regranted = allocator.grant_subrange(range, PublisherId::new(8)).unwrap();
    assert_eq!(regranted.publisher_identifier, "978-951-12");
    assert_ne!(regranted.id, sub);

    issue(&allocator, regranted.id, 1);
    assert_eq!(
        allocator.delete_subrange(regranted.id),
        Err(Error::OwnerInUse {
            owner: regranted.id,
            taken: 1
        })
    );
    assert!(matches!(
        allocator.delete_subrange(range),
        Err(Error::InvalidOwnerKind { .. })
    ));
    assert_at_rest(&allocator);
}

#[test]
fn issn_ranges_do_not_grant_subranges() {
    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    assert!(matches!(
        allocator.grant_subrange(owner, PUBLISHER),
        Err(Error::InvalidOwnerKind { .. })
    ));
}

#[test]
fn range_grants_until_exhausted() {
    let allocator = allocator();
    let range = allocator
        .create_range(NewRange {
            namespace: Namespace::Isbn,
            prefix: "978-952".into(),
            category: Some(5),
            range_begin: "99998".into(),
            range_end: "99999".into(),
            state: OwnerState::Active,
        })
        .unwrap();
    allocator.grant_subrange(range.id, PUBLISHER).unwrap();
    allocator.grant_subrange(range.id, PUBLISHER).unwrap();
    assert_eq!(
        allocator.grant_subrange(range.id, PUBLISHER),
        Err(Error::RangeExhausted {
            owner: range.id,
            requested: 1,
            available: 0
        })
    );
    // category 5 leaves a single item digit
    let sub = allocator.candidate_subrange(PUBLISHER, Namespace::Isbn).unwrap();
    assert_eq!(sub.interval.total(), 10);
}

#[test]
fn overlapping_ranges_are_rejected() {
    let allocator = allocator();
    let new = |category: u8, begin: &str, end: &str| NewRange {
        namespace: Namespace::Isbn,
        prefix: "978-951".into(),
        category: Some(category),
        range_begin: begin.into(),
        range_end: end.into(),
        state: OwnerState::Inactive,
    };
    allocator.create_range(new(2, "10", "19")).unwrap();
    // publisher "1" would cover 10..=19 as well
    assert!(matches!(
        allocator.create_range(new(1, "1", "1")),
        Err(Error::InvalidRange { .. })
    ));
    assert!(matches!(
        allocator.create_range(new(3, "195", "205")),
        Err(Error::InvalidRange { .. })
    ));
    allocator.create_range(new(3, "200", "299")).unwrap();
    assert!(matches!(
        allocator.create_range(NewRange {
            state: OwnerState::Closed,
            ..new(4, "5000", "5999")
        }),
        Err(Error::InvalidRange { .. })
    ));
}

#[test]
fn state_changes_and_candidates() {
    let allocator = allocator();
    let exhausted = issn_range(&allocator, "000", "000");
    issue(&allocator, exhausted, 1);
    let spare = allocator
        .create_range(NewRange {
            namespace: Namespace::Issn,
            prefix: "5678".into(),
            category: None,
            range_begin: "000".into(),
            range_end: "999".into(),
            state: OwnerState::Inactive,
        })
        .unwrap();

    assert_eq!(
        allocator.candidate_range(Namespace::Issn, None),
        Err(Error::NoCandidate {
            namespace: Namespace::Issn
        })
    );
    assert_eq!(
        allocator.set_state(exhausted, OwnerState::Active),
        Err(Error::RangeExhausted {
            owner: exhausted,
            requested: 1,
            available: 0
        })
    );

    let status = allocator.set_state(spare.id, OwnerState::Active).unwrap();
    assert_eq!(status.state, OwnerState::Active);
    assert_eq!(allocator.candidate_range(Namespace::Issn, None).unwrap().id, spare.id);

    allocator.set_state(exhausted, OwnerState::Closed).unwrap();
    assert_eq!(
        allocator.owner_status(exhausted).unwrap().state,
        OwnerState::Closed
    );
    assert!(allocator.candidate_subrange(PUBLISHER, Namespace::Isbn).is_err());
}

#[test]
fn concurrent_issuance_never_duplicates() {
    const THREADS: usize = 8;
    const BATCHES: usize = 4;
    const BATCH_SIZE: u32 = 3;
    const POOLED: usize = 12;
    const ISSUED: usize = THREADS * BATCHES * BATCH_SIZE as usize;

    let allocator = allocator();
    let (_, sub) = isbn_subrange(&allocator);
    let pooled = issue(&allocator, sub, POOLED as u32).identifiers;
    for value in &pooled {
        allocator.cancel(value, "editor").unwrap();
    }
    assert_eq!(allocator.pool(sub).unwrap().available_len(), POOLED);
    let allocator = &allocator;

    let batches: Vec<BatchResult> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(move || {
                    (0..BATCHES)
                        .map(|_| issue(allocator, sub, BATCH_SIZE))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let union: HashSet<&String> = batches.iter().flat_map(|b| &b.identifiers).collect();
    assert_eq!(union.len(), ISSUED);
    for value in &pooled {
        assert!(union.contains(value), "{value} was never reissued");
    }
    assert_eq!(allocator.pool(sub).unwrap().available_len(), 0);

    let minted: u32 = batches.iter().map(|b| b.minted_count).sum();
    let reused: u32 = batches.iter().map(|b| b.reused_count).sum();
    assert_eq!(minted as usize, ISSUED - POOLED);
    assert_eq!(reused as usize, POOLED);

    let status = allocator.owner_status(sub).unwrap();
    assert_eq!(status.taken, ISSUED as u64);
    assert_eq!(status.canceled, 0);
    assert_eq!(status.free + status.taken, 10_000);
    assert_at_rest(allocator);
}

#[test]
fn concurrent_cancel_and_reissue_keeps_invariants() {
    const THREADS: u64 = 6;

    let allocator = allocator();
    let owner = issn_range(&allocator, "000", "999");
    let allocator = &allocator;

    let live: Vec<String> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                s.spawn(move || {
                    let mut rng = StdRng::seed_from_u64(100 + t);
                    let mut held: Vec<String> = Vec::new();
                    for _ in 0..30 {
                        if !held.is_empty() && rng.random_bool(0.4) {
                            let value = held.swap_remove(rng.random_range(0..held.len()));
                            allocator.cancel(&value, "worker").unwrap();
                        } else {
                            let count = rng.random_range(1..=4);
                            held.extend(issue(allocator, owner, count).identifiers);
                        }
                    }
                    held
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    // each thread holds exactly the identifiers live for it
    let unique: HashSet<_> = live.iter().collect();
    assert_eq!(unique.len(), live.len());
    let status = allocator.owner_status(owner).unwrap();
    assert_eq!(status.taken, live.len() as u64);
    for value in &live {
        assert_eq!(allocator.store().identifier(value).unwrap().owner, owner);
    }
    assert_at_rest(allocator);
}

#[test]
fn random_operations_keep_invariants_at_rest() {
    let allocator = allocator();
    let (_, sub) = isbn_subrange(&allocator);
    let issn = issn_range(&allocator, "000", "099");
    let owners = [sub, issn];
    let mut rng = StdRng::seed_from_u64(42);
    let mut batches = Vec::new();

    for _ in 0..200 {
        let owner = owners[rng.random_range(0..owners.len())];
        match rng.random_range(0..10) {
            0..=5 => {
                let count = rng.random_range(1..=6);
                match allocator.issue_batch(IssueRequest::new(owner, count, PUBLICATION, "rng")) {
                    Ok(batch) => batches.push(batch),
                    Err(Error::RangeExhausted { .. }) => {}
                    Err(e) => panic!("unexpected {e}"),
                }
            }
            6..=7 if !batches.is_empty() => {
                let batch = &batches[rng.random_range(0..batches.len())];
                let value = &batch.identifiers[rng.random_range(0..batch.identifiers.len())];
                match allocator.cancel(value, "rng") {
                    Ok(()) | Err(Error::AlreadyCanceled { .. } | Error::UnknownIdentifier { .. }) => {}
                    Err(e) => panic!("unexpected {e}"),
                }
            }
            _ if !batches.is_empty() => {
                let batch = batches.swap_remove(rng.random_range(0..batches.len()));
                allocator.delete_batch(batch.id).unwrap();
            }
            _ => {}
        }
        assert_at_rest(&allocator);
    }
}
