//! Structural and at-rest invariant checks.
//!
//! Construction uses [`validate_range`] and [`validate_subrange`], which
//! report [`Error::InvalidRange`]. Stores run [`validate_owner`] on every row
//! they hand to or take from a transaction; a failure there means stored
//! state is wrong and surfaces as [`Error::Corruption`].

use crate::{
    Error, IdentifierBatch, Namespace, Owner, Range, Result, ReusePool, SubRange, ISSN_ITEM_WIDTH,
};

/// Checks a range definition: prefix, category and interval width must agree
/// with the namespace.
pub fn validate_range(range: &Range) -> Result<()> {
    let ns = range.namespace;
    if !ns.is_valid_prefix(&range.prefix) {
        return Err(Error::invalid_range(format!(
            "`{}` is not a {ns} prefix",
            range.prefix
        )));
    }
    let expected_width = match (ns, range.category) {
        (Namespace::Issn, None) => ISSN_ITEM_WIDTH,
        (Namespace::Issn, Some(_)) => {
            return Err(Error::invalid_range("issn ranges have no category"));
        }
        (_, None) => {
            return Err(Error::invalid_range(format!("{ns} ranges need a category")));
        }
        (_, Some(category)) if ns.is_valid_category(category) => category,
        (_, Some(category)) => {
            return Err(Error::invalid_range(format!(
                "category {category} is not valid for {ns}"
            )));
        }
    };
    check_width(range.interval.width(), expected_width)
}

/// Checks a subrange definition: the publisher identifier must be the
/// namespace prefix plus exactly `category` digits, and the item interval
/// must take the rest of the body.
pub fn validate_subrange(subrange: &SubRange) -> Result<()> {
    let ns = subrange.namespace;
    if !ns.has_subranges() {
        return Err(Error::invalid_range(format!("{ns} has no subranges")));
    }
    let width = ns.item_width(subrange.category).ok_or_else(|| {
        Error::invalid_range(format!(
            "category {} is not valid for {ns}",
            subrange.category
        ))
    })?;
    let (prefix, segment) = subrange
        .publisher_identifier
        .rsplit_once('-')
        .unwrap_or(("", ""));
    if !ns.is_valid_prefix(prefix) {
        return Err(Error::invalid_range(format!(
            "`{}` does not start with a {ns} prefix",
            subrange.publisher_identifier
        )));
    }
    if segment.len() != usize::from(subrange.category)
        || !segment.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(Error::invalid_range(format!(
            "publisher segment `{segment}` does not have {} digits",
            subrange.category
        )));
    }
    check_width(subrange.interval.width(), width)
}

/// Checks every at-rest invariant of a stored owner row.
///
/// Beyond the structural rules this requires
/// `free = unminted + canceled + deleted`, `free + taken = total`, pool
/// counts matching the `canceled`/`deleted` counters, and every pool entry
/// being a value this owner already minted.
///
/// # Errors
///
/// [`Error::Corruption`] naming the first violated rule.
pub fn validate_owner(owner: &Owner, pool: &ReusePool) -> Result<()> {
    let id = owner.id();
    let corrupt = |detail: String| Error::corruption(id, None, detail);

    match owner {
        Owner::Range(r) => validate_range(r),
        Owner::SubRange(s) => validate_subrange(s),
    }
    .map_err(|e| corrupt(e.to_string()))?;

    let interval = owner.interval();
    let c = owner.counters();
    if c.free + c.taken != interval.total() {
        return Err(corrupt(format!(
            "free {} + taken {} != total {}",
            c.free,
            c.taken,
            interval.total()
        )));
    }
    if c.free != interval.remaining() + c.canceled + c.deleted {
        return Err(corrupt(format!(
            "free {} != unminted {} + canceled {} + deleted {}",
            c.free,
            interval.remaining(),
            c.canceled,
            c.deleted
        )));
    }
    let pooled_canceled = pool.count(crate::CancelOrigin::Canceled);
    let pooled_deleted = pool.count(crate::CancelOrigin::Deleted);
    if pooled_canceled != c.canceled || pooled_deleted != c.deleted {
        return Err(corrupt(format!(
            "pool holds {pooled_canceled} canceled / {pooled_deleted} deleted, counters say {} / {}",
            c.canceled, c.deleted
        )));
    }
    if let Some(stray) = pool
        .available()
        .chain(pool.used())
        .find(|e| e.owner != id || !interval.contains(e.item) || e.item >= interval.next())
    {
        return Err(corrupt(format!(
            "pool entry `{}` does not belong here",
            stray.value
        )));
    }
    Ok(())
}

/// Checks that a batch record's counts agree with each other and with its
/// identifier list.
///
/// # Errors
///
/// [`Error::Corruption`] naming the first violated rule.
pub fn validate_batch(batch: &IdentifierBatch) -> Result<()> {
    let corrupt = |detail: String| Error::corruption(batch.owner, Some(batch.id), detail);
    let listed = batch.identifiers.len();
    if u32::try_from(listed).ok() != Some(batch.identifier_count) {
        return Err(corrupt(format!(
            "{listed} identifiers listed, count says {}",
            batch.identifier_count
        )));
    }
    if batch.canceled_used_count > batch.identifier_count {
        return Err(corrupt(format!(
            "{} reused out of {}",
            batch.canceled_used_count, batch.identifier_count
        )));
    }
    let removed = u64::from(batch.canceled_count) + u64::from(batch.deleted_count);
    if removed > u64::from(batch.identifier_count) {
        return Err(corrupt(format!(
            "{} canceled + {} deleted out of {}",
            batch.canceled_count, batch.deleted_count, batch.identifier_count
        )));
    }
    if batch.deleted_count > 0 && !batch.deleted {
        return Err(corrupt("deleted count on a live batch".into()));
    }
    Ok(())
}

fn check_width(actual: u8, expected: u8) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::invalid_range(format!(
            "interval width {actual} does not match the expected {expected}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CancelOrigin, CanceledIdentifier, Counters, Interval, NewRange, OwnerId, OwnerState,
        PublisherId,
    };

    fn issn(begin: &str, end: &str) -> Range {
        Range::new(
            OwnerId::new(1),
            NewRange {
                namespace: Namespace::Issn,
                prefix: "1234".into(),
                category: None,
                range_begin: begin.into(),
                range_end: end.into(),
                state: OwnerState::Active,
            },
        )
        .unwrap()
    }

    #[test]
    fn range_rules() {
        let mut range = issn("000", "999");
        assert!(validate_range(&range).is_ok());

        range.category = Some(2);
        assert!(validate_range(&range).is_err());
        range.category = None;

        range.prefix = "12345".into();
        assert!(validate_range(&range).is_err());
        range.prefix = "1234".into();

        range.interval = Interval::parse("00", "99").unwrap();
        assert!(validate_range(&range).is_err());
    }

    #[test]
    fn ismn_categories_are_sparse() {
        let result = Range::new(
            OwnerId::new(1),
            NewRange {
                namespace: Namespace::Ismn,
                prefix: "979-0".into(),
                category: Some(4),
                range_begin: "0000".into(),
                range_end: "9999".into(),
                state: OwnerState::Active,
            },
        );
        assert!(matches!(result, Err(Error::InvalidRange { .. })));
    }

    #[test]
    fn subrange_segment_must_match_category() {
        let parent = Range::new(
            OwnerId::new(1),
            NewRange {
                namespace: Namespace::Ismn,
                prefix: "979-0".into(),
                category: Some(3),
                range_begin: "100".into(),
                range_end: "199".into(),
                state: OwnerState::Active,
            },
        )
        .unwrap();
        let mut sub =
            SubRange::grant(OwnerId::new(2), &parent, PublisherId::new(1), 150).unwrap();
        assert_eq!(sub.publisher_identifier, "979-0-150");
        assert_eq!(sub.interval.width(), 5);
        assert!(validate_subrange(&sub).is_ok());

        sub.publisher_identifier = "979-0-15".into();
        assert!(validate_subrange(&sub).is_err());
        sub.publisher_identifier = "979-1-150".into();
        assert!(validate_subrange(&sub).is_err());
    }

    #[test]
    fn owner_counters_must_balance() {
        let range = issn("000", "009");
        let mut owner = Owner::Range(range);
        let pool = ReusePool::new();
        assert!(validate_owner(&owner, &pool).is_ok());

        owner.counters_mut().taken = 1;
        assert!(matches!(
            validate_owner(&owner, &pool),
            Err(Error::Corruption { .. })
        ));

        // one minted, then cancelled back into the pool
        owner.interval_mut().advance();
        *owner.counters_mut() = Counters {
            free: 10,
            taken: 0,
            canceled: 1,
            deleted: 0,
        };
        assert!(validate_owner(&owner, &pool).is_err(), "pool is empty");

        let mut pool = ReusePool::new();
        pool.push(CanceledIdentifier {
            value: "1234-0006".into(),
            item: 0,
            owner: owner.id(),
            category: None,
            canceled_by: Some("tester".into()),
            canceled_at: 0,
            origin: CancelOrigin::Canceled,
            reuse: None,
        });
        assert!(validate_owner(&owner, &pool).is_ok());
    }

    #[test]
    fn pool_entries_must_be_minted_values() {
        let owner = Owner::Range(issn("000", "009"));
        let mut pool = ReusePool::new();
        pool.push(CanceledIdentifier {
            value: "1234-0006".into(),
            item: 0,
            owner: owner.id(),
            category: None,
            canceled_by: None,
            canceled_at: 0,
            origin: CancelOrigin::Deleted,
            reuse: None,
        });
        // counters claim nothing was minted
        assert!(validate_owner(&owner, &pool).is_err());
    }
}
