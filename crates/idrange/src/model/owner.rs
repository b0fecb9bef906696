use crate::{
    Error, Interval, Namespace, OwnerId, OwnerState, PublisherId, Result, append_check_digit,
    model::parse_digits, validate_range, validate_subrange,
};

/// Issuance counters kept on every Range and SubRange.
///
/// `free` counts everything that can still be handed out: unminted slots plus
/// reusable pool entries (`canceled` from cancellations, `deleted` from
/// undone batches). At rest `free + taken` equals the interval total.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Counters {
    pub free: u64,
    pub taken: u64,
    pub canceled: u64,
    pub deleted: u64,
}

impl Counters {
    /// Counters for an untouched interval.
    pub const fn fresh(interval: &Interval) -> Self {
        Self {
            free: interval.total(),
            taken: 0,
            canceled: 0,
            deleted: 0,
        }
    }
}

/// Administrative input for [`crate::Allocator::create_range`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRange {
    pub namespace: Namespace,
    /// `"978-951"`, `"979-0"`, or a four-digit ISSN block.
    pub prefix: String,
    /// Publisher segment length; `None` for ISSN.
    pub category: Option<u8>,
    pub range_begin: String,
    pub range_end: String,
    pub state: OwnerState,
}

/// A top-level block of a namespace.
///
/// For ISBN and ISMN the interval enumerates publisher identifiers, each of
/// which becomes a [`SubRange`]. For ISSN it enumerates the three item digits
/// that follow the block.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Range {
    pub id: OwnerId,
    pub namespace: Namespace,
    pub prefix: String,
    pub category: Option<u8>,
    pub interval: Interval,
    pub counters: Counters,
    pub state: OwnerState,
}

impl Range {
    /// Builds and validates a new range with its cursor at `range_begin`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if the definition breaks any structural rule,
    /// see [`validate_range`].
    pub fn new(id: OwnerId, new: NewRange) -> Result<Self> {
        let interval = Interval::parse(&new.range_begin, &new.range_end)?;
        let range = Self {
            id,
            namespace: new.namespace,
            prefix: new.prefix,
            category: new.category,
            counters: Counters::fresh(&interval),
            interval,
            state: new.state,
        };
        validate_range(&range)?;
        Ok(range)
    }

    /// Formats the unit under `value`: a publisher identifier such as
    /// `"978-951-12"` for EAN-13 namespaces, a full ISSN otherwise.
    pub fn format_unit(&self, value: u32) -> Result<String> {
        let body = format!("{}-{}", self.prefix, self.interval.format(value));
        match self.namespace {
            Namespace::Issn => append_check_digit(&body, Namespace::Issn),
            Namespace::Isbn | Namespace::Ismn => Ok(body),
        }
    }
}

/// A publisher-owned slice of an ISBN or ISMN [`Range`].
///
/// `category` is the length of the publisher segment; the item segment takes
/// the remaining `body_width - category` digits.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubRange {
    pub id: OwnerId,
    pub namespace: Namespace,
    pub parent: OwnerId,
    pub publisher: PublisherId,
    /// Prefix plus publisher segment, e.g. `"978-951-12"`.
    pub publisher_identifier: String,
    pub category: u8,
    pub interval: Interval,
    pub counters: Counters,
    pub state: OwnerState,
}

impl SubRange {
    /// Builds and validates a subrange from explicit strings.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if the bounds, category and publisher
    /// identifier disagree, see [`validate_subrange`].
    pub fn from_parts(
        id: OwnerId,
        parent: &Range,
        publisher: PublisherId,
        publisher_identifier: &str,
        range_begin: &str,
        range_end: &str,
    ) -> Result<Self> {
        let category = parent.category.ok_or_else(|| {
            Error::invalid_range(format!("range {} has no publisher tier", parent.id))
        })?;
        let interval = Interval::parse(range_begin, range_end)?;
        let subrange = Self {
            id,
            namespace: parent.namespace,
            parent: parent.id,
            publisher,
            publisher_identifier: publisher_identifier.to_owned(),
            category,
            counters: Counters::fresh(&interval),
            interval,
            state: OwnerState::Active,
        };
        validate_subrange(&subrange)?;
        if !subrange.publisher_identifier.starts_with(&parent.prefix) {
            return Err(Error::invalid_range(format!(
                "`{publisher_identifier}` does not belong to range prefix `{}`",
                parent.prefix
            )));
        }
        Ok(subrange)
    }

    /// Grants the publisher identifier `value` of `parent` as a full-width
    /// active subrange.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if `parent` has no publisher tier.
    pub fn grant(id: OwnerId, parent: &Range, publisher: PublisherId, value: u32) -> Result<Self> {
        let category = parent.category.ok_or_else(|| {
            Error::invalid_range(format!("range {} has no publisher tier", parent.id))
        })?;
        let width = parent.namespace.item_width(category).ok_or_else(|| {
            Error::invalid_range(format!("category {category} is not valid for {}", parent.namespace))
        })?;
        let items = Interval::full(width)?;
        Self::from_parts(
            id,
            parent,
            publisher,
            &parent.format_unit(value)?,
            &items.format(items.begin()),
            &items.format(items.end()),
        )
    }

    /// The publisher segment, e.g. `"12"` for `"978-951-12"`.
    pub fn publisher_segment(&self) -> &str {
        self.publisher_identifier
            .rsplit_once('-')
            .map_or("", |(_, segment)| segment)
    }

    /// The publisher segment as the parent range's numeric value.
    pub fn publisher_value(&self) -> Result<u32> {
        parse_digits(self.publisher_segment())
    }

    /// Formats a full identifier for item `value`, check digit included.
    pub fn format_identifier(&self, value: u32) -> Result<String> {
        let body = format!(
            "{}-{}",
            self.publisher_identifier,
            self.interval.format(value)
        );
        append_check_digit(&body, self.namespace)
    }
}

/// Anything that owns an interval and can be locked for issuance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Owner {
    Range(Range),
    SubRange(SubRange),
}

impl Owner {
    pub const fn id(&self) -> OwnerId {
        match self {
            Self::Range(r) => r.id,
            Self::SubRange(s) => s.id,
        }
    }

    pub const fn namespace(&self) -> Namespace {
        match self {
            Self::Range(r) => r.namespace,
            Self::SubRange(s) => s.namespace,
        }
    }

    pub const fn category(&self) -> Option<u8> {
        match self {
            Self::Range(r) => r.category,
            Self::SubRange(s) => Some(s.category),
        }
    }

    pub const fn interval(&self) -> &Interval {
        match self {
            Self::Range(r) => &r.interval,
            Self::SubRange(s) => &s.interval,
        }
    }

    pub(crate) fn interval_mut(&mut self) -> &mut Interval {
        match self {
            Self::Range(r) => &mut r.interval,
            Self::SubRange(s) => &mut s.interval,
        }
    }

    pub const fn counters(&self) -> &Counters {
        match self {
            Self::Range(r) => &r.counters,
            Self::SubRange(s) => &s.counters,
        }
    }

    pub(crate) fn counters_mut(&mut self) -> &mut Counters {
        match self {
            Self::Range(r) => &mut r.counters,
            Self::SubRange(s) => &mut s.counters,
        }
    }

    pub const fn state(&self) -> OwnerState {
        match self {
            Self::Range(r) => r.state,
            Self::SubRange(s) => s.state,
        }
    }

    pub(crate) fn set_state(&mut self, state: OwnerState) {
        match self {
            Self::Range(r) => r.state = state,
            Self::SubRange(s) => s.state = state,
        }
    }

    /// Whether this owner hands out full identifiers (subranges and ISSN
    /// ranges) rather than publisher identifiers.
    pub const fn issues_identifiers(&self) -> bool {
        match self {
            Self::Range(r) => !r.namespace.has_subranges(),
            Self::SubRange(_) => true,
        }
    }

    /// Formats the unit at `value`; see [`Range::format_unit`] and
    /// [`SubRange::format_identifier`].
    pub fn format_unit(&self, value: u32) -> Result<String> {
        match self {
            Self::Range(r) => r.format_unit(value),
            Self::SubRange(s) => s.format_identifier(value),
        }
    }

    /// Whether the owner is a candidate for issuance: active with free
    /// capacity either in its pool or ahead of the cursor.
    pub const fn is_candidate(&self) -> bool {
        self.state().is_active() && self.counters().free > 0
    }

    pub const fn as_range(&self) -> Option<&Range> {
        match self {
            Self::Range(r) => Some(r),
            Self::SubRange(_) => None,
        }
    }

    pub const fn as_subrange(&self) -> Option<&SubRange> {
        match self {
            Self::Range(_) => None,
            Self::SubRange(s) => Some(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isbn_range(category: u8, begin: &str, end: &str) -> Result<Range> {
        Range::new(
            OwnerId::new(1),
            NewRange {
                namespace: Namespace::Isbn,
                prefix: "978-951".into(),
                category: Some(category),
                range_begin: begin.into(),
                range_end: end.into(),
                state: OwnerState::Active,
            },
        )
    }

    #[test]
    fn new_range_starts_full() {
        let range = isbn_range(2, "10", "19").unwrap();
        assert_eq!(range.counters.free, 10);
        assert_eq!(range.counters.taken, 0);
        assert_eq!(range.interval.next(), 10);
        assert_eq!(range.format_unit(12).unwrap(), "978-951-12");
    }

    #[test]
    fn range_width_must_match_category() {
        assert!(matches!(
            isbn_range(3, "10", "19"),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn grant_sizes_items_from_category() {
        let range = isbn_range(2, "10", "19").unwrap();
        let sub = SubRange::grant(OwnerId::new(2), &range, PublisherId::new(7), 12).unwrap();
        assert_eq!(sub.publisher_identifier, "978-951-12");
        assert_eq!(sub.category, 2);
        assert_eq!(sub.interval.width(), 4);
        assert_eq!(sub.interval.total(), 10_000);
        assert_eq!(sub.counters.free, 10_000);
        assert_eq!(sub.publisher_segment(), "12");
        assert_eq!(sub.publisher_value(), Ok(12));
        assert_eq!(sub.format_identifier(0).unwrap(), "978-951-12-0000-0");
    }

    #[test]
    fn from_parts_rejects_mismatched_publisher() {
        let range = isbn_range(2, "10", "19").unwrap();
        // three-digit publisher segment under a category-2 range
        assert!(
            SubRange::from_parts(
                OwnerId::new(2),
                &range,
                PublisherId::new(7),
                "978-951-123",
                "0000",
                "9999"
            )
            .is_err()
        );
        // item width must be 6 - 2
        assert!(
            SubRange::from_parts(
                OwnerId::new(2),
                &range,
                PublisherId::new(7),
                "978-951-12",
                "000",
                "999"
            )
            .is_err()
        );
        // wrong group
        assert!(
            SubRange::from_parts(
                OwnerId::new(2),
                &range,
                PublisherId::new(7),
                "978-952-12",
                "0000",
                "9999"
            )
            .is_err()
        );
    }

    #[test]
    fn issn_range_formats_full_identifiers() {
        let range = Range::new(
            OwnerId::new(3),
            NewRange {
                namespace: Namespace::Issn,
                prefix: "1234".into(),
                category: None,
                range_begin: "000".into(),
                range_end: "000".into(),
                state: OwnerState::Active,
            },
        )
        .unwrap();
        let owner = Owner::Range(range);
        assert!(owner.issues_identifiers());
        assert_eq!(owner.format_unit(0).unwrap(), "1234-0006");
    }
}
