use crate::{Error, ISMN_BODY_WIDTH, Result};

/// Widest numeric segment any namespace uses (the ISMN body).
const MAX_WIDTH: u8 = ISMN_BODY_WIDTH;

/// A fixed-width numeric interval with a monotonic issuance cursor.
///
/// `begin`, `end` and `next` share one width; values are zero-padded to it
/// when formatted. The cursor obeys `begin <= next <= end + 1`: `next` is the
/// smallest value not yet minted, and `next == end + 1` means the interval is
/// exhausted but not necessarily closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval {
    width: u8,
    begin: u32,
    end: u32,
    next: u32,
}

impl Interval {
    /// Creates a fresh interval with the cursor at `begin`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if `width` is 0 or too wide, if either bound
    /// does not fit in `width` digits, or if `begin > end`.
    pub fn new(width: u8, begin: u32, end: u32) -> Result<Self> {
        Self::with_next(width, begin, end, begin)
    }

    /// Creates an interval covering every `width`-digit value.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if `width` is 0 or too wide.
    pub fn full(width: u8) -> Result<Self> {
        if width == 0 || width > MAX_WIDTH {
            return Err(Error::invalid_range(format!("unsupported width {width}")));
        }
        Self::new(width, 0, 10_u32.pow(u32::from(width)) - 1)
    }

    /// Restores an interval with an explicit cursor.
    ///
    /// # Errors
    ///
    /// As [`Interval::new`], plus a cursor outside `begin..=end + 1`.
    pub fn with_next(width: u8, begin: u32, end: u32, next: u32) -> Result<Self> {
        if width == 0 || width > MAX_WIDTH {
            return Err(Error::invalid_range(format!("unsupported width {width}")));
        }
        let limit = 10_u32.pow(u32::from(width));
        if begin >= limit || end >= limit {
            return Err(Error::invalid_range(format!(
                "bounds {begin}..={end} do not fit in {width} digits"
            )));
        }
        if begin > end {
            return Err(Error::invalid_range(format!(
                "range begin {begin} is after range end {end}"
            )));
        }
        if next < begin || next > end + 1 {
            return Err(Error::invalid_range(format!(
                "cursor {next} outside {begin}..={}",
                end + 1
            )));
        }
        Ok(Self {
            width,
            begin,
            end,
            next,
        })
    }

    /// Parses zero-padded bounds such as `"0000"` and `"9999"`. The width is
    /// taken from the strings, which must agree.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRange`] if the strings are not all digits, their widths
    /// differ, or the bounds are inverted.
    pub fn parse(begin: &str, end: &str) -> Result<Self> {
        if begin.len() != end.len() {
            return Err(Error::invalid_range(format!(
                "range begin `{begin}` and range end `{end}` differ in width"
            )));
        }
        let width = u8::try_from(begin.len())
            .map_err(|_| Error::invalid_range(format!("`{begin}` is too wide")))?;
        Self::new(width, parse_digits(begin)?, parse_digits(end)?)
    }

    pub const fn width(&self) -> u8 {
        self.width
    }

    pub const fn begin(&self) -> u32 {
        self.begin
    }

    pub const fn end(&self) -> u32 {
        self.end
    }

    pub const fn next(&self) -> u32 {
        self.next
    }

    /// Number of values in `begin..=end`.
    pub const fn total(&self) -> u64 {
        (self.end - self.begin) as u64 + 1
    }

    /// Number of values not minted yet.
    pub const fn remaining(&self) -> u64 {
        (self.end as u64 + 1) - self.next as u64
    }

    pub const fn is_exhausted(&self) -> bool {
        self.next > self.end
    }

    pub const fn contains(&self, value: u32) -> bool {
        self.begin <= value && value <= self.end
    }

    /// Formats `value` zero-padded to the interval width.
    pub fn format(&self, value: u32) -> String {
        format!("{value:0width$}", width = usize::from(self.width))
    }

    /// Mints the value under the cursor and advances it.
    ///
    /// Returns `None` once the interval is exhausted.
    pub(crate) fn advance(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        let value = self.next;
        self.next += 1;
        Some(value)
    }

    /// Moves the cursor back to `next`, which must lie in `begin..=self.next`.
    pub(crate) fn rewind_to(&mut self, next: u32) {
        debug_assert!(self.begin <= next && next <= self.next);
        self.next = next;
    }
}

pub(crate) fn parse_digits(s: &str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_range(format!("`{s}` is not a digit string")));
    }
    s.parse()
        .map_err(|_| Error::invalid_range(format!("`{s}` is out of range")))
}
