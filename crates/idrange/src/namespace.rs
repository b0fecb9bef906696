use core::{fmt, str::FromStr};

/// EAN-13 prefixes of the ISBN registration groups this engine administers.
pub const ISBN_PREFIXES: [&str; 2] = ["978-951", "978-952"];

/// EAN-13 prefix shared by every ISMN.
pub const ISMN_PREFIX: &str = "979-0";

/// Digits available for publisher + item after an ISBN prefix.
pub const ISBN_BODY_WIDTH: u8 = 6;

/// Digits available for publisher + item after the ISMN prefix.
pub const ISMN_BODY_WIDTH: u8 = 8;

/// Item digits following an ISSN block.
pub const ISSN_ITEM_WIDTH: u8 = 3;

/// Longest publisher segment an ISBN subrange may carry.
pub const ISBN_RANGE_LENGTH: u8 = 5;

/// Longest publisher segment an ISMN subrange may carry.
pub const ISMN_RANGE_LENGTH: u8 = 7;

/// Publisher segment lengths in use for ISMN.
pub const ISMN_CATEGORIES: [u8; 4] = [3, 5, 6, 7];

/// The identifier families the engine allocates from.
///
/// ISBN and ISMN are EAN-13 numbers split into publisher and item segments,
/// so their ranges are subdivided into publisher-owned subranges. ISSN has
/// no publisher tier: its ranges issue identifiers directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Namespace {
    Isbn,
    Ismn,
    Issn,
}

impl Namespace {
    /// Whether ranges of this namespace are split into publisher subranges.
    pub const fn has_subranges(self) -> bool {
        matches!(self, Self::Isbn | Self::Ismn)
    }

    /// Publisher + item digits for EAN-13 namespaces, item digits for ISSN.
    pub const fn body_width(self) -> u8 {
        match self {
            Self::Isbn => ISBN_BODY_WIDTH,
            Self::Ismn => ISMN_BODY_WIDTH,
            Self::Issn => ISSN_ITEM_WIDTH,
        }
    }

    /// Returns `true` if `category` is a legal publisher segment length.
    ///
    /// ISSN has no categories, so this is always `false` there.
    pub fn is_valid_category(self, category: u8) -> bool {
        match self {
            Self::Isbn => (1..=ISBN_RANGE_LENGTH).contains(&category),
            Self::Ismn => ISMN_CATEGORIES.contains(&category),
            Self::Issn => false,
        }
    }

    /// Width of the item segment issued by a subrange of `category`.
    ///
    /// Returns `None` for ISSN or an illegal category.
    pub fn item_width(self, category: u8) -> Option<u8> {
        self.is_valid_category(category)
            .then(|| self.body_width() - category)
    }

    /// Returns `true` if `prefix` may head a range of this namespace.
    ///
    /// For ISSN the prefix is the four-digit block.
    pub fn is_valid_prefix(self, prefix: &str) -> bool {
        match self {
            Self::Isbn => ISBN_PREFIXES.contains(&prefix),
            Self::Ismn => prefix == ISMN_PREFIX,
            Self::Issn => prefix.len() == 4 && prefix.bytes().all(|b| b.is_ascii_digit()),
        }
    }

    /// Guesses the namespace from the shape of a formatted identifier.
    ///
    /// This only looks at the leading characters; full validation happens in
    /// [`crate::validate_identifier`].
    pub fn detect(identifier: &str) -> Option<Self> {
        if identifier.starts_with("979-0-") {
            Some(Self::Ismn)
        } else if identifier.starts_with("978-") {
            Some(Self::Isbn)
        } else if identifier.len() == 9 && identifier.as_bytes().get(4) == Some(&b'-') {
            Some(Self::Issn)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isbn => "isbn",
            Self::Ismn => "ismn",
            Self::Issn => "issn",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "isbn" => Ok(Self::Isbn),
            "ismn" => Ok(Self::Ismn),
            "issn" => Ok(Self::Issn),
            _ => Err(crate::Error::InvalidFormat {
                value: s.to_owned(),
                reason: "unknown namespace",
            }),
        }
    }
}
