use core::{fmt, str::FromStr};

use crate::Error;

/// Lifecycle state of a Range or SubRange.
///
/// A single tri-state value replaces separate active/closed flags, so an
/// owner can never be both.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum OwnerState {
    /// Issues identifiers (or grants subranges).
    Active,
    /// Retired for good: exhausted or administratively closed.
    Closed,
    /// Set up but not issuing yet.
    #[default]
    Inactive,
}

impl OwnerState {
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for OwnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "closed" => Ok(Self::Closed),
            "inactive" => Ok(Self::Inactive),
            _ => Err(Error::invalid_range(format!("unknown state `{s}`"))),
        }
    }
}
