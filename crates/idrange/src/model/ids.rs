use core::fmt;

/// Defines a `u64`-backed row identifier.
///
/// The generated type is `Copy`, ordered, hashable, displays as the bare
/// number and serializes transparently when the `serde` feature is enabled.
macro_rules! define_row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw row number.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Returns the raw row number.
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_row_id!(
    /// Identifies a Range or SubRange row.
    OwnerId
);
define_row_id!(
    /// Identifies an issuance batch.
    BatchId
);
define_row_id!(
    /// A publisher owned by an external collaborator.
    PublisherId
);
define_row_id!(
    /// A publication owned by an external collaborator.
    PublicationId
);
