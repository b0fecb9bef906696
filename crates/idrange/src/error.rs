use core::time::Duration;

use crate::{BatchId, Namespace, OwnerId, OwnerState, PublicationId, PublisherId};

/// A result type defaulting to the engine's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors the allocation engine can produce.
///
/// Every variant is returned to the caller as a typed value; nothing is
/// retried internally. Only [`Error::Contention`] is safe to retry, see
/// [`Error::is_retryable`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The identifier string does not match the namespace's structure.
    #[error("malformed identifier `{value}`: {reason}")]
    InvalidFormat { value: String, reason: &'static str },

    /// The identifier is well formed but its check digit is wrong.
    #[error("invalid check digit in `{value}`, expected `{expected}`")]
    InvalidChecksum { value: String, expected: char },

    /// The owner cannot supply the requested number of identifiers, even
    /// after combining its reuse pool with unminted capacity.
    #[error("owner {owner} cannot supply {requested} (only {available} available)")]
    RangeExhausted {
        owner: OwnerId,
        requested: u32,
        available: u64,
    },

    /// The owner is not in a state that allows the operation.
    #[error("owner {owner} is {state}")]
    InvalidOwnerState { owner: OwnerId, state: OwnerState },

    /// The owner exists but is the wrong tier for the operation, e.g. asking
    /// an ISBN range (which grants publisher identifiers) for ISBNs.
    #[error("owner {owner} does not issue {expected}")]
    InvalidOwnerKind {
        owner: OwnerId,
        expected: &'static str,
    },

    /// A batch count outside `1..=max`.
    #[error("invalid count {count}, expected 1..={max}")]
    InvalidCount { count: u32, max: u32 },

    /// A range or subrange definition violates its structural invariants.
    #[error("invalid range: {reason}")]
    InvalidRange { reason: String },

    /// The identifier sits in a reuse pool already.
    #[error("`{identifier}` is already canceled")]
    AlreadyCanceled { identifier: String },

    /// The batch was deleted before.
    #[error("batch {batch} is already deleted")]
    AlreadyDeleted { batch: BatchId },

    /// A downstream collaborator still references the identifier.
    #[error("`{identifier}` is referenced elsewhere")]
    AlreadyUsedElsewhere { identifier: String },

    /// A subrange cannot be removed once it issued anything.
    #[error("owner {owner} has issued {taken} identifiers")]
    OwnerInUse { owner: OwnerId, taken: u64 },

    /// The owner row lock could not be acquired in time. Retryable.
    #[error("timed out after {waited:?} waiting for owner {owner}")]
    Contention { owner: OwnerId, waited: Duration },

    /// Stored state violates an invariant. Fatal: a prior transaction wrote
    /// something it should not have.
    #[error("corrupted state on owner {owner} (batch {batch:?}): {detail}")]
    Corruption {
        owner: OwnerId,
        batch: Option<BatchId>,
        detail: String,
    },

    #[error("unknown owner {owner}")]
    UnknownOwner { owner: OwnerId },

    #[error("unknown identifier `{identifier}`")]
    UnknownIdentifier { identifier: String },

    #[error("unknown batch {batch}")]
    UnknownBatch { batch: BatchId },

    #[error("unknown publisher {publisher}")]
    UnknownPublisher { publisher: PublisherId },

    #[error("unknown publication {publication}")]
    UnknownPublication { publication: PublicationId },

    /// No active owner with capacity matches the selection.
    #[error("no active {namespace} owner with free capacity")]
    NoCandidate { namespace: Namespace },

    /// The idempotency key is already bound to a batch on another owner.
    #[error("idempotency key `{key}` is bound to batch {batch} on another owner")]
    IdempotencyConflict { key: String, batch: BatchId },
}

/// The fieldless kind of an [`Error`], for mapping onto a caller's own
/// protocol status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidFormat,
    InvalidChecksum,
    RangeExhausted,
    InvalidOwnerState,
    InvalidOwnerKind,
    InvalidCount,
    InvalidRange,
    AlreadyCanceled,
    AlreadyDeleted,
    AlreadyUsedElsewhere,
    OwnerInUse,
    Contention,
    Corruption,
    NotFound,
    NoCandidate,
    IdempotencyConflict,
}

impl Error {
    /// Returns the kind of this error.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFormat { .. } => ErrorKind::InvalidFormat,
            Self::InvalidChecksum { .. } => ErrorKind::InvalidChecksum,
            Self::RangeExhausted { .. } => ErrorKind::RangeExhausted,
            Self::InvalidOwnerState { .. } => ErrorKind::InvalidOwnerState,
            Self::InvalidOwnerKind { .. } => ErrorKind::InvalidOwnerKind,
            Self::InvalidCount { .. } => ErrorKind::InvalidCount,
            Self::InvalidRange { .. } => ErrorKind::InvalidRange,
            Self::AlreadyCanceled { .. } => ErrorKind::AlreadyCanceled,
            Self::AlreadyDeleted { .. } => ErrorKind::AlreadyDeleted,
            Self::AlreadyUsedElsewhere { .. } => ErrorKind::AlreadyUsedElsewhere,
            Self::OwnerInUse { .. } => ErrorKind::OwnerInUse,
            Self::Contention { .. } => ErrorKind::Contention,
            Self::Corruption { .. } => ErrorKind::Corruption,
            Self::UnknownOwner { .. }
            | Self::UnknownIdentifier { .. }
            | Self::UnknownBatch { .. }
            | Self::UnknownPublisher { .. }
            | Self::UnknownPublication { .. } => ErrorKind::NotFound,
            Self::NoCandidate { .. } => ErrorKind::NoCandidate,
            Self::IdempotencyConflict { .. } => ErrorKind::IdempotencyConflict,
        }
    }

    /// Whether the caller may retry the whole operation with backoff.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention { .. })
    }

    /// Builds a [`Error::Corruption`] and reports it at error level.
    ///
    /// Corruption is never repaired, so the one place it is constructed is
    /// also the one place it is logged.
    pub(crate) fn corruption(
        owner: OwnerId,
        batch: Option<BatchId>,
        detail: impl Into<String>,
    ) -> Self {
        let detail = detail.into();
        #[cfg(feature = "tracing")]
        tracing::error!(%owner, ?batch, %detail, "invariant violated in stored state");
        Self::Corruption {
            owner,
            batch,
            detail,
        }
    }

    pub(crate) fn invalid_range(reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        let contention = Error::Contention {
            owner: OwnerId::new(1),
            waited: Duration::from_millis(5),
        };
        assert!(contention.is_retryable());
        assert_eq!(contention.kind(), ErrorKind::Contention);

        let exhausted = Error::RangeExhausted {
            owner: OwnerId::new(1),
            requested: 3,
            available: 2,
        };
        assert!(!exhausted.is_retryable());
        assert_eq!(exhausted.kind(), ErrorKind::RangeExhausted);
    }

    #[test]
    fn lookups_share_not_found_kind() {
        let errors = [
            Error::UnknownOwner {
                owner: OwnerId::new(4),
            },
            Error::UnknownBatch {
                batch: BatchId::new(4),
            },
            Error::UnknownIdentifier {
                identifier: "1234-0006".into(),
            },
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn corruption_keeps_context() {
        let err = Error::corruption(OwnerId::new(9), Some(BatchId::new(2)), "free drifted");
        assert_eq!(
            err.to_string(),
            "corrupted state on owner 9 (batch Some(BatchId(2))): free drifted"
        );
    }
}
