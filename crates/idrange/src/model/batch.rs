use crate::{BatchId, Namespace, OwnerId, OwnerState, PublicationId, PublicationType};

/// One issuance call: `identifier_count` identifiers for a single
/// publication, created atomically with its identifier rows.
///
/// The record outlives its identifiers; a deleted batch keeps its counts and
/// identifier list with `deleted` set.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentifierBatch {
    pub id: BatchId,
    pub namespace: Namespace,
    pub owner: OwnerId,
    pub publication: PublicationId,
    pub publication_type: Option<PublicationType>,
    pub issued_by: String,
    /// Identifiers in issuance order: reused first, then minted.
    pub identifiers: Vec<String>,
    pub identifier_count: u32,
    /// Taken from the reuse pool at issuance.
    pub canceled_used_count: u32,
    /// Cancelled one by one after issuance.
    pub canceled_count: u32,
    /// Removed by [`crate::Allocator::delete_batch`].
    pub deleted_count: u32,
    pub idempotency_key: Option<String>,
    pub created_at: u64,
    pub deleted: bool,
}

impl IdentifierBatch {
    pub fn minted_count(&self) -> u32 {
        self.identifier_count.saturating_sub(self.canceled_used_count)
    }
}

/// What [`crate::Allocator::issue_batch`] hands back.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatchResult {
    pub id: BatchId,
    pub identifiers: Vec<String>,
    pub reused_count: u32,
    pub minted_count: u32,
}

impl From<&IdentifierBatch> for BatchResult {
    fn from(batch: &IdentifierBatch) -> Self {
        Self {
            id: batch.id,
            identifiers: batch.identifiers.clone(),
            reused_count: batch.canceled_used_count,
            minted_count: batch.minted_count(),
        }
    }
}

/// Point-in-time counters of a Range or SubRange.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnerStatus {
    pub owner: OwnerId,
    pub free: u64,
    pub taken: u64,
    pub canceled: u64,
    pub deleted: u64,
    /// The cursor, zero-padded; one past the end once exhausted.
    pub next: String,
    pub state: OwnerState,
}
