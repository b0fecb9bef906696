use crate::{BatchId, IdentifierBatch, IssuedIdentifier, Owner, OwnerId, Result, ReusePool};

/// Persistent state behind the [`crate::Allocator`].
///
/// All mutation goes through [`Store::transact`]. Reads outside a
/// transaction return owned copies and may be stale by the time they are
/// used; the allocator re-checks everything it relies on once the owner row
/// is locked.
pub trait Store: Send + Sync {
    /// Runs `f` with the rows of `owners` locked.
    ///
    /// Rows are locked in ascending id order, each with a bounded wait. The
    /// closure works on private copies; its writes become visible only if it
    /// returns `Ok`, all at once. On `Err` nothing is written.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Contention`] if a row lock was not acquired in time.
    /// - [`crate::Error::UnknownOwner`] if a listed owner does not exist.
    /// - [`crate::Error::Corruption`] if a locked row fails validation on
    ///   read, or the closure's result fails it on commit.
    /// - Whatever `f` returns.
    fn transact<T, F>(&self, owners: &[OwnerId], f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>;

    /// Reads and validates one owner row.
    fn owner(&self, id: OwnerId) -> Result<Owner>;

    /// All owners in id order. Waits on each row lock like a transaction
    /// does.
    fn owners(&self) -> Result<Vec<Owner>>;

    fn pool(&self, id: OwnerId) -> Result<ReusePool>;

    fn identifier(&self, value: &str) -> Option<IssuedIdentifier>;

    fn batch(&self, id: BatchId) -> Option<IdentifierBatch>;
}

/// The view of the store inside [`Store::transact`].
///
/// Owner and pool accessors reach only the rows the transaction locked plus
/// owners it created.
pub trait Transaction {
    fn owner(&self, id: OwnerId) -> Result<&Owner>;

    fn owner_mut(&mut self, id: OwnerId) -> Result<&mut Owner>;

    fn pool(&self, id: OwnerId) -> Result<&ReusePool>;

    fn pool_mut(&mut self, id: OwnerId) -> Result<&mut ReusePool>;

    /// Reserves a fresh owner id. Ids are never reused; a rolled back
    /// reservation leaves a gap.
    fn next_owner_id(&mut self) -> OwnerId;

    /// Stages a new owner row with an empty pool. The row is locked by this
    /// transaction until commit.
    fn insert_owner(&mut self, owner: Owner) -> Result<()>;

    /// Stages removal of a locked owner row together with its pool.
    fn remove_owner(&mut self, id: OwnerId) -> Result<Owner>;

    fn identifier(&self, value: &str) -> Option<IssuedIdentifier>;

    /// Stages a new identifier row.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Corruption`] if the value is already live.
    fn insert_identifier(&mut self, row: IssuedIdentifier) -> Result<()>;

    /// Stages removal of a live identifier row.
    fn remove_identifier(&mut self, value: &str) -> Result<IssuedIdentifier>;

    fn batch(&self, id: BatchId) -> Option<IdentifierBatch>;

    /// Reserves a fresh batch id.
    fn next_batch_id(&mut self) -> BatchId;

    /// Stages an insert or update of a batch record.
    fn put_batch(&mut self, batch: IdentifierBatch);

    /// The batch an idempotency key is bound to, committed or staged.
    fn batch_for_key(&self, key: &str) -> Option<BatchId>;

    /// Live identifier rows of `batch`, in issuance order.
    fn batch_identifiers(&self, batch: &IdentifierBatch) -> Vec<IssuedIdentifier> {
        batch
            .identifiers
            .iter()
            .filter_map(|value| self.identifier(value))
            .filter(|row| row.batch == batch.id)
            .collect()
    }
}
