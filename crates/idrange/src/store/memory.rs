use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, MutexGuard, RwLock};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    BatchId, Error, IdentifierBatch, IssuedIdentifier, Owner, OwnerId, Result, ReusePool, Store,
    StoreConfig, Transaction, validate_batch, validate_owner,
};

/// One owner row: the Range or SubRange plus its reuse pool, guarded by one
/// mutex. `None` marks a row removed after a transaction fetched its cell.
type RowCell = Arc<Mutex<Option<OwnerRow>>>;

#[derive(Clone, Debug)]
struct OwnerRow {
    owner: Owner,
    pool: ReusePool,
}

#[derive(Debug, Default)]
struct Tables {
    identifiers: HashMap<String, IssuedIdentifier>,
    batches: BTreeMap<BatchId, IdentifierBatch>,
    keys: HashMap<String, BatchId>,
}

/// A point-in-time copy of a [`MemoryStore`], for persistence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    pub owners: Vec<OwnerSnapshot>,
    pub identifiers: Vec<IssuedIdentifier>,
    pub batches: Vec<IdentifierBatch>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnerSnapshot {
    pub owner: Owner,
    pub pool: ReusePool,
}

/// An in-process [`Store`].
///
/// Each owner row sits behind its own [`parking_lot::Mutex`], so
/// transactions on different owners run in parallel. Identifier and batch
/// tables share one [`RwLock`] that is write-locked only while a commit is
/// applied.
///
/// Lock order is owner rows (ascending id), then the tables, then the owner
/// map. The owner map read lock is released before any row is locked.
///
/// # Example
///
/// ```
/// use idrange::{MemoryStore, Store};
///
/// let store = MemoryStore::default();
/// assert!(store.owners().unwrap().is_empty());
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    owners: RwLock<BTreeMap<OwnerId, RowCell>>,
    tables: RwLock<Tables>,
    next_owner: AtomicU64,
    next_batch: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            owners: RwLock::new(BTreeMap::new()),
            tables: RwLock::new(Tables::default()),
            next_owner: AtomicU64::new(1),
            next_batch: AtomicU64::new(1),
        }
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Rebuilds a store from a [`Snapshot`], checking every owner row and the
    /// references between rows, identifiers and batches.
    ///
    /// # Errors
    ///
    /// [`Error::Corruption`] for the first inconsistency found.
    pub fn from_snapshot(snapshot: Snapshot, config: StoreConfig) -> Result<Self> {
        let mut rows: BTreeMap<OwnerId, OwnerRow> = BTreeMap::new();
        for OwnerSnapshot { owner, pool } in snapshot.owners {
            validate_owner(&owner, &pool)?;
            let id = owner.id();
            if rows.insert(id, OwnerRow { owner, pool }).is_some() {
                return Err(Error::corruption(id, None, "duplicate owner row"));
            }
        }

        let mut tables = Tables::default();
        for batch in snapshot.batches {
            validate_batch(&batch)?;
            if !rows.contains_key(&batch.owner) && !batch.deleted {
                return Err(Error::corruption(
                    batch.owner,
                    Some(batch.id),
                    "batch of a missing owner",
                ));
            }
            if let Some(key) = &batch.idempotency_key {
                tables.keys.insert(key.clone(), batch.id);
            }
            tables.batches.insert(batch.id, batch);
        }

        let mut live: HashMap<OwnerId, u64> = HashMap::new();
        for row in snapshot.identifiers {
            let owner = rows
                .get(&row.owner)
                .ok_or_else(|| Error::corruption(row.owner, Some(row.batch), "identifier of a missing owner"))?;
            if !owner.owner.issues_identifiers() {
                return Err(Error::corruption(
                    row.owner,
                    Some(row.batch),
                    format!("`{}` issued by a publisher tier range", row.value),
                ));
            }
            if !tables.batches.contains_key(&row.batch) {
                return Err(Error::corruption(row.owner, Some(row.batch), "identifier of a missing batch"));
            }
            *live.entry(row.owner).or_default() += 1;
            let (owner, batch) = (row.owner, row.batch);
            if tables.identifiers.insert(row.value.clone(), row).is_some() {
                return Err(Error::corruption(owner, Some(batch), "duplicate identifier row"));
            }
        }

        let mut granted: HashMap<OwnerId, u64> = HashMap::new();
        for row in rows.values() {
            if let Owner::SubRange(sub) = &row.owner {
                match rows.get(&sub.parent).map(|p| &p.owner) {
                    Some(Owner::Range(parent)) if parent.namespace == sub.namespace => {
                        *granted.entry(parent.id).or_default() += 1;
                    }
                    _ => return Err(Error::corruption(sub.id, None, "subrange without a parent range")),
                }
            }
        }
        for (id, row) in &rows {
            let expected = if row.owner.issues_identifiers() {
                live.get(id)
            } else {
                granted.get(id)
            }
            .copied()
            .unwrap_or(0);
            let taken = row.owner.counters().taken;
            if taken != expected {
                return Err(Error::corruption(
                    *id,
                    None,
                    format!("taken {taken} but {expected} live units"),
                ));
            }
        }

        let next_owner = rows.keys().next_back().map_or(1, |id| id.get() + 1);
        let next_batch = tables.batches.keys().next_back().map_or(1, |id| id.get() + 1);
        let owners = rows
            .into_iter()
            .map(|(id, row)| (id, Arc::new(Mutex::new(Some(row)))))
            .collect();

        Ok(Self {
            config,
            owners: RwLock::new(owners),
            tables: RwLock::new(tables),
            next_owner: AtomicU64::new(next_owner),
            next_batch: AtomicU64::new(next_batch),
        })
    }

    /// Copies the whole store. Every owner row is locked while the tables
    /// are read, so the copy is consistent.
    ///
    /// # Errors
    ///
    /// [`Error::Contention`] if a row lock was not acquired in time.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let cells = self.cells();
        let guards = cells
            .iter()
            .map(|(id, cell)| self.lock(*id, cell))
            .collect::<Result<Vec<_>>>()?;
        let tables = self.tables.read();

        let mut identifiers: Vec<_> = tables.identifiers.values().cloned().collect();
        identifiers.sort_by(|a, b| (a.batch, &a.value).cmp(&(b.batch, &b.value)));

        Ok(Snapshot {
            owners: guards
                .iter()
                .filter_map(|guard| (**guard).as_ref())
                .map(|row| OwnerSnapshot {
                    owner: row.owner.clone(),
                    pool: row.pool.clone(),
                })
                .collect(),
            identifiers,
            batches: tables.batches.values().cloned().collect(),
        })
    }

    fn cells(&self) -> Vec<(OwnerId, RowCell)> {
        self.owners
            .read()
            .iter()
            .map(|(id, cell)| (*id, Arc::clone(cell)))
            .collect()
    }

    fn cell(&self, id: OwnerId) -> Result<RowCell> {
        self.owners
            .read()
            .get(&id)
            .cloned()
            .ok_or(Error::UnknownOwner { owner: id })
    }

    fn lock<'c>(
        &self,
        id: OwnerId,
        cell: &'c RowCell,
    ) -> Result<MutexGuard<'c, Option<OwnerRow>>> {
        cell.try_lock_for(self.config.lock_timeout).ok_or_else(|| {
            #[cfg(feature = "tracing")]
            tracing::warn!(owner = %id, timeout = ?self.config.lock_timeout, "owner row lock timed out");
            Error::Contention {
                owner: id,
                waited: self.config.lock_timeout,
            }
        })
    }

    fn commit(
        &self,
        tx: MemoryTransaction<'_>,
        guards: &mut [(OwnerId, MutexGuard<'_, Option<OwnerRow>>)],
    ) -> Result<()> {
        let MemoryTransaction {
            mut rows,
            created,
            removed,
            identifiers,
            batches,
            keys,
            ..
        } = tx;

        for (id, row) in &rows {
            if !removed.contains(id) {
                validate_owner(&row.owner, &row.pool)?;
            }
        }

        let mut tables = self.tables.write();
        // Rows of locked owners cannot change under us; a clash here means
        // two owners format the same value.
        for row in identifiers.values().flatten() {
            match tables.identifiers.get(&row.value) {
                Some(live) if live.owner != row.owner => {
                    return Err(Error::corruption(
                        row.owner,
                        Some(row.batch),
                        format!("`{}` is already live on owner {}", row.value, live.owner),
                    ));
                }
                _ => {}
            }
        }
        for (key, batch) in &keys {
            match tables.keys.get(key) {
                Some(bound) if bound != batch => {
                    return Err(Error::IdempotencyConflict {
                        key: key.clone(),
                        batch: *bound,
                    });
                }
                _ => {}
            }
        }

        // Nothing below can fail.
        for (value, staged) in identifiers {
            match staged {
                Some(row) => {
                    tables.identifiers.insert(value, row);
                }
                None => {
                    tables.identifiers.remove(&value);
                }
            }
        }
        tables.batches.extend(batches);
        tables.keys.extend(keys);
        drop(tables);

        for (id, guard) in guards.iter_mut() {
            let id = *id;
            **guard = if removed.contains(&id) {
                None
            } else {
                rows.remove(&id)
            };
        }
        if !created.is_empty() || !removed.is_empty() {
            let mut owners = self.owners.write();
            for id in &removed {
                owners.remove(id);
            }
            for id in created {
                if let Some(row) = rows.remove(&id) {
                    owners.insert(id, Arc::new(Mutex::new(Some(row))));
                }
            }
        }
        Ok(())
    }
}

impl Store for MemoryStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, f)))]
    fn transact<T, F>(&self, owners: &[OwnerId], f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transaction) -> Result<T>,
    {
        let mut ids = owners.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let cells = ids
            .iter()
            .map(|&id| self.cell(id).map(|cell| (id, cell)))
            .collect::<Result<Vec<_>>>()?;

        let mut guards = Vec::with_capacity(cells.len());
        for (id, cell) in &cells {
            guards.push((*id, self.lock(*id, cell)?));
        }

        let mut tx = MemoryTransaction::new(self);
        for (id, guard) in &guards {
            let row = (**guard).as_ref().ok_or(Error::UnknownOwner { owner: *id })?;
            validate_owner(&row.owner, &row.pool)?;
            tx.rows.insert(*id, row.clone());
        }

        let value = f(&mut tx)?;
        self.commit(tx, &mut guards)?;
        Ok(value)
    }

    fn owner(&self, id: OwnerId) -> Result<Owner> {
        let cell = self.cell(id)?;
        let guard = self.lock(id, &cell)?;
        let row = (*guard).as_ref().ok_or(Error::UnknownOwner { owner: id })?;
        validate_owner(&row.owner, &row.pool)?;
        Ok(row.owner.clone())
    }

    fn owners(&self) -> Result<Vec<Owner>> {
        let mut owners = Vec::new();
        for (id, cell) in self.cells() {
            let guard = self.lock(id, &cell)?;
            if let Some(row) = (*guard).as_ref() {
                owners.push(row.owner.clone());
            }
        }
        Ok(owners)
    }

    fn pool(&self, id: OwnerId) -> Result<ReusePool> {
        let cell = self.cell(id)?;
        let guard = self.lock(id, &cell)?;
        (*guard)
            .as_ref()
            .map(|row| row.pool.clone())
            .ok_or(Error::UnknownOwner { owner: id })
    }

    fn identifier(&self, value: &str) -> Option<IssuedIdentifier> {
        self.tables.read().identifiers.get(value).cloned()
    }

    fn batch(&self, id: BatchId) -> Option<IdentifierBatch> {
        self.tables.read().batches.get(&id).cloned()
    }
}

/// Staged writes of one [`MemoryStore::transact`] call.
struct MemoryTransaction<'s> {
    store: &'s MemoryStore,
    /// Working copies of locked and created rows.
    rows: BTreeMap<OwnerId, OwnerRow>,
    created: BTreeSet<OwnerId>,
    removed: BTreeSet<OwnerId>,
    /// `None` stages a removal.
    identifiers: HashMap<String, Option<IssuedIdentifier>>,
    batches: BTreeMap<BatchId, IdentifierBatch>,
    keys: HashMap<String, BatchId>,
}

impl<'s> MemoryTransaction<'s> {
    fn new(store: &'s MemoryStore) -> Self {
        Self {
            store,
            rows: BTreeMap::new(),
            created: BTreeSet::new(),
            removed: BTreeSet::new(),
            identifiers: HashMap::new(),
            batches: BTreeMap::new(),
            keys: HashMap::new(),
        }
    }

    fn row(&self, id: OwnerId) -> Result<&OwnerRow> {
        if self.removed.contains(&id) {
            return Err(Error::UnknownOwner { owner: id });
        }
        self.rows.get(&id).ok_or(Error::UnknownOwner { owner: id })
    }

    fn row_mut(&mut self, id: OwnerId) -> Result<&mut OwnerRow> {
        if self.removed.contains(&id) {
            return Err(Error::UnknownOwner { owner: id });
        }
        self.rows.get_mut(&id).ok_or(Error::UnknownOwner { owner: id })
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn owner(&self, id: OwnerId) -> Result<&Owner> {
        self.row(id).map(|row| &row.owner)
    }

    fn owner_mut(&mut self, id: OwnerId) -> Result<&mut Owner> {
        self.row_mut(id).map(|row| &mut row.owner)
    }

    fn pool(&self, id: OwnerId) -> Result<&ReusePool> {
        self.row(id).map(|row| &row.pool)
    }

    fn pool_mut(&mut self, id: OwnerId) -> Result<&mut ReusePool> {
        self.row_mut(id).map(|row| &mut row.pool)
    }

    fn next_owner_id(&mut self) -> OwnerId {
        OwnerId::new(self.store.next_owner.fetch_add(1, Ordering::Relaxed))
    }

    fn insert_owner(&mut self, owner: Owner) -> Result<()> {
        let id = owner.id();
        if self.rows.contains_key(&id) || self.store.owners.read().contains_key(&id) {
            return Err(Error::corruption(id, None, "owner id already in use"));
        }
        self.rows.insert(
            id,
            OwnerRow {
                owner,
                pool: ReusePool::new(),
            },
        );
        self.created.insert(id);
        Ok(())
    }

    fn remove_owner(&mut self, id: OwnerId) -> Result<Owner> {
        let owner = self.row(id)?.owner.clone();
        if self.created.remove(&id) {
            self.rows.remove(&id);
        } else {
            self.removed.insert(id);
        }
        Ok(owner)
    }

    fn identifier(&self, value: &str) -> Option<IssuedIdentifier> {
        match self.identifiers.get(value) {
            Some(staged) => staged.clone(),
            None => self.store.tables.read().identifiers.get(value).cloned(),
        }
    }

    fn insert_identifier(&mut self, row: IssuedIdentifier) -> Result<()> {
        if self.identifier(&row.value).is_some() {
            return Err(Error::corruption(
                row.owner,
                Some(row.batch),
                format!("`{}` is already live", row.value),
            ));
        }
        self.identifiers.insert(row.value.clone(), Some(row));
        Ok(())
    }

    fn remove_identifier(&mut self, value: &str) -> Result<IssuedIdentifier> {
        let row = self
            .identifier(value)
            .ok_or_else(|| Error::UnknownIdentifier {
                identifier: value.to_owned(),
            })?;
        let committed = self.store.tables.read().identifiers.contains_key(value);
        if committed {
            self.identifiers.insert(value.to_owned(), None);
        } else {
            self.identifiers.remove(value);
        }
        Ok(row)
    }

    fn batch(&self, id: BatchId) -> Option<IdentifierBatch> {
        self.batches
            .get(&id)
            .cloned()
            .or_else(|| self.store.tables.read().batches.get(&id).cloned())
    }

    fn next_batch_id(&mut self) -> BatchId {
        BatchId::new(self.store.next_batch.fetch_add(1, Ordering::Relaxed))
    }

    fn put_batch(&mut self, batch: IdentifierBatch) {
        if let Some(key) = &batch.idempotency_key {
            self.keys.insert(key.clone(), batch.id);
        }
        self.batches.insert(batch.id, batch);
    }

    fn batch_for_key(&self, key: &str) -> Option<BatchId> {
        self.keys
            .get(key)
            .copied()
            .or_else(|| self.store.tables.read().keys.get(key).copied())
    }
}
