#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocator, CancelOrigin, CanceledIdentifier, Error, Namespace, Result, Store, pool::retire,
    validate_identifier,
};

impl<S: Store> Allocator<S> {
    /// Cancels one issued identifier and moves it into its owner's reuse
    /// pool, where the next issuance on that owner picks it up first.
    ///
    /// The owner's `taken` drops by one while `canceled` and `free` grow by
    /// one; the source batch's `canceled_count` grows by one.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFormat`] or [`Error::InvalidChecksum`] if the string
    ///   is not a valid identifier.
    /// - [`Error::AlreadyCanceled`] if it waits in a pool already.
    /// - [`Error::UnknownIdentifier`] if no owner issued it.
    /// - [`Error::AlreadyUsedElsewhere`] if the reference guard objects.
    /// - [`Error::Contention`] and [`Error::Corruption`] from the store.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn cancel(&self, identifier: &str, canceled_by: &str) -> Result<()> {
        let namespace = Namespace::detect(identifier).ok_or_else(|| Error::InvalidFormat {
            value: identifier.to_owned(),
            reason: "not an ISBN, ISMN or ISSN",
        })?;
        validate_identifier(identifier, namespace)?;

        let Some(row) = self.store.identifier(identifier) else {
            return Err(self.not_live(identifier));
        };
        if self.guard.is_referenced(&row) {
            return Err(Error::AlreadyUsedElsewhere {
                identifier: identifier.to_owned(),
            });
        }
        let now = self.clock.current_millis();

        self.store.transact(&[row.owner], |tx| {
            // Re-read under the lock: a concurrent cancel may have won.
            let Some(row) = tx.identifier(identifier) else {
                return Err(if tx.pool(row.owner)?.contains(identifier) {
                    Error::AlreadyCanceled {
                        identifier: identifier.to_owned(),
                    }
                } else {
                    Error::UnknownIdentifier {
                        identifier: identifier.to_owned(),
                    }
                });
            };
            tx.remove_identifier(identifier)?;
            let category = tx.owner(row.owner)?.category();
            retire(
                tx,
                CanceledIdentifier {
                    value: row.value,
                    item: row.item,
                    owner: row.owner,
                    category,
                    canceled_by: Some(canceled_by.to_owned()),
                    canceled_at: now,
                    origin: CancelOrigin::Canceled,
                    reuse: None,
                },
            )?;

            let mut batch = tx.batch(row.batch).ok_or_else(|| {
                Error::corruption(row.owner, Some(row.batch), "identifier of a missing batch")
            })?;
            batch.canceled_count += 1;
            tx.put_batch(batch);
            Ok(())
        })?;

        #[cfg(feature = "tracing")]
        tracing::debug!(%identifier, "identifier canceled");
        Ok(())
    }

    /// Explains why a well-formed identifier has no live row.
    fn not_live(&self, identifier: &str) -> Error {
        let owner = match self.locate(identifier) {
            Ok(owner) => owner,
            Err(err) => return err,
        };
        let pooled = owner.is_some_and(|owner| {
            self.store
                .pool(owner.id())
                .is_ok_and(|pool| pool.contains(identifier))
        });
        if pooled {
            Error::AlreadyCanceled {
                identifier: identifier.to_owned(),
            }
        } else {
            Error::UnknownIdentifier {
                identifier: identifier.to_owned(),
            }
        }
    }
}
