use crate::{IssuedIdentifier, PublicationId, PublisherId};

/// Reports whether something outside the engine still points at an issued
/// identifier, e.g. a registered publication or a delivered barcode.
///
/// Cancellation and batch deletion are refused with
/// [`crate::Error::AlreadyUsedElsewhere`] while this returns `true`.
pub trait ReferenceGuard: Send + Sync {
    fn is_referenced(&self, identifier: &IssuedIdentifier) -> bool;
}

impl<F> ReferenceGuard for F
where
    F: Fn(&IssuedIdentifier) -> bool + Send + Sync,
{
    fn is_referenced(&self, identifier: &IssuedIdentifier) -> bool {
        self(identifier)
    }
}

/// Existence checks against the publisher registry.
pub trait PublicationLookup: Send + Sync {
    fn publisher_exists(&self, publisher: PublisherId) -> bool;

    fn publication_exists(&self, publication: PublicationId) -> bool;
}

/// A [`ReferenceGuard`] that never reports a reference.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unreferenced;

impl ReferenceGuard for Unreferenced {
    fn is_referenced(&self, _identifier: &IssuedIdentifier) -> bool {
        false
    }
}

/// A [`PublicationLookup`] that knows every id.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl PublicationLookup for AcceptAll {
    fn publisher_exists(&self, _publisher: PublisherId) -> bool {
        true
    }

    fn publication_exists(&self, _publication: PublicationId) -> bool {
        true
    }
}
