use core::time::Duration;

/// Default bound on waiting for an owner row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Tuning for [`crate::MemoryStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long a transaction waits for each owner row before giving up with
    /// [`crate::Error::Contention`].
    pub lock_timeout: Duration,
}

impl StoreConfig {
    pub const fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { lock_timeout }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}
