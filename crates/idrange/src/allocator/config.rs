/// Largest batch accepted unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 1_000;

/// Limits enforced by [`crate::Allocator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Upper bound on `count` in one [`crate::Allocator::issue_batch`] call.
    pub max_batch_size: u32,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}
