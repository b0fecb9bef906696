use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock timestamps in milliseconds since the Unix epoch.
///
/// Stamped onto batches, pool entries and reuse records. Tests plug in a
/// fixed or stepping clock.
///
/// # Example
///
/// ```
/// use idrange::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource: Send + Sync {
    fn current_millis(&self) -> u64;
}

/// Reads [`SystemTime::now`]. A clock set before 1970 reads as 0.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
