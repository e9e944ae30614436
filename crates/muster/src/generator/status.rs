use crate::SnowflakeId;

/// Represents the result of a single attempt to generate a new ID.
///
/// This type models the outcome of [`LockSnowflakeGenerator::poll_id`]:
///
/// - [`IdGenStatus::Ready`] indicates a new ID was successfully generated.
/// - [`IdGenStatus::Pending`] means the sequence for the current millisecond
///   is exhausted and no ID can be produced until the clock advances.
///
/// This allows non-blocking generation loops and custom backoff strategies.
///
/// [`LockSnowflakeGenerator::poll_id`]: crate::LockSnowflakeGenerator::poll_id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGenStatus {
    /// A unique ID was generated and is ready to use.
    Ready {
        /// The generated ID.
        id: SnowflakeId,
    },
    /// The sequence has been exhausted for the current tick.
    Pending {
        /// Milliseconds to wait before trying again.
        yield_for: u64,
    },
}
