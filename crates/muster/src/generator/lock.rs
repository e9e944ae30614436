use core::cmp::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, IdGenStatus, Result, SnowflakeId, TimeSource};

/// A lock-based Snowflake ID generator suitable for multi-threaded
/// environments.
///
/// The last issued ID (which carries both the last timestamp and the
/// sequence) lives behind a single [`Mutex`]. Every call reads the clock and
/// performs its read-modify-write inside that one critical section, so IDs
/// from one generator are strictly increasing in the order callers acquire
/// the lock.
///
/// Cloning the generator yields another handle onto the same state. This is
/// how a single process-wide generator is shared between consumers.
///
/// ## Clock behaviour
/// - Clock moved forward: sequence resets to zero.
/// - Same millisecond: sequence increments; once all 4096 values are used the
///   generator reports [`IdGenStatus::Pending`] until the next millisecond.
/// - Clock moved backwards: [`Error::ClockRegression`].
/// - Clock earlier than its epoch: the source's error, such as
///   [`Error::ClockBeforeEpoch`].
pub struct LockSnowflakeGenerator<T>
where
    T: TimeSource,
{
    pub(crate) state: Arc<Mutex<SnowflakeId>>,
    pub(crate) time: T,
}

impl<T> Clone for LockSnowflakeGenerator<T>
where
    T: TimeSource + Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            time: self.time.clone(),
        }
    }
}

impl<T> LockSnowflakeGenerator<T>
where
    T: TimeSource,
{
    /// Creates a new [`LockSnowflakeGenerator`] for the given machine ID.
    ///
    /// The initial timestamp and sequence are zero; the first call against a
    /// real clock rolls over to the current time.
    ///
    /// # Parameters
    ///
    /// - `machine_id`: A unique identifier for the node or instance generating
    ///   IDs, in `0..=1023`. Uniqueness across running instances is the
    ///   deployment's responsibility.
    /// - `time`: A [`TimeSource`] implementation (e.g., [`SystemClock`]) that
    ///   determines how timestamps are generated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MachineIdOutOfRange`] if `machine_id` does not fit the
    /// 10-bit field.
    ///
    /// # Example
    /// ```
    /// use muster::{LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(0, SystemClock::default()).unwrap();
    /// let a = generator.next_id().unwrap();
    /// let b = generator.next_id().unwrap();
    /// assert!(a < b);
    /// ```
    ///
    /// [`SystemClock`]: crate::SystemClock
    pub fn new(machine_id: u64, time: T) -> Result<Self> {
        Self::from_components(0, machine_id, 0, time)
    }

    /// Creates a new generator from explicit component values.
    ///
    /// Primarily useful in tests, or to resume after a known last-issued ID.
    /// In typical use cases, prefer [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::MachineIdOutOfRange`] or [`Error::TimestampOverflow`]
    /// if a component does not fit its field.
    pub fn from_components(
        timestamp: u64,
        machine_id: u64,
        sequence: u64,
        time: T,
    ) -> Result<Self> {
        if machine_id > SnowflakeId::max_machine_id() {
            return Err(Error::MachineIdOutOfRange {
                machine_id,
                max: SnowflakeId::max_machine_id(),
            });
        }
        if timestamp > SnowflakeId::max_timestamp() {
            return Err(Error::TimestampOverflow {
                now: timestamp,
                max: SnowflakeId::max_timestamp(),
            });
        }
        let sequence = sequence.min(SnowflakeId::max_sequence());
        let id = SnowflakeId::from_components(timestamp, machine_id, sequence);
        Ok(Self {
            state: Arc::new(Mutex::new(id)),
            time,
        })
    }

    /// The machine ID embedded in every ID from this generator.
    pub fn machine_id(&self) -> u64 {
        self.state.lock().machine_id()
    }

    /// Generates the next ID, waiting out an exhausted sequence.
    ///
    /// When all 4096 sequence values of the current millisecond are used,
    /// this yields the thread until the clock ticks over and then issues the
    /// first ID of the new millisecond. The wait is at most about one
    /// millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClockRegression`] if the clock moved backwards,
    /// [`Error::ClockBeforeEpoch`] if it reads earlier than its epoch, or
    /// [`Error::TimestampOverflow`] if the clock has run past the layout.
    pub fn next_id(&self) -> Result<SnowflakeId> {
        loop {
            match self.poll_id()? {
                IdGenStatus::Ready { id } => break Ok(id),
                IdGenStatus::Pending { .. } => std::thread::yield_now(),
            }
        }
    }

    /// Makes one attempt to generate the next ID without waiting.
    ///
    /// # Returns
    /// - `Ok(IdGenStatus::Ready { id })`: A new ID is available
    /// - `Ok(IdGenStatus::Pending { yield_for })`: The time to wait (in
    ///   milliseconds) before trying again
    ///
    /// # Errors
    /// - [`Error::ClockRegression`] if the clock reads earlier than the last
    ///   issued timestamp
    /// - [`Error::ClockBeforeEpoch`] if the clock reads earlier than its
    ///   epoch
    /// - [`Error::TimestampOverflow`] if the clock reading does not fit in 41
    ///   bits
    ///
    /// # Example
    /// ```
    /// use muster::{IdGenStatus, LockSnowflakeGenerator, SystemClock};
    ///
    /// let generator = LockSnowflakeGenerator::new(0, SystemClock::default()).unwrap();
    ///
    /// let id = loop {
    ///     match generator.poll_id() {
    ///         Ok(IdGenStatus::Ready { id }) => break id,
    ///         Ok(IdGenStatus::Pending { yield_for }) => {
    ///             std::thread::sleep(core::time::Duration::from_millis(yield_for));
    ///         }
    ///         Err(e) => panic!("Generator error: {}", e),
    ///     }
    /// };
    /// assert_eq!(id.machine_id(), 0);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn poll_id(&self) -> Result<IdGenStatus> {
        let mut id = self.state.lock();

        // Read under the lock: a reading taken before acquiring it may be
        // older than one a concurrent caller already committed.
        let now = self.time.checked_millis()?;
        if now > SnowflakeId::max_timestamp() {
            return Err(Self::cold_timestamp_overflow(now));
        }

        let current_ts = id.timestamp();
        match now.cmp(&current_ts) {
            Ordering::Equal => {
                if id.has_sequence_room() {
                    *id = id.increment_sequence();
                    Ok(IdGenStatus::Ready { id: *id })
                } else {
                    Ok(IdGenStatus::Pending { yield_for: 1 })
                }
            }
            Ordering::Greater => {
                *id = id.rollover_to_timestamp(now);
                Ok(IdGenStatus::Ready { id: *id })
            }
            Ordering::Less => Err(Self::cold_clock_behind(now, current_ts)),
        }
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last: u64) -> Error {
        #[cfg(feature = "tracing")]
        tracing::warn!(last, now, "clock moved backwards");
        Error::ClockRegression { last, now }
    }

    #[cold]
    #[inline(never)]
    fn cold_timestamp_overflow(now: u64) -> Error {
        Error::TimestampOverflow {
            now,
            max: SnowflakeId::max_timestamp(),
        }
    }
}
