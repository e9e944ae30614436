/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `muster` can emit.
///
/// None of these are retried internally. Whether to wait and try again (for
/// example after a clock step) is the caller's decision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The clock reported a time earlier than the timestamp of the last
    /// issued ID.
    ///
    /// Issuing an ID now could duplicate or reorder previously issued IDs.
    #[error("clock moved backwards: last issued timestamp {last}, now {now}")]
    ClockRegression {
        /// Timestamp of the last issued ID, in ms since the epoch.
        last: u64,
        /// Timestamp just read from the clock, in ms since the epoch.
        now: u64,
    },

    /// The wall clock reads earlier than the generator's epoch.
    ///
    /// No valid timestamp exists until the clock passes the epoch, so no ID
    /// can be issued.
    #[error("clock reads {now} ms since the Unix epoch, before the configured epoch {epoch}")]
    ClockBeforeEpoch {
        /// Wall clock, in ms since 1970-01-01 UTC.
        now: u64,
        /// Configured epoch, in ms since 1970-01-01 UTC.
        epoch: u64,
    },

    /// The machine ID does not fit the 10-bit machine field.
    #[error("machine id {machine_id} out of range (max = {max})")]
    MachineIdOutOfRange { machine_id: u64, max: u64 },

    /// The clock reading does not fit the 41-bit timestamp field.
    #[error("timestamp {now} exceeds the layout maximum {max}")]
    TimestampOverflow { now: u64, max: u64 },
}
