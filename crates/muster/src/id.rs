use core::{fmt, num::ParseIntError, str::FromStr, time::Duration};

/// A 64-bit Snowflake ID used to name service registrations.
///
/// - 1 bit reserved
/// - 41 bits timestamp (ms since the generator's epoch)
/// - 10 bits machine ID
/// - 12 bits sequence
///
/// ```text
///  Bit Index:  63           63 62            22 21             12 11             0
///              +--------------+----------------+-----------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | machine ID (10) | sequence (12) |
///              +--------------+----------------+-----------------+---------------+
///              |<----------- MSB ---------- 64 bits ----------- LSB ------------>|
/// ```
///
/// # Example
///
/// ```
/// use muster::SnowflakeId;
///
/// let id = SnowflakeId::from_components(1000, 2, 1);
/// assert_eq!(id.timestamp(), 1000);
/// assert_eq!(id.machine_id(), 2);
/// assert_eq!(id.sequence(), 1);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId {
    id: u64,
}

impl SnowflakeId {
    /// Bitmask for extracting the 41-bit timestamp field. Occupies bits 22
    /// through 62.
    pub const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

    /// Bitmask for extracting the 10-bit machine ID field. Occupies bits 12
    /// through 21.
    pub const MACHINE_ID_MASK: u64 = (1 << 10) - 1;

    /// Bitmask for extracting the 12-bit sequence field. Occupies bits 0
    /// through 11.
    pub const SEQUENCE_MASK: u64 = (1 << 12) - 1;

    /// Number of bits to shift the timestamp to its correct position (bit 22).
    pub const TIMESTAMP_SHIFT: u64 = 22;

    /// Number of bits to shift the machine ID to its correct position (bit 12).
    pub const MACHINE_ID_SHIFT: u64 = 12;

    /// Number of bits to shift the sequence field (bit 0).
    pub const SEQUENCE_SHIFT: u64 = 0;

    /// Constructs a new ID from its components.
    ///
    /// Overflowing components are a logic error and trip a debug assertion;
    /// release builds mask them to their field width.
    pub const fn from_components(timestamp: u64, machine_id: u64, sequence: u64) -> Self {
        debug_assert!(timestamp <= Self::TIMESTAMP_MASK, "timestamp overflow");
        debug_assert!(machine_id <= Self::MACHINE_ID_MASK, "machine_id overflow");
        debug_assert!(sequence <= Self::SEQUENCE_MASK, "sequence overflow");
        let timestamp = (timestamp & Self::TIMESTAMP_MASK) << Self::TIMESTAMP_SHIFT;
        let machine_id = (machine_id & Self::MACHINE_ID_MASK) << Self::MACHINE_ID_SHIFT;
        let sequence = (sequence & Self::SEQUENCE_MASK) << Self::SEQUENCE_SHIFT;
        Self {
            id: timestamp | machine_id | sequence,
        }
    }

    /// Wraps a raw integer without validation.
    pub const fn from_raw(raw: u64) -> Self {
        Self { id: raw }
    }

    /// Returns the raw packed integer.
    pub const fn to_raw(&self) -> u64 {
        self.id
    }

    /// Extracts the timestamp from the packed ID.
    pub const fn timestamp(&self) -> u64 {
        (self.id >> Self::TIMESTAMP_SHIFT) & Self::TIMESTAMP_MASK
    }

    /// Extracts the machine ID from the packed ID.
    pub const fn machine_id(&self) -> u64 {
        (self.id >> Self::MACHINE_ID_SHIFT) & Self::MACHINE_ID_MASK
    }

    /// Extracts the sequence number from the packed ID.
    pub const fn sequence(&self) -> u64 {
        (self.id >> Self::SEQUENCE_SHIFT) & Self::SEQUENCE_MASK
    }

    pub const fn max_timestamp() -> u64 {
        Self::TIMESTAMP_MASK
    }

    pub const fn max_machine_id() -> u64 {
        Self::MACHINE_ID_MASK
    }

    pub const fn max_sequence() -> u64 {
        Self::SEQUENCE_MASK
    }

    /// Returns true if the current sequence value can be incremented.
    pub const fn has_sequence_room(&self) -> bool {
        self.sequence() < Self::max_sequence()
    }

    /// Returns a new ID with the sequence incremented.
    pub fn increment_sequence(&self) -> Self {
        Self::from_components(self.timestamp(), self.machine_id(), self.sequence() + 1)
    }

    /// Returns a new ID for a newer timestamp with sequence reset to zero.
    pub fn rollover_to_timestamp(&self, ts: u64) -> Self {
        Self::from_components(ts, self.machine_id(), 0)
    }

    /// Splits the ID back into the fields it was packed from.
    pub const fn resolve(&self) -> ResolvedId {
        ResolvedId {
            timestamp: self.timestamp(),
            machine_id: self.machine_id(),
            sequence: self.sequence(),
        }
    }
}

/// Decodes a raw identifier minted by any generator sharing this layout.
pub const fn resolve_id(raw: u64) -> ResolvedId {
    SnowflakeId::from_raw(raw).resolve()
}

impl From<SnowflakeId> for u64 {
    fn from(id: SnowflakeId) -> Self {
        id.to_raw()
    }
}

impl FromStr for SnowflakeId {
    type Err = ParseIntError;

    /// Parses the decimal form used as a Consul service ID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self::from_raw)
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("id", &self.id)
            .field("timestamp", &self.timestamp())
            .field("machine_id", &self.machine_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// The decoded fields of a [`SnowflakeId`].
///
/// `timestamp` is relative to the epoch of the clock that minted the ID; use
/// [`ResolvedId::unix_millis`] with the same epoch to recover wall-clock time.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResolvedId {
    pub timestamp: u64,
    pub machine_id: u64,
    pub sequence: u64,
}

impl ResolvedId {
    /// Milliseconds since the Unix epoch at which the ID was minted.
    ///
    /// Saturates at `u64::MAX` for epochs too large to represent.
    pub fn unix_millis(&self, epoch: Duration) -> u64 {
        u64::try_from(epoch.as_millis())
            .unwrap_or(u64::MAX)
            .saturating_add(self.timestamp)
    }

    /// Packs the fields back into an ID.
    pub fn to_id(&self) -> SnowflakeId {
        SnowflakeId::from_components(self.timestamp, self.machine_id, self.sequence)
    }
}

impl fmt::Display for ResolvedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timestamp={} machine_id={} sequence={}",
            self.timestamp, self.machine_id, self.sequence
        )
    }
}
