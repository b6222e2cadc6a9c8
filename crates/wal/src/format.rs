//! Constants and record types shared by the log reader and writer.

/// Size of one physical block.
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Header is checksum (4 bytes), length (2 bytes), type (1 byte).
pub const HEADER_SIZE: usize = 4 + 2 + 1;

/// Largest payload a single physical record can carry.
pub const MAX_FRAGMENT_LEN: usize = BLOCK_SIZE - HEADER_SIZE;

/// Physical record type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordType {
    /// Reserved for pre-allocated, zero-filled file regions.
    Zero = 0,
    /// The whole logical record.
    Full = 1,
    /// First fragment of a logical record.
    First = 2,
    /// Interior fragment.
    Middle = 3,
    /// Final fragment.
    Last = 4,
}

impl RecordType {
    /// Highest valid type tag.
    pub const MAX: u8 = RecordType::Last as u8;

    /// All tags a checksum may be precomputed for, indexed by value.
    pub(crate) const ALL: [RecordType; 5] = [
        RecordType::Zero,
        RecordType::Full,
        RecordType::First,
        RecordType::Middle,
        RecordType::Last,
    ];
}

impl TryFrom<u8> for RecordType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordType::Zero),
            1 => Ok(RecordType::Full),
            2 => Ok(RecordType::First),
            3 => Ok(RecordType::Middle),
            4 => Ok(RecordType::Last),
            other => Err(other),
        }
    }
}
