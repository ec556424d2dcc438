use std::io::Read;

use byteorder::ByteOrder;
use linux_perf_event_reader::RecordType;

use crate::read_exact::ReadExactOrUntilEof;
use crate::Error;

/// `perf_event_header`
///
/// Every record in the data stream starts with this header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// The record kind.
    pub record_type: RecordType,
    /// Kind-specific flag bits (`PERF_RECORD_MISC_*`).
    pub misc: u16,
    /// The size of the record in bytes, including this header.
    pub size: u16,
}

impl RecordHeader {
    pub const SIZE: usize = 4 + 2 + 2;

    /// Decodes a header from its 8 bytes.
    pub fn parse<T: ByteOrder>(bytes: &[u8; RecordHeader::SIZE]) -> Self {
        Self {
            record_type: RecordType(T::read_u32(&bytes[0..4])),
            misc: T::read_u16(&bytes[4..6]),
            size: T::read_u16(&bytes[6..8]),
        }
    }

    /// Reads the next header from `reader`.
    ///
    /// Returns `Ok(None)` if the reader is at EOF before the first byte of the
    /// header, and [`Error::TruncatedHeader`] if it ends in the middle of it.
    pub fn read<R: Read, T: ByteOrder>(mut reader: R) -> Result<Option<Self>, Error> {
        let mut bytes = [0; RecordHeader::SIZE];
        match reader.read_exact_or_until_eof(&mut bytes)? {
            0 => Ok(None),
            Self::SIZE => Ok(Some(Self::parse::<T>(&bytes))),
            available => Err(Error::TruncatedHeader { available }),
        }
    }

    /// The number of bytes following the header.
    pub fn payload_len(&self) -> Result<usize, Error> {
        (self.size as usize)
            .checked_sub(Self::SIZE)
            .ok_or(Error::InvalidRecordSize(self.size))
    }
}
