use std::io;
use std::sync::Arc;

use linux_perf_event_reader::RecordType;

/// The error type used in this crate.
///
/// Errors are `Clone` so that [`RecordIter`](crate::RecordIter) can hand out
/// the failure once and still keep it around for [`RecordIter::error`](crate::RecordIter::error).
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// A field in a record payload could not be read, either because the
    /// payload was shorter than its fields or because a length field pointed
    /// past the end of the payload.
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),

    #[error("The stream ended after {available} bytes of an 8-byte record header")]
    TruncatedHeader { available: usize },

    #[error("The {record_type:?} record declares {expected} payload bytes, but only {available} were available")]
    TruncatedRecord {
        record_type: RecordType,
        expected: usize,
        available: usize,
    },

    #[error("The specified size {0} in the perf event header was smaller than the header itself")]
    InvalidRecordSize(u16),

    #[error("The record refers to an unknown event attribute ID {0}")]
    UnknownAttributeId(u64),

    #[error("Did not recognize magic value {0:?}")]
    UnrecognizedMagicValue([u8; 8]),

    #[error("Section size did not fit into usize")]
    SectionSizeTooBig,

    #[error("The attr size in the file header is invalid")]
    InvalidAttrSize,

    #[error("The file does not describe any event attributes")]
    NoAttributes,

    #[error("Event attribute {0} has no ID or IDENTIFIER in its sample format, but there are multiple events")]
    NoIdentifierDespiteMultiEvent(usize),

    #[error("Event attribute {0} stores its sample ID at a different offset than the first attribute")]
    InconsistentIdOffset(usize),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

/// This error indicates that a record payload was not large enough to
/// read the respective item.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("Needed {needed} bytes at payload offset {offset}, but only {available} remain")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("The string at payload offset {offset} is not NUL-terminated")]
    UnterminatedString { offset: usize },

    #[error("Length field at payload offset {offset} announces {count} items of {elem_size} bytes, but only {available} bytes remain")]
    LengthTooLarge {
        offset: usize,
        count: u64,
        elem_size: usize,
        available: usize,
    },
}
