use std::collections::HashSet;
use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use linux_perf_event_reader::{Endianness, RecordType};

use crate::attr::AttributeTable;
use crate::cursor::ByteCursor;
use crate::read_exact::ReadExactOrUntilEof;
use crate::record_header::RecordHeader;
use crate::records::{
    CommRecord, ForkOrExitRecord, LostRecord, MmapRecord, Record, SampleRecord, ThrottleRecord,
};
use crate::Error;

/// An iterator over the records of a perf.data event stream.
///
/// Each call to [`next_record`](Self::next_record) reads one record from the
/// underlying reader and decodes it into storage owned by the iterator. The
/// returned [`Record`] borrows that storage, so it has to be dropped (or
/// cloned) before the next call.
///
/// The first error ends the iteration: it is returned once, and every later
/// call returns `Ok(None)` without reading. The error stays available through
/// [`error`](Self::error).
pub struct RecordIter<'t, R: Read> {
    reader: R,
    endian: Endianness,
    attributes: &'t AttributeTable,
    /// The payload of the current record. Grown as needed, never shrunk.
    buffer: Vec<u8>,
    scratch: Scratch,
    error: Option<Error>,
    reported_unknown_types: HashSet<u32>,
}

/// Per-kind record storage, overwritten in place by every decode.
#[derive(Debug, Default)]
struct Scratch {
    mmap: MmapRecord,
    comm: CommRecord,
    sample: SampleRecord,
}

/// Which record the last decode produced. The borrowed kinds live in `Scratch`.
#[derive(Debug, Clone, Copy)]
enum Decoded {
    Mmap,
    Lost(LostRecord),
    Comm,
    Exit(ForkOrExitRecord),
    Fork(ForkOrExitRecord),
    Throttle(ThrottleRecord),
    Sample,
    Unknown(RecordHeader),
}

impl<'t, R: Read> RecordIter<'t, R> {
    /// Creates an iterator over the records in `reader`, which must be
    /// positioned at the start of the first record header. Reaching EOF at a
    /// record boundary ends the stream.
    pub fn new(reader: R, endian: Endianness, attributes: &'t AttributeTable) -> Self {
        Self {
            reader,
            endian,
            attributes,
            buffer: Vec::new(),
            scratch: Scratch::default(),
            error: None,
            reported_unknown_types: HashSet::new(),
        }
    }

    /// The byte order of the stream.
    pub fn endian(&self) -> Endianness {
        self.endian
    }

    pub fn attributes(&self) -> &'t AttributeTable {
        self.attributes
    }

    /// The error which ended the iteration, if any.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Reads and decodes the next record.
    ///
    /// Returns `Ok(None)` at the end of the stream, and after an error has
    /// been returned.
    pub fn next_record(&mut self) -> Result<Option<Record<'_>>, Error> {
        if self.error.is_some() {
            return Ok(None);
        }
        let result = match self.endian {
            Endianness::LittleEndian => self.decode_next::<LittleEndian>(),
            Endianness::BigEndian => self.decode_next::<BigEndian>(),
        };
        match result {
            Ok(Some(decoded)) => Ok(Some(self.view(decoded))),
            Ok(None) => Ok(None),
            Err(e) => {
                log::warn!("Stopping record iteration: {e}");
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn decode_next<T: ByteOrder>(&mut self) -> Result<Option<Decoded>, Error> {
        let header = match RecordHeader::read::<_, T>(&mut self.reader)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let payload_len = header.payload_len()?;
        self.buffer.resize(payload_len, 0);
        let available = self.reader.read_exact_or_until_eof(&mut self.buffer)?;
        if available < payload_len {
            return Err(Error::TruncatedRecord {
                record_type: header.record_type,
                expected: payload_len,
                available,
            });
        }

        let attributes = self.attributes;
        let Self {
            buffer,
            scratch,
            reported_unknown_types,
            ..
        } = self;
        let mut cur = ByteCursor::<T>::new(&buffer[..]);

        let decoded = match header.record_type {
            RecordType::MMAP => {
                scratch.mmap.decode_into(&mut cur, header.misc, false)?;
                Decoded::Mmap
            }
            RecordType::MMAP2 => {
                scratch.mmap.decode_into(&mut cur, header.misc, true)?;
                Decoded::Mmap
            }
            RecordType::LOST => Decoded::Lost(LostRecord::decode(&mut cur, attributes)?),
            RecordType::COMM => {
                scratch.comm.decode_into(&mut cur, header.misc)?;
                Decoded::Comm
            }
            RecordType::EXIT => Decoded::Exit(ForkOrExitRecord::decode(&mut cur)?),
            RecordType::FORK => Decoded::Fork(ForkOrExitRecord::decode(&mut cur)?),
            RecordType::THROTTLE => {
                Decoded::Throttle(ThrottleRecord::decode(&mut cur, attributes, true)?)
            }
            RecordType::UNTHROTTLE => {
                Decoded::Throttle(ThrottleRecord::decode(&mut cur, attributes, false)?)
            }
            RecordType::SAMPLE => {
                scratch
                    .sample
                    .decode_into::<T>(&buffer[..], header.misc, attributes)?;
                Decoded::Sample
            }
            // READ records only exist in the mmap ring buffer, never on disk.
            other => {
                if reported_unknown_types.insert(other.0) {
                    log::debug!("Passing through records of unknown type {other:?}");
                }
                Decoded::Unknown(header)
            }
        };
        Ok(Some(decoded))
    }

    fn view(&self, decoded: Decoded) -> Record<'_> {
        match decoded {
            Decoded::Mmap => Record::Mmap(&self.scratch.mmap),
            Decoded::Lost(r) => Record::Lost(r),
            Decoded::Comm => Record::Comm(&self.scratch.comm),
            Decoded::Exit(r) => Record::Exit(r),
            Decoded::Fork(r) => Record::Fork(r),
            Decoded::Throttle(r) => Record::Throttle(r),
            Decoded::Sample => Record::Sample(&self.scratch.sample),
            Decoded::Unknown(header) => Record::Unknown(header),
        }
    }
}

#[cfg(test)]
mod test {
    use byteorder::{BigEndian, ByteOrder, LittleEndian};
    use linux_perf_event_reader::{Endianness, ReadFormat, RecordType, SampleFormat};

    use super::RecordIter;
    use crate::attr::{AttributeTable, EventAttr};
    use crate::records::{ForkOrExitRecord, Record};
    use crate::{Error, ReadError, RecordHeader};

    fn push_record<T: ByteOrder>(out: &mut Vec<u8>, record_type: RecordType, misc: u16, payload: &[u8]) {
        let mut header = [0; 8];
        T::write_u32(&mut header[0..4], record_type.0);
        T::write_u16(&mut header[4..6], misc);
        T::write_u16(&mut header[6..8], (8 + payload.len()) as u16);
        out.extend_from_slice(&header);
        out.extend_from_slice(payload);
    }

    fn sample_table() -> AttributeTable {
        let attr = EventAttr {
            event_ids: vec![1],
            ..EventAttr::new(SampleFormat::IP | SampleFormat::CALLCHAIN, ReadFormat::empty())
        };
        AttributeTable::new(vec![attr]).unwrap()
    }

    fn sample_payload(ip: u64, callchain: &[u64]) -> Vec<u8> {
        let mut values = vec![ip, callchain.len() as u64];
        values.extend_from_slice(callchain);
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn fork_payload() -> Vec<u8> {
        let mut data = Vec::new();
        for v in [2i32, 1, 2, 1] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&55u64.to_le_bytes());
        data
    }

    #[test]
    fn iterates_mixed_records() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());
        push_record::<LittleEndian>(&mut stream, RecordType::SAMPLE, 2, &sample_payload(0x400, &[1, 2, 3]));
        push_record::<LittleEndian>(&mut stream, RecordType::EXIT, 0, &fork_payload());

        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        let fork = ForkOrExitRecord {
            pid: 2,
            ppid: 1,
            tid: 2,
            ptid: 1,
            timestamp: 55,
        };
        assert_eq!(iter.next_record().unwrap(), Some(Record::Fork(fork)));
        match iter.next_record().unwrap() {
            Some(Record::Sample(sample)) => {
                assert_eq!(sample.ip, 0x400);
                assert_eq!(sample.callchain, vec![1, 2, 3]);
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(iter.next_record().unwrap(), Some(Record::Exit(fork)));
        assert!(iter.next_record().unwrap().is_none());
        assert!(iter.error().is_none());
    }

    fn mmap_payload(mmap2: bool) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&7i32.to_le_bytes());
        data.extend_from_slice(&8i32.to_le_bytes());
        for v in [0x7f00_0000_0000u64, 0x2000, 0x1000] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        if mmap2 {
            data.extend_from_slice(&8u32.to_le_bytes());
            data.extend_from_slice(&1u32.to_le_bytes());
            data.extend_from_slice(&4242u64.to_le_bytes());
            data.extend_from_slice(&3u64.to_le_bytes());
            data.extend_from_slice(&5u32.to_le_bytes());
            data.extend_from_slice(&2u32.to_le_bytes());
        }
        data.extend_from_slice(b"libc.so\0");
        data
    }

    #[test]
    fn mmap_and_mmap2_are_told_apart() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::MMAP, 0, &mmap_payload(false));
        push_record::<LittleEndian>(&mut stream, RecordType::MMAP2, 0, &mmap_payload(true));
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());

        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        let record = iter.next_record().unwrap().unwrap();
        assert_eq!(record.record_type(), RecordType::MMAP);
        match record {
            Record::Mmap(mmap) => {
                assert_eq!(mmap.mmap2, None);
                assert_eq!(mmap.address, 0x7f00_0000_0000);
                assert_eq!(mmap.filename, b"libc.so");
            }
            other => panic!("unexpected record {other:?}"),
        }
        let record = iter.next_record().unwrap().unwrap();
        assert_eq!(record.record_type(), RecordType::MMAP2);
        match record {
            Record::Mmap(mmap) => {
                let fields = mmap.mmap2.expect("MMAP2 fields");
                assert_eq!((fields.major, fields.minor), (8, 1));
                assert_eq!(fields.inode, 4242);
                assert_eq!(fields.protection, 5);
                assert_eq!(mmap.page_offset, 0x1000);
                assert_eq!(mmap.filename, b"libc.so");
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert!(matches!(iter.next_record().unwrap(), Some(Record::Fork(_))));
        assert!(iter.next_record().unwrap().is_none());
    }

    #[test]
    fn unknown_type_with_empty_payload() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType(1234), 0x10, &[]);
        push_record::<LittleEndian>(&mut stream, RecordType::EXIT, 0, &fork_payload());

        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        assert_eq!(
            iter.next_record().unwrap(),
            Some(Record::Unknown(RecordHeader {
                record_type: RecordType(1234),
                misc: 0x10,
                size: 8,
            }))
        );
        // The following record starts right after the 8 header bytes.
        assert!(matches!(iter.next_record().unwrap(), Some(Record::Exit(_))));
    }

    #[test]
    fn unknown_type_payload_is_skipped() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::READ, 0, &[0xee; 24]);
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        let first = iter.next_record().unwrap().map(|r| r.record_type());
        assert_eq!(first, Some(RecordType::READ));
        assert!(matches!(iter.next_record().unwrap(), Some(Record::Fork(_))));
    }

    #[test]
    fn throttle_and_unthrottle() {
        let table = sample_table();
        let payload: Vec<u8> = [10u64, 1, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::THROTTLE, 0, &payload);
        push_record::<LittleEndian>(&mut stream, RecordType::UNTHROTTLE, 0, &payload);
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        match iter.next_record().unwrap() {
            Some(Record::Throttle(t)) => assert!(t.enable),
            other => panic!("unexpected record {other:?}"),
        }
        match iter.next_record().unwrap() {
            Some(Record::Throttle(t)) => {
                assert!(!t.enable);
                assert_eq!(t.timestamp, 10);
                assert_eq!(t.stream_id, 4);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn truncated_record_is_sticky() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());
        stream.truncate(stream.len() - 5);

        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        let err = iter.next_record().unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedRecord {
                expected: 24,
                available: 19,
                ..
            }
        ));
        let stored = format!("{:?}", iter.error().unwrap());
        assert!(iter.next_record().unwrap().is_none());
        assert_eq!(format!("{:?}", iter.error().unwrap()), stored);
        assert!(iter.next_record().unwrap().is_none());
        assert_eq!(format!("{:?}", iter.error().unwrap()), stored);
    }

    #[test]
    fn truncated_header_is_an_error() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());
        stream.extend_from_slice(&[1, 0, 0, 0]);
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        assert!(iter.next_record().unwrap().is_some());
        assert!(matches!(
            iter.next_record(),
            Err(Error::TruncatedHeader { available: 4 })
        ));
        assert!(iter.next_record().unwrap().is_none());
    }

    #[test]
    fn unknown_attribute_stops_iteration() {
        let table = sample_table();
        let payload: Vec<u8> = [99u64, 1].iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::LOST, 0, &payload);
        push_record::<LittleEndian>(&mut stream, RecordType::FORK, 0, &fork_payload());
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        assert!(matches!(
            iter.next_record(),
            Err(Error::UnknownAttributeId(99))
        ));
        assert!(iter.next_record().unwrap().is_none());
        assert!(matches!(
            iter.error(),
            Some(Error::UnknownAttributeId(99))
        ));
    }

    #[test]
    fn short_payload_for_its_kind_is_an_error() {
        let table = sample_table();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::EXIT, 0, &[0; 8]);
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        assert!(matches!(
            iter.next_record(),
            Err(Error::Read(ReadError::OutOfBounds { .. }))
        ));
    }

    #[test]
    fn callchain_storage_is_reused_without_stale_entries() {
        let table = sample_table();
        let long: Vec<u64> = (0..10).collect();
        let mut stream = Vec::new();
        push_record::<LittleEndian>(&mut stream, RecordType::SAMPLE, 0, &sample_payload(1, &long));
        push_record::<LittleEndian>(&mut stream, RecordType::SAMPLE, 0, &sample_payload(2, &[5, 6]));
        let mut iter = RecordIter::new(&stream[..], Endianness::LittleEndian, &table);
        match iter.next_record().unwrap() {
            Some(Record::Sample(s)) => assert_eq!(s.callchain.len(), 10),
            other => panic!("unexpected record {other:?}"),
        }
        match iter.next_record().unwrap() {
            Some(Record::Sample(s)) => assert_eq!(s.callchain, vec![5, 6]),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn big_endian_stream() {
        let table = sample_table();
        let mut payload = Vec::new();
        for v in [2i32, 1, 2, 1] {
            payload.extend_from_slice(&v.to_be_bytes());
        }
        payload.extend_from_slice(&55u64.to_be_bytes());
        let mut stream = Vec::new();
        push_record::<BigEndian>(&mut stream, RecordType::FORK, 0, &payload);
        let mut iter = RecordIter::new(&stream[..], Endianness::BigEndian, &table);
        match iter.next_record().unwrap() {
            Some(Record::Fork(f)) => {
                assert_eq!(f.pid, 2);
                assert_eq!(f.timestamp, 55);
            }
            other => panic!("unexpected record {other:?}"),
        }
    }
}
