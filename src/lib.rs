//! A decoder for the event records in the data section of perf.data files.
//!
//! The data section is a sequence of variable-length records, each one
//! starting with an 8-byte header (kind, misc flags and total size). The
//! layout of `SAMPLE` records depends on the `perf_event_attr` of the event
//! which produced them, so decoding needs an [`AttributeTable`]. The table
//! maps event IDs to attributes and knows where the ID sits inside a sample.
//!
//! [`RecordIter`] reads records from any [`std::io::Read`] and hands out
//! [`Record`] views that borrow the iterator's reusable storage.
//! [`PerfFile`] finds the attributes and the data section of a complete
//! perf.data file.
//!
//! # Example
//!
//! ```no_run
//! use perf_record_decoder::{PerfFile, Record};
//!
//! # fn wrapper() -> Result<(), perf_record_decoder::Error> {
//! let file = std::fs::File::open("perf.data")?;
//! let mut perf_file = PerfFile::parse(std::io::BufReader::new(file))?;
//! let event_names: Vec<_> = perf_file
//!     .attributes()
//!     .attributes()
//!     .iter()
//!     .filter_map(|attr| attr.name())
//!     .collect();
//! println!("perf events: {}", event_names.join(", "));
//!
//! let mut records = perf_file.records()?;
//! while let Some(record) = records.next_record()? {
//!     match record {
//!         Record::Sample(sample) => {
//!             println!("sample for event {}: {:#x}", sample.attr_index, sample.ip);
//!         }
//!         other => println!("{:?}", other.record_type()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod attr;
mod cursor;
mod data_src;
mod error;
mod feature_sections;
mod features;
mod header;
mod perf_file;
mod read_exact;
mod record_header;
mod record_iter;
mod records;
mod sample;

/// This is a re-export of the linux-perf-event-reader crate. We use its types
/// in our public API.
pub use linux_perf_event_reader;

pub use linux_perf_event_reader::{Endianness, ReadFormat, RecordType, SampleFormat};

pub use attr::{AttributeTable, EventAttr};
pub use cursor::ByteCursor;
pub use data_src::{DataSrc, DataSrcLevel, DataSrcLock, DataSrcOp, DataSrcSnoop, DataSrcTlb};
pub use error::{Error, ReadError};
pub use feature_sections::HeaderString;
pub use features::{Feature, FeatureSet, FeatureSetIter};
pub use header::{PerfFileSection, PerfHeader};
pub use perf_file::PerfFile;
pub use record_header::RecordHeader;
pub use record_iter::RecordIter;
pub use records::{
    BranchEntry, CommRecord, CpuMode, ForkOrExitRecord, LostRecord, Mmap2Fields, MmapRecord,
    Record, RegsAbi, SampleRead, SampleRecord, ThrottleRecord, Transaction,
    PERF_RECORD_MISC_COMM_EXEC, PERF_RECORD_MISC_CPUMODE_MASK, PERF_RECORD_MISC_EXACT_IP,
    PERF_RECORD_MISC_MMAP_DATA,
};
