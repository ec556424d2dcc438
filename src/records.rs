use bitflags::bitflags;
use byteorder::ByteOrder;
use linux_perf_event_reader::RecordType;

use crate::attr::AttributeTable;
use crate::cursor::ByteCursor;
use crate::data_src::DataSrc;
use crate::record_header::RecordHeader;
use crate::Error;

/// `PERF_RECORD_MISC_CPUMODE_MASK`
pub const PERF_RECORD_MISC_CPUMODE_MASK: u16 = 0x7;
/// `PERF_RECORD_MISC_MMAP_DATA`, for MMAP and MMAP2 records
pub const PERF_RECORD_MISC_MMAP_DATA: u16 = 1 << 13;
/// `PERF_RECORD_MISC_COMM_EXEC`, for COMM records. Same bit as `MMAP_DATA`.
pub const PERF_RECORD_MISC_COMM_EXEC: u16 = 1 << 13;
/// `PERF_RECORD_MISC_EXACT_IP`, for SAMPLE records
pub const PERF_RECORD_MISC_EXACT_IP: u16 = 1 << 14;

/// A decoded record from the data stream.
///
/// The larger variants are borrowed from the [`RecordIter`](crate::RecordIter)
/// which produced them, and are overwritten by the next call to
/// [`next_record`](crate::RecordIter::next_record). Clone them if you need to
/// keep them around.
#[derive(Debug, Clone, PartialEq)]
pub enum Record<'a> {
    Mmap(&'a MmapRecord),
    Lost(LostRecord),
    Comm(&'a CommRecord),
    Exit(ForkOrExitRecord),
    Fork(ForkOrExitRecord),
    Throttle(ThrottleRecord),
    Sample(&'a SampleRecord),
    /// A record kind this crate doesn't decode. The payload is skipped.
    Unknown(RecordHeader),
}

impl Record<'_> {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Mmap(r) if r.mmap2.is_some() => RecordType::MMAP2,
            Record::Mmap(_) => RecordType::MMAP,
            Record::Lost(_) => RecordType::LOST,
            Record::Comm(_) => RecordType::COMM,
            Record::Exit(_) => RecordType::EXIT,
            Record::Fork(_) => RecordType::FORK,
            Record::Throttle(r) if r.enable => RecordType::THROTTLE,
            Record::Throttle(_) => RecordType::UNTHROTTLE,
            Record::Sample(_) => RecordType::SAMPLE,
            Record::Unknown(header) => header.record_type,
        }
    }
}

/// `PERF_RECORD_MMAP` and `PERF_RECORD_MMAP2`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MmapRecord {
    /// Whether this is a data mapping rather than an executable one.
    pub is_data: bool,
    pub pid: i32,
    pub tid: i32,
    pub address: u64,
    pub length: u64,
    pub page_offset: u64,
    /// The extra fields of `MMAP2` records. `None` for `MMAP` records.
    pub mmap2: Option<Mmap2Fields>,
    pub filename: Vec<u8>,
}

/// The fields which `PERF_RECORD_MMAP2` adds over `PERF_RECORD_MMAP`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mmap2Fields {
    pub major: u32,
    pub minor: u32,
    pub inode: u64,
    pub inode_generation: u64,
    pub protection: u32,
    pub flags: u32,
}

impl MmapRecord {
    pub(crate) fn decode_into<T: ByteOrder>(
        &mut self,
        cur: &mut ByteCursor<T>,
        misc: u16,
        v2: bool,
    ) -> Result<(), Error> {
        self.is_data = misc & PERF_RECORD_MISC_MMAP_DATA != 0;
        self.pid = cur.read_i32()?;
        self.tid = cur.read_i32()?;
        self.address = cur.read_u64()?;
        self.length = cur.read_u64()?;
        self.page_offset = cur.read_u64()?;
        self.mmap2 = if v2 {
            Some(Mmap2Fields {
                major: cur.read_u32()?,
                minor: cur.read_u32()?,
                inode: cur.read_u64()?,
                inode_generation: cur.read_u64()?,
                protection: cur.read_u32()?,
                flags: cur.read_u32()?,
            })
        } else {
            None
        };
        self.filename.clear();
        self.filename.extend_from_slice(cur.read_cstr()?);
        Ok(())
    }
}

/// `PERF_RECORD_LOST`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostRecord {
    /// Index into [`AttributeTable::attributes`].
    pub attr_index: usize,
    /// The number of lost records.
    pub lost: u64,
}

impl LostRecord {
    pub(crate) fn decode<T: ByteOrder>(
        cur: &mut ByteCursor<T>,
        attributes: &AttributeTable,
    ) -> Result<Self, Error> {
        let attr_index = attributes.lookup(cur.read_u64()?)?;
        let lost = cur.read_u64()?;
        Ok(Self { attr_index, lost })
    }
}

/// `PERF_RECORD_COMM`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommRecord {
    /// Whether the name changed because of an `exec`.
    pub is_exec: bool,
    pub pid: i32,
    pub tid: i32,
    pub name: Vec<u8>,
}

impl CommRecord {
    pub(crate) fn decode_into<T: ByteOrder>(
        &mut self,
        cur: &mut ByteCursor<T>,
        misc: u16,
    ) -> Result<(), Error> {
        self.is_exec = misc & PERF_RECORD_MISC_COMM_EXEC != 0;
        self.pid = cur.read_i32()?;
        self.tid = cur.read_i32()?;
        self.name.clear();
        self.name.extend_from_slice(cur.read_cstr()?);
        Ok(())
    }
}

/// `PERF_RECORD_FORK` and `PERF_RECORD_EXIT`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForkOrExitRecord {
    pub pid: i32,
    pub ppid: i32,
    pub tid: i32,
    pub ptid: i32,
    pub timestamp: u64,
}

impl ForkOrExitRecord {
    pub(crate) fn decode<T: ByteOrder>(cur: &mut ByteCursor<T>) -> Result<Self, Error> {
        Ok(Self {
            pid: cur.read_i32()?,
            ppid: cur.read_i32()?,
            tid: cur.read_i32()?,
            ptid: cur.read_i32()?,
            timestamp: cur.read_u64()?,
        })
    }
}

/// `PERF_RECORD_THROTTLE` and `PERF_RECORD_UNTHROTTLE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleRecord {
    /// True for `THROTTLE`, false for `UNTHROTTLE`.
    pub enable: bool,
    pub timestamp: u64,
    /// Index into [`AttributeTable::attributes`].
    pub attr_index: usize,
    pub stream_id: u64,
}

impl ThrottleRecord {
    pub(crate) fn decode<T: ByteOrder>(
        cur: &mut ByteCursor<T>,
        attributes: &AttributeTable,
        enable: bool,
    ) -> Result<Self, Error> {
        let timestamp = cur.read_u64()?;
        let attr_index = attributes.lookup(cur.read_u64()?)?;
        let stream_id = cur.read_u64()?;
        Ok(Self {
            enable,
            timestamp,
            attr_index,
            stream_id,
        })
    }
}

/// The privilege level the CPU was in when the sample was taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CpuMode {
    #[default]
    Unknown,
    Kernel,
    User,
    Hypervisor,
    GuestKernel,
    GuestUser,
}

impl CpuMode {
    pub fn from_misc(misc: u16) -> Self {
        match misc & PERF_RECORD_MISC_CPUMODE_MASK {
            1 => Self::Kernel,
            2 => Self::User,
            3 => Self::Hypervisor,
            4 => Self::GuestKernel,
            5 => Self::GuestUser,
            _ => Self::Unknown,
        }
    }
}

/// The ABI of a user register dump (`PERF_SAMPLE_REGS_ABI_*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RegsAbi(pub u64);

impl RegsAbi {
    pub const NONE: Self = Self(0);
    pub const ABI_32: Self = Self(1);
    pub const ABI_64: Self = Self(2);
}

bitflags! {
    /// `PERF_TXN_*` flags describing a hardware transaction.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Transaction: u32 {
        const ELISION = 1 << 0;
        const TRANSACTION = 1 << 1;
        const SYNC = 1 << 2;
        const ASYNC = 1 << 3;
        const RETRY = 1 << 4;
        const CONFLICT = 1 << 5;
        const CAPACITY_WRITE = 1 << 6;
        const CAPACITY_READ = 1 << 7;
    }
}

/// One taken branch from the hardware branch stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchEntry {
    pub from: u64,
    pub to: u64,
    pub flags: u64,
}

/// A counter value from a sample with [`SampleFormat::READ`](linux_perf_event_reader::SampleFormat::READ).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleRead {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
    /// The counter's attribute, if the read format includes IDs.
    pub attr_index: Option<usize>,
}

/// `PERF_RECORD_SAMPLE`
///
/// Fields which are not selected by the event's sample format are zero (or
/// empty, or [`DataSrc::default()`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleRecord {
    /// Index into [`AttributeTable::attributes`].
    pub attr_index: usize,
    pub cpu_mode: CpuMode,
    /// Whether `ip` points at the instruction which triggered the sample,
    /// rather than somewhere after it.
    pub exact_ip: bool,
    pub ip: u64,
    pub pid: i32,
    pub tid: i32,
    pub timestamp: u64,
    pub addr: u64,
    pub stream_id: u64,
    pub cpu: u32,
    pub res: u32,
    pub period: u64,
    /// One entry, or one per group member if the read format has `GROUP`.
    pub read: Vec<SampleRead>,
    pub callchain: Vec<u64>,
    pub branch_stack: Vec<BranchEntry>,
    pub regs_abi: RegsAbi,
    /// The user registers selected by the attribute's `sample_regs_user`,
    /// in ascending register number order.
    pub regs: Vec<u64>,
    pub stack_user: Vec<u8>,
    /// How many bytes of `stack_user` were actually captured.
    pub stack_user_dyn_size: u64,
    pub weight: u64,
    pub data_src: DataSrc,
    pub transaction: Transaction,
    pub abort_code: u32,
}
