//! Decoding of `perf_mem_data_src`, the memory access classification which
//! is attached to samples when `PERF_SAMPLE_DATA_SRC` is requested.
//!
//! The 64-bit word packs several independent sub-fields:
//!
//! | bits  | field  |
//! |-------|--------|
//! | 0-4   | op     |
//! | 5-18  | level  |
//! | 19-23 | snoop  |
//! | 24-25 | lock   |
//! | 26-32 | dtlb   |
//!
//! In each sub-field, the lowest bit means "not available". Such sub-fields
//! decode to `None` (or [`DataSrcLock::NA`]), regardless of their other bits.

use bitflags::bitflags;

const MEM_OP_SHIFT: u64 = 0;
const MEM_LVL_SHIFT: u64 = 5;
const MEM_SNOOP_SHIFT: u64 = 19;
const MEM_LOCK_SHIFT: u64 = 24;
const MEM_TLB_SHIFT: u64 = 26;

const NA_BIT: u64 = 0x1;
const MEM_LVL_MISS: u64 = 0x4;
const MEM_LOCK_LOCKED: u64 = 0x2;

bitflags! {
    /// The type of memory access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataSrcOp: u8 {
        const LOAD = 1 << 0;
        const STORE = 1 << 1;
        const PREFETCH = 1 << 2;
        const EXEC = 1 << 3;
    }
}

bitflags! {
    /// The level of the memory hierarchy which served the access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataSrcLevel: u16 {
        const L1 = 1 << 0;
        /// Line fill buffer
        const LFB = 1 << 1;
        const L2 = 1 << 2;
        const L3 = 1 << 3;
        const LOCAL_RAM = 1 << 4;
        /// Remote DRAM, one hop
        const REMOTE_RAM1 = 1 << 5;
        /// Remote DRAM, two hops
        const REMOTE_RAM2 = 1 << 6;
        /// Remote cache, one hop
        const REMOTE_CACHE1 = 1 << 7;
        /// Remote cache, two hops
        const REMOTE_CACHE2 = 1 << 8;
        /// I/O memory
        const IO = 1 << 9;
        const UNCACHED = 1 << 10;
    }
}

bitflags! {
    /// The snoop result.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataSrcSnoop: u8 {
        const NONE = 1 << 0;
        const HIT = 1 << 1;
        const MISS = 1 << 2;
        /// Hit on a modified line
        const HITM = 1 << 3;
    }
}

bitflags! {
    /// TLB access behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataSrcTlb: u8 {
        const HIT = 1 << 0;
        const MISS = 1 << 1;
        const L1 = 1 << 2;
        const L2 = 1 << 3;
        /// Hardware page walker
        const HW_WALKER = 1 << 4;
        /// OS fault handler
        const OS_FAULT_HANDLER = 1 << 5;
    }
}

/// Whether the access was part of a locked transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataSrcLock {
    #[default]
    NA,
    Unlocked,
    Locked,
}

/// A decoded `perf_mem_data_src` value.
///
/// The default value has every sub-field set to "not available"; this is
/// what samples without `PERF_SAMPLE_DATA_SRC` carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataSrc {
    pub op: Option<DataSrcOp>,
    /// Whether the access missed in `level`. Always false if `level` is `None`.
    pub miss: bool,
    pub level: Option<DataSrcLevel>,
    pub snoop: Option<DataSrcSnoop>,
    pub lock: DataSrcLock,
    pub tlb: Option<DataSrcTlb>,
}

impl DataSrc {
    /// Unpacks a raw `perf_mem_data_src` word. Every input is valid.
    pub fn decode(d: u64) -> Self {
        let op = (d >> MEM_OP_SHIFT) & 0x1f;
        let lvl = (d >> MEM_LVL_SHIFT) & 0x3fff;
        let snoop = (d >> MEM_SNOOP_SHIFT) & 0x1f;
        let lock = (d >> MEM_LOCK_SHIFT) & 0x3;
        let dtlb = (d >> MEM_TLB_SHIFT) & 0x7f;

        let op = sub_field(op).map(|op| DataSrcOp::from_bits_retain(op as u8));

        // Bit 1 of the level field is "hit", which is implied by !miss.
        let (miss, level) = if lvl & NA_BIT != 0 {
            (false, None)
        } else {
            (
                lvl & MEM_LVL_MISS != 0,
                Some(DataSrcLevel::from_bits_retain((lvl >> 3) as u16)),
            )
        };

        let snoop = sub_field(snoop).map(|snoop| DataSrcSnoop::from_bits_retain(snoop as u8));

        let lock = if lock & NA_BIT != 0 {
            DataSrcLock::NA
        } else if lock & MEM_LOCK_LOCKED != 0 {
            DataSrcLock::Locked
        } else {
            DataSrcLock::Unlocked
        };

        let tlb = sub_field(dtlb).map(|dtlb| DataSrcTlb::from_bits_retain(dtlb as u8));

        Self {
            op,
            miss,
            level,
            snoop,
            lock,
            tlb,
        }
    }
}

/// Strips the NA bit off a sub-field, or returns `None` if it is set.
fn sub_field(field: u64) -> Option<u64> {
    if field & NA_BIT != 0 {
        None
    } else {
        Some(field >> 1)
    }
}
