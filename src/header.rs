use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use linux_perf_event_reader::Endianness;

use crate::features::FeatureSet;
use crate::Error;

/// `perf_file_section`
///
/// Points at another part of the perf file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfFileSection {
    /// offset from start of file
    pub offset: u64,
    /// size of the section
    pub size: u64,
}

impl PerfFileSection {
    pub const STRUCT_SIZE: u64 = 8 + 8;

    pub fn parse<R: Read, T: ByteOrder>(mut reader: R) -> Result<Self, std::io::Error> {
        let offset = reader.read_u64::<T>()?;
        let size = reader.read_u64::<T>()?;
        Ok(Self { offset, size })
    }
}

/// `perf_header`
///
/// The magic value is `PERFILE2` for little-endian files. Big-endian files
/// store the same 64-bit value byte-swapped, i.e. `2ELIFREP`.
#[derive(Debug, Clone, Copy)]
pub struct PerfHeader {
    pub endian: Endianness,
    /// size of an attribute in the attr section
    pub attr_size: u64,
    pub attr_section: PerfFileSection,
    pub data_section: PerfFileSection,
    pub event_types_section: PerfFileSection,
    pub features: FeatureSet,
}

impl PerfHeader {
    /// The size of the header fields this crate knows about.
    pub const STRUCT_SIZE: u64 = 8 + 8 + 8 + 3 * PerfFileSection::STRUCT_SIZE + 4 * 8;

    pub fn parse<R: Read + Seek>(mut reader: R) -> Result<Self, Error> {
        let mut magic = [0; 8];
        reader.read_exact(&mut magic)?;
        match &magic {
            b"PERFILE2" => Self::parse_impl::<R, LittleEndian>(reader, Endianness::LittleEndian),
            b"2ELIFREP" => Self::parse_impl::<R, BigEndian>(reader, Endianness::BigEndian),
            _ => Err(Error::UnrecognizedMagicValue(magic)),
        }
    }

    fn parse_impl<R: Read + Seek, T: ByteOrder>(
        mut reader: R,
        endian: Endianness,
    ) -> Result<Self, Error> {
        let header_size = reader.read_u64::<T>()?;
        let attr_size = reader.read_u64::<T>()?;
        let attr_section = PerfFileSection::parse::<_, T>(&mut reader)?;
        let data_section = PerfFileSection::parse::<_, T>(&mut reader)?;
        let event_types_section = PerfFileSection::parse::<_, T>(&mut reader)?;
        let features = FeatureSet([
            reader.read_u64::<T>()?,
            reader.read_u64::<T>()?,
            reader.read_u64::<T>()?,
            reader.read_u64::<T>()?,
        ]);

        // Newer perf versions may append fields we don't know about.
        if header_size > Self::STRUCT_SIZE {
            reader.seek(SeekFrom::Current((header_size - Self::STRUCT_SIZE) as i64))?;
        }

        Ok(Self {
            endian,
            attr_size,
            attr_section,
            data_section,
            event_types_section,
            features,
        })
    }
}
