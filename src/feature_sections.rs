use std::io::{Read, Seek, SeekFrom};

use byteorder::{ByteOrder, ReadBytesExt};
use linux_perf_event_reader::PerfEventAttr;

use crate::attr::EventAttr;
use crate::header::PerfFileSection;
use crate::Error;

/// `perf_header_string`: a u32 length followed by that many bytes of
/// NUL-padded string data.
pub struct HeaderString;

impl HeaderString {
    /// Parse a string. Returns `None` if the string is not valid UTF-8.
    pub fn parse<R: Read, T: ByteOrder>(mut reader: R) -> Result<Option<String>, std::io::Error> {
        let len = reader.read_u32::<T>()?;
        let mut s = vec![0; len as usize];
        reader.read_exact(&mut s)?;
        let actual_len = memchr::memchr(0, &s).unwrap_or(s.len());
        s.truncate(actual_len);
        Ok(String::from_utf8(s).ok())
    }
}

fn parse_attr<R: Read, T: ByteOrder>(reader: R, attr_size: u64) -> Result<PerfEventAttr, Error> {
    let attr_size = u32::try_from(attr_size).map_err(|_| Error::InvalidAttrSize)?;
    Ok(PerfEventAttr::parse::<_, T>(reader, Some(attr_size))?)
}

fn read_ids<R: Read, T: ByteOrder>(mut reader: R, count: u64) -> Result<Vec<u64>, Error> {
    let mut ids = Vec::new();
    for _ in 0..count {
        ids.push(reader.read_u64::<T>()?);
    }
    Ok(ids)
}

/// Parse the `HEADER_EVENT_DESC` feature section.
pub fn parse_event_desc_section<R: Read, T: ByteOrder>(
    mut reader: R,
) -> Result<Vec<EventAttr>, Error> {
    // ```c
    // struct {
    //   uint32_t nr; /* number of events */
    //   uint32_t attr_size; /* size of each perf_event_attr */
    //   struct {
    //     struct perf_event_attr attr;  /* size of attr_size */
    //     uint32_t nr_ids;
    //     struct perf_header_string event_string;
    //     uint64_t ids[nr_ids];
    //   } events[nr]; /* Variable length records */
    // };
    // ```
    let nr = reader.read_u32::<T>()?;
    let attr_size = reader.read_u32::<T>()?;
    let mut attributes = Vec::new();
    for _ in 0..nr {
        let attr = parse_attr::<_, T>(&mut reader, attr_size.into())?;
        let nr_ids = reader.read_u32::<T>()?;
        let name = HeaderString::parse::<_, T>(&mut reader)?;
        let ids = read_ids::<_, T>(&mut reader, nr_ids.into())?;
        attributes.push(EventAttr::from_perf_event_attr(&attr, name, ids));
    }
    Ok(attributes)
}

/// Parse a section whose entries are a `perf_event_attr` of `attr_size`
/// bytes followed by a `perf_file_section` pointing at the event's u64 IDs.
fn parse_attrs_with_id_sections<C: Read + Seek, T: ByteOrder>(
    mut cursor: C,
    section: &PerfFileSection,
    attr_size: u64,
) -> Result<Vec<EventAttr>, Error> {
    if attr_size == 0 {
        return Err(Error::InvalidAttrSize);
    }
    cursor.seek(SeekFrom::Start(section.offset))?;
    let entry_size = attr_size + PerfFileSection::STRUCT_SIZE;
    let entry_count = section.size / entry_size;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        let attr = parse_attr::<_, T>(&mut cursor, attr_size)?;
        let ids_section = PerfFileSection::parse::<_, T>(&mut cursor)?;
        entries.push((attr, ids_section));
    }

    let mut attributes = Vec::with_capacity(entries.len());
    for (attr, ids_section) in entries {
        cursor.seek(SeekFrom::Start(ids_section.offset))?;
        let ids = read_ids::<_, T>(&mut cursor, ids_section.size / 8)?;
        attributes.push(EventAttr::from_perf_event_attr(&attr, None, ids));
    }
    Ok(attributes)
}

/// Parse the `attrs` section of the file header.
///
/// `attr_size` from the file header covers a `perf_file_attr`, i.e. the
/// `perf_event_attr` plus the section of its IDs.
pub fn parse_attr_section<C: Read + Seek, T: ByteOrder>(
    cursor: C,
    attr_section: &PerfFileSection,
    attr_size: u64,
) -> Result<Vec<EventAttr>, Error> {
    let event_attr_size = attr_size
        .checked_sub(PerfFileSection::STRUCT_SIZE)
        .ok_or(Error::InvalidAttrSize)?;
    parse_attrs_with_id_sections::<_, T>(cursor, attr_section, event_attr_size)
}

/// Parse the legacy `event_types` section. Only call this if the section
/// size is non-zero.
pub fn parse_event_types_section<C: Read + Seek, T: ByteOrder>(
    cursor: C,
    event_types_section: &PerfFileSection,
    attr_size: u64,
) -> Result<Vec<EventAttr>, Error> {
    parse_attrs_with_id_sections::<_, T>(cursor, event_types_section, attr_size)
}
