use std::io::{Cursor, Read, Seek, SeekFrom};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use linear_map::LinearMap;
use linux_perf_event_reader::Endianness;

use crate::attr::AttributeTable;
use crate::feature_sections::{
    parse_attr_section, parse_event_desc_section, parse_event_types_section, HeaderString,
};
use crate::features::{Feature, FeatureSet};
use crate::header::{PerfFileSection, PerfHeader};
use crate::record_iter::RecordIter;
use crate::Error;

/// A parsed perf.data file.
///
/// Parsing reads the file header, the feature sections and the event
/// attributes. The records in the data section are read lazily through
/// [`PerfFile::records`].
///
/// # Example
///
/// ```no_run
/// use perf_record_decoder::{PerfFile, Record};
///
/// # fn wrapper() -> Result<(), perf_record_decoder::Error> {
/// let file = std::fs::File::open("perf.data")?;
/// let mut perf_file = PerfFile::parse(std::io::BufReader::new(file))?;
/// println!("recorded on {:?}", perf_file.hostname()?);
///
/// let mut records = perf_file.records()?;
/// while let Some(record) = records.next_record()? {
///     if let Record::Sample(sample) = record {
///         println!("sample at {:#x} for event {}", sample.ip, sample.attr_index);
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct PerfFile<R> {
    reader: R,
    header: PerfHeader,
    feature_sections: LinearMap<Feature, Vec<u8>>,
    attributes: AttributeTable,
}

impl<R: Read + Seek> PerfFile<R> {
    pub fn parse(mut reader: R) -> Result<Self, Error> {
        let header = PerfHeader::parse(&mut reader)?;
        match header.endian {
            Endianness::LittleEndian => Self::parse_impl::<LittleEndian>(reader, header),
            Endianness::BigEndian => Self::parse_impl::<BigEndian>(reader, header),
        }
    }

    fn parse_impl<T: ByteOrder>(mut reader: R, header: PerfHeader) -> Result<Self, Error> {
        // The section table for the features starts just after the data section.
        let feature_pos = header.data_section.offset + header.data_section.size;
        reader.seek(SeekFrom::Start(feature_pos))?;
        let mut feature_sections_info = Vec::new();
        for feature in header.features.iter() {
            let section = PerfFileSection::parse::<_, T>(&mut reader)?;
            feature_sections_info.push((feature, section));
        }

        let mut feature_sections = LinearMap::new();
        for (feature, section) in feature_sections_info {
            let size = usize::try_from(section.size).map_err(|_| Error::SectionSizeTooBig)?;
            let mut data = vec![0; size];
            reader.seek(SeekFrom::Start(section.offset))?;
            reader.read_exact(&mut data)?;
            feature_sections.insert(feature, data);
        }

        let attributes = if let Some(event_desc) = feature_sections.get(&Feature::EVENT_DESC) {
            parse_event_desc_section::<_, T>(Cursor::new(&event_desc[..]))?
        } else if header.event_types_section.size != 0 {
            parse_event_types_section::<_, T>(
                &mut reader,
                &header.event_types_section,
                header.attr_size,
            )?
        } else {
            parse_attr_section::<_, T>(&mut reader, &header.attr_section, header.attr_size)?
        };
        let attributes = AttributeTable::new(attributes)?;

        Ok(Self {
            reader,
            header,
            feature_sections,
            attributes,
        })
    }

    /// Returns an iterator over the records in the data section.
    ///
    /// Each call starts again at the beginning of the data section.
    pub fn records(&mut self) -> Result<RecordIter<'_, std::io::Take<&mut R>>, Error> {
        let data_section = self.header.data_section;
        self.reader.seek(SeekFrom::Start(data_section.offset))?;
        let reader = (&mut self.reader).take(data_section.size);
        Ok(RecordIter::new(reader, self.header.endian, &self.attributes))
    }
}

impl<R> PerfFile<R> {
    /// The byte order of the file, from its magic value.
    pub fn endian(&self) -> Endianness {
        self.header.endian
    }

    /// The event attributes and the sample ID layout.
    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    /// The set of features stored in this file.
    pub fn features(&self) -> FeatureSet {
        self.header.features
    }

    /// The raw data of a feature section, if the file has it.
    pub fn feature_section(&self, feature: Feature) -> Option<&[u8]> {
        self.feature_sections.get(&feature).map(Vec::as_slice)
    }

    /// Only call this for features whose section is just a perf_header_string.
    fn feature_string(&self, feature: Feature) -> Result<Option<String>, Error> {
        match self.feature_section(feature) {
            Some(section) => Ok(self.read_string(section)?),
            None => Ok(None),
        }
    }

    fn read_string(&self, section: &[u8]) -> Result<Option<String>, std::io::Error> {
        match self.endian() {
            Endianness::LittleEndian => HeaderString::parse::<_, LittleEndian>(section),
            Endianness::BigEndian => HeaderString::parse::<_, BigEndian>(section),
        }
    }

    /// The host name of the machine that recorded the file.
    pub fn hostname(&self) -> Result<Option<String>, Error> {
        self.feature_string(Feature::HOSTNAME)
    }

    /// The kernel release of the recording machine, e.g. `6.8.0-45-generic`.
    pub fn os_release(&self) -> Result<Option<String>, Error> {
        self.feature_string(Feature::OSRELEASE)
    }

    /// The version of the perf tool which wrote the file.
    pub fn perf_version(&self) -> Result<Option<String>, Error> {
        self.feature_string(Feature::VERSION)
    }

    pub fn arch(&self) -> Result<Option<String>, Error> {
        self.feature_string(Feature::ARCH)
    }

    /// The command line used to record the file, one string per argument.
    pub fn cmdline(&self) -> Result<Option<Vec<String>>, Error> {
        let section = match self.feature_section(Feature::CMDLINE) {
            Some(section) => section,
            None => return Ok(None),
        };
        match self.endian() {
            Endianness::LittleEndian => Self::parse_cmdline::<LittleEndian>(section).map(Some),
            Endianness::BigEndian => Self::parse_cmdline::<BigEndian>(section).map(Some),
        }
    }

    fn parse_cmdline<T: ByteOrder>(mut section: &[u8]) -> Result<Vec<String>, Error> {
        let nr = section.read_u32::<T>()?;
        let mut args = Vec::new();
        for _ in 0..nr {
            let arg = HeaderString::parse::<_, T>(&mut section)?;
            args.push(arg.unwrap_or_default());
        }
        Ok(args)
    }
}
