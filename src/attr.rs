use std::collections::HashMap;

use linux_perf_event_reader::{PerfEventAttr, ReadFormat, SampleFormat};

use crate::Error;

/// The parts of a `perf_event_attr` which determine how records of this
/// event are laid out, plus the event's name and IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttr {
    /// Which optional fields are present in `SAMPLE` records of this event.
    pub sample_format: SampleFormat,
    /// The layout of the counter values in `SAMPLE` records with [`SampleFormat::READ`].
    pub read_format: ReadFormat,
    /// Which user registers are dumped in samples with [`SampleFormat::REGS_USER`].
    pub sample_regs_user: u64,
    /// The event name, if the file has one.
    pub name: Option<String>,
    /// The event IDs which map to this attribute.
    pub event_ids: Vec<u64>,
}

impl EventAttr {
    pub fn new(sample_format: SampleFormat, read_format: ReadFormat) -> Self {
        Self {
            sample_format,
            read_format,
            sample_regs_user: 0,
            name: None,
            event_ids: Vec::new(),
        }
    }

    pub fn from_perf_event_attr(
        attr: &PerfEventAttr,
        name: Option<String>,
        event_ids: Vec<u64>,
    ) -> Self {
        Self {
            sample_format: attr.sample_format,
            read_format: attr.read_format,
            sample_regs_user: attr.sample_regs_user,
            name,
            event_ids,
        }
    }

    /// The event name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The IDs for this event.
    pub fn ids(&self) -> &[u64] {
        &self.event_ids
    }

    /// The number of registers in a user register dump.
    pub fn user_regs_count(&self) -> usize {
        self.sample_regs_user.count_ones() as usize
    }

    /// The byte offset of the event ID in the payload of this event's
    /// `SAMPLE` records, or `None` if samples carry no ID.
    ///
    /// `IDENTIFIER` is always the first field. Otherwise `ID` comes after
    /// whichever of `IP`, `TID`, `TIME` and `ADDR` are present, each of which
    /// is 8 bytes wide.
    pub fn sample_id_offset(&self) -> Option<usize> {
        let format = self.sample_format;
        if format.contains(SampleFormat::IDENTIFIER) {
            return Some(0);
        }
        if !format.contains(SampleFormat::ID) {
            return None;
        }
        let preceding = [
            SampleFormat::IP,
            SampleFormat::TID,
            SampleFormat::TIME,
            SampleFormat::ADDR,
        ];
        Some(
            preceding
                .iter()
                .filter(|flag| format.contains(**flag))
                .count()
                * 8,
        )
    }
}

/// Maps event IDs to event attributes.
///
/// Records refer to their attribute by index into [`AttributeTable::attributes`].
///
/// The table also knows where the event ID is stored in `SAMPLE` payloads.
/// This offset has to be the same for all attributes, because the record
/// cannot be decoded before its attribute is known.
#[derive(Debug, Clone)]
pub struct AttributeTable {
    attributes: Vec<EventAttr>,
    id_to_attr_index: HashMap<u64, usize>,
    sample_id_offset: Option<usize>,
}

impl AttributeTable {
    /// Creates the table and computes the sample ID offset.
    ///
    /// A single attribute needs no ID in its samples: every sample is
    /// attributed to it under the ID 0. With multiple attributes, all of them
    /// must store the ID at the same sample offset.
    pub fn new(attributes: Vec<EventAttr>) -> Result<Self, Error> {
        let (first, rest) = attributes.split_first().ok_or(Error::NoAttributes)?;
        let sample_id_offset = if rest.is_empty() {
            None
        } else {
            let offset = first
                .sample_id_offset()
                .ok_or(Error::NoIdentifierDespiteMultiEvent(0))?;
            for (attr_index, attr) in attributes.iter().enumerate().skip(1) {
                match attr.sample_id_offset() {
                    None => return Err(Error::NoIdentifierDespiteMultiEvent(attr_index)),
                    Some(o) if o != offset => return Err(Error::InconsistentIdOffset(attr_index)),
                    Some(_) => {}
                }
            }
            Some(offset)
        };
        log::debug!(
            "{} event attributes, sample ID offset {:?}",
            attributes.len(),
            sample_id_offset
        );
        Ok(Self::with_id_offset(attributes, sample_id_offset))
    }

    /// Creates the table with an explicitly supplied sample ID offset.
    /// `None` means that samples carry no ID and resolve to ID 0.
    pub fn with_id_offset(attributes: Vec<EventAttr>, sample_id_offset: Option<usize>) -> Self {
        let mut id_to_attr_index = HashMap::new();
        for (attr_index, EventAttr { event_ids, .. }) in attributes.iter().enumerate() {
            for event_id in event_ids {
                id_to_attr_index.insert(*event_id, attr_index);
            }
        }
        if sample_id_offset.is_none() && !attributes.is_empty() {
            id_to_attr_index.entry(0).or_insert(0);
        }
        Self {
            attributes,
            id_to_attr_index,
            sample_id_offset,
        }
    }

    pub fn attributes(&self) -> &[EventAttr] {
        &self.attributes
    }

    pub fn get(&self, attr_index: usize) -> Option<&EventAttr> {
        self.attributes.get(attr_index)
    }

    /// The byte offset of the event ID within `SAMPLE` payloads.
    pub fn sample_id_offset(&self) -> Option<usize> {
        self.sample_id_offset
    }

    /// Finds the attribute index for an event ID.
    pub fn lookup(&self, event_id: u64) -> Result<usize, Error> {
        self.id_to_attr_index
            .get(&event_id)
            .copied()
            .ok_or(Error::UnknownAttributeId(event_id))
    }
}
