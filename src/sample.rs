use byteorder::ByteOrder;
use linux_perf_event_reader::{ReadFormat, SampleFormat};

use crate::attr::AttributeTable;
use crate::cursor::ByteCursor;
use crate::data_src::DataSrc;
use crate::records::{
    BranchEntry, CpuMode, RegsAbi, SampleRead, SampleRecord, Transaction,
    PERF_RECORD_MISC_EXACT_IP,
};
use crate::{Error, ReadError};

impl SampleRecord {
    /// Decodes a `PERF_RECORD_SAMPLE` payload into `self`, reusing the
    /// allocations of the previous sample.
    ///
    /// ```c
    /// struct {
    ///     struct perf_event_header header;
    ///     u64    sample_id;   /* if PERF_SAMPLE_IDENTIFIER */
    ///     u64    ip;          /* if PERF_SAMPLE_IP */
    ///     u32    pid, tid;    /* if PERF_SAMPLE_TID */
    ///     u64    time;        /* if PERF_SAMPLE_TIME */
    ///     u64    addr;        /* if PERF_SAMPLE_ADDR */
    ///     u64    id;          /* if PERF_SAMPLE_ID */
    ///     u64    stream_id;   /* if PERF_SAMPLE_STREAM_ID */
    ///     u32    cpu, res;    /* if PERF_SAMPLE_CPU */
    ///     u64    period;      /* if PERF_SAMPLE_PERIOD */
    ///     struct read_format v; /* if PERF_SAMPLE_READ */
    ///     u64    nr;          /* if PERF_SAMPLE_CALLCHAIN */
    ///     u64    ips[nr];     /* if PERF_SAMPLE_CALLCHAIN */
    ///     u32    size;        /* if PERF_SAMPLE_RAW */
    ///     char   data[size];  /* if PERF_SAMPLE_RAW */
    ///     u64    bnr;         /* if PERF_SAMPLE_BRANCH_STACK */
    ///     struct perf_branch_entry lbr[bnr]; /* if PERF_SAMPLE_BRANCH_STACK */
    ///     u64    abi;         /* if PERF_SAMPLE_REGS_USER */
    ///     u64    regs[weight(mask)]; /* if PERF_SAMPLE_REGS_USER */
    ///     u64    size;        /* if PERF_SAMPLE_STACK_USER */
    ///     char   data[size];  /* if PERF_SAMPLE_STACK_USER */
    ///     u64    dyn_size;    /* if PERF_SAMPLE_STACK_USER */
    ///     u64    weight;      /* if PERF_SAMPLE_WEIGHT */
    ///     u64    data_src;    /* if PERF_SAMPLE_DATA_SRC */
    ///     u64    transaction; /* if PERF_SAMPLE_TRANSACTION */
    /// };
    /// ```
    pub(crate) fn decode_into<T: ByteOrder>(
        &mut self,
        data: &[u8],
        misc: u16,
        attributes: &AttributeTable,
    ) -> Result<(), Error> {
        // The ID has to be found before the rest of the layout is known.
        let event_id = match attributes.sample_id_offset() {
            None => 0,
            Some(offset) => {
                let mut id_cur = ByteCursor::<T>::new(data);
                id_cur.skip(offset)?;
                id_cur.read_u64()?
            }
        };
        let attr_index = attributes.lookup(event_id)?;
        let attr = &attributes.attributes()[attr_index];
        self.attr_index = attr_index;

        self.cpu_mode = CpuMode::from_misc(misc);
        self.exact_ip = misc & PERF_RECORD_MISC_EXACT_IP != 0;

        let t = attr.sample_format;
        let mut cur = ByteCursor::<T>::new(data);
        cur.read_u64_if(t.contains(SampleFormat::IDENTIFIER))?;
        self.ip = cur.read_u64_if(t.contains(SampleFormat::IP))?;
        self.pid = cur.read_i32_if(t.contains(SampleFormat::TID))?;
        self.tid = cur.read_i32_if(t.contains(SampleFormat::TID))?;
        self.timestamp = cur.read_u64_if(t.contains(SampleFormat::TIME))?;
        self.addr = cur.read_u64_if(t.contains(SampleFormat::ADDR))?;
        cur.read_u64_if(t.contains(SampleFormat::ID))?;
        self.stream_id = cur.read_u64_if(t.contains(SampleFormat::STREAM_ID))?;
        self.cpu = cur.read_u32_if(t.contains(SampleFormat::CPU))?;
        self.res = cur.read_u32_if(t.contains(SampleFormat::CPU))?;
        self.period = cur.read_u64_if(t.contains(SampleFormat::PERIOD))?;

        if t.contains(SampleFormat::READ) {
            decode_read_format(&mut cur, attr.read_format, attributes, &mut self.read)?;
        } else {
            self.read.clear();
        }

        if t.contains(SampleFormat::CALLCHAIN) {
            let len = cur.read_len(8)?;
            self.callchain.resize(len, 0);
            cur.read_u64_into(&mut self.callchain)?;
        } else {
            self.callchain.clear();
        }

        if t.contains(SampleFormat::RAW) {
            let raw_size = cur.read_len_u32(1)?;
            cur.skip(raw_size)?;
        }

        if t.contains(SampleFormat::BRANCH_STACK) {
            let len = cur.read_len(24)?;
            self.branch_stack.resize(len, BranchEntry::default());
            for entry in &mut self.branch_stack {
                entry.from = cur.read_u64()?;
                entry.to = cur.read_u64()?;
                entry.flags = cur.read_u64()?;
            }
        } else {
            self.branch_stack.clear();
        }

        if t.contains(SampleFormat::REGS_USER) {
            self.regs_abi = RegsAbi(cur.read_u64()?);
            // The register count isn't stored in the record; it follows from the mask.
            let count = attr.user_regs_count();
            if count * 8 > cur.remaining() {
                return Err(ReadError::LengthTooLarge {
                    offset: cur.position(),
                    count: count as u64,
                    elem_size: 8,
                    available: cur.remaining(),
                }
                .into());
            }
            self.regs.resize(count, 0);
            cur.read_u64_into(&mut self.regs)?;
        } else {
            self.regs_abi = RegsAbi::NONE;
            self.regs.clear();
        }

        if t.contains(SampleFormat::STACK_USER) {
            let size = cur.read_len(1)?;
            self.stack_user.clear();
            self.stack_user.extend_from_slice(cur.read_bytes(size)?);
            self.stack_user_dyn_size = cur.read_u64()?;
        } else {
            self.stack_user.clear();
            self.stack_user_dyn_size = 0;
        }

        self.weight = cur.read_u64_if(t.contains(SampleFormat::WEIGHT))?;

        self.data_src = if t.contains(SampleFormat::DATA_SRC) {
            DataSrc::decode(cur.read_u64()?)
        } else {
            DataSrc::default()
        };

        let transaction = cur.read_u64_if(t.contains(SampleFormat::TRANSACTION))?;
        self.transaction = Transaction::from_bits_retain(transaction as u32);
        self.abort_code = (transaction >> 32) as u32;

        Ok(())
    }
}

/// Decodes a `read_format` block into `out`.
///
/// Without `GROUP`, the single value comes first and the times follow it.
/// With `GROUP`, every entry has its times before its value.
fn decode_read_format<T: ByteOrder>(
    cur: &mut ByteCursor<T>,
    f: ReadFormat,
    attributes: &AttributeTable,
    out: &mut Vec<SampleRead>,
) -> Result<(), Error> {
    let has_enabled = f.contains(ReadFormat::TOTAL_TIME_ENABLED);
    let has_running = f.contains(ReadFormat::TOTAL_TIME_RUNNING);
    let has_id = f.contains(ReadFormat::ID);

    if !f.contains(ReadFormat::GROUP) {
        out.resize(1, SampleRead::default());
        let o = &mut out[0];
        o.value = cur.read_u64()?;
        o.time_enabled = cur.read_u64_if(has_enabled)?;
        o.time_running = cur.read_u64_if(has_running)?;
        o.attr_index = read_attr_index(cur, has_id, attributes)?;
        return Ok(());
    }

    let entry_size = 8 * (1 + has_enabled as usize + has_running as usize + has_id as usize);
    let nr = cur.read_len(entry_size)?;
    out.resize(nr, SampleRead::default());
    for o in out.iter_mut() {
        o.time_enabled = cur.read_u64_if(has_enabled)?;
        o.time_running = cur.read_u64_if(has_running)?;
        o.value = cur.read_u64()?;
        o.attr_index = read_attr_index(cur, has_id, attributes)?;
    }
    Ok(())
}

fn read_attr_index<T: ByteOrder>(
    cur: &mut ByteCursor<T>,
    has_id: bool,
    attributes: &AttributeTable,
) -> Result<Option<usize>, Error> {
    if has_id {
        Ok(Some(attributes.lookup(cur.read_u64()?)?))
    } else {
        Ok(None)
    }
}
