//! Reads a perf.data file which is assembled in memory.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use perf_record_decoder::{
    CpuMode, Endianness, Error, Feature, PerfFile, Record, RecordType, SampleFormat,
};

type LE = LittleEndian;

const HEADER_SIZE: u64 = 104;
const EVENT_ATTR_SIZE: u64 = 112;
const FILE_ATTR_SIZE: u64 = EVENT_ATTR_SIZE + 16;

fn sample_format() -> SampleFormat {
    SampleFormat::IDENTIFIER
        | SampleFormat::IP
        | SampleFormat::TID
        | SampleFormat::TIME
        | SampleFormat::PERIOD
}

/// A `perf_event_attr` with `PERF_ATTR_SIZE_VER5` bytes.
fn write_event_attr(out: &mut Vec<u8>, sample_format: SampleFormat) {
    out.write_u32::<LE>(1).unwrap(); // PERF_TYPE_SOFTWARE
    out.write_u32::<LE>(EVENT_ATTR_SIZE as u32).unwrap();
    out.write_u64::<LE>(0).unwrap(); // PERF_COUNT_SW_CPU_CLOCK
    out.write_u64::<LE>(4000).unwrap(); // sample_period
    out.write_u64::<LE>(sample_format.bits()).unwrap();
    out.write_u64::<LE>(0).unwrap(); // read_format
    out.write_u64::<LE>(0).unwrap(); // flags
    out.write_u32::<LE>(0).unwrap(); // wakeup_events
    out.write_u32::<LE>(0).unwrap(); // bp_type
    out.write_u64::<LE>(0).unwrap(); // config1
    out.write_u64::<LE>(0).unwrap(); // config2
    out.write_u64::<LE>(0).unwrap(); // branch_sample_type
    out.write_u64::<LE>(0).unwrap(); // sample_regs_user
    out.write_u32::<LE>(0).unwrap(); // sample_stack_user
    out.write_i32::<LE>(0).unwrap(); // clockid
    out.write_u64::<LE>(0).unwrap(); // sample_regs_intr
    out.write_u32::<LE>(0).unwrap(); // aux_watermark
    out.write_u16::<LE>(0).unwrap(); // sample_max_stack
    out.write_u16::<LE>(0).unwrap(); // reserved
}

fn write_record(out: &mut Vec<u8>, record_type: u32, misc: u16, payload: &[u8]) {
    out.write_u32::<LE>(record_type).unwrap();
    out.write_u16::<LE>(misc).unwrap();
    out.write_u16::<LE>(8 + payload.len() as u16).unwrap();
    out.write_all(payload).unwrap();
}

fn sample_payload(id: u64, ip: u64, pid: u32, tid: u32, time: u64, period: u64) -> Vec<u8> {
    let mut p = Vec::new();
    p.write_u64::<LE>(id).unwrap();
    p.write_u64::<LE>(ip).unwrap();
    p.write_u32::<LE>(pid).unwrap();
    p.write_u32::<LE>(tid).unwrap();
    p.write_u64::<LE>(time).unwrap();
    p.write_u64::<LE>(period).unwrap();
    p
}

fn data_section() -> Vec<u8> {
    let mut data = Vec::new();

    let mut comm = Vec::new();
    comm.write_u32::<LE>(1234).unwrap();
    comm.write_u32::<LE>(1234).unwrap();
    comm.write_all(b"sleep\0\0\0").unwrap();
    write_record(&mut data, 3, 1 << 13, &comm);

    let sample = sample_payload(100, 0x5555_0000_1000, 1234, 1235, 1_000_000, 4000);
    write_record(&mut data, 9, 2, &sample);

    let sample = sample_payload(200, 0xffff_ffff_8100_0000, 1234, 1234, 1_000_500, 1);
    write_record(&mut data, 9, 1 | (1 << 14), &sample);

    let mut exit = Vec::new();
    exit.write_u32::<LE>(1234).unwrap();
    exit.write_u32::<LE>(1).unwrap();
    exit.write_u32::<LE>(1234).unwrap();
    exit.write_u32::<LE>(1).unwrap();
    exit.write_u64::<LE>(2_000_000).unwrap();
    write_record(&mut data, 4, 0, &exit);

    data
}

fn header_string(out: &mut Vec<u8>, s: &str) {
    let padded_len = (s.len() + 1).next_multiple_of(8);
    out.write_u32::<LE>(padded_len as u32).unwrap();
    out.write_all(s.as_bytes()).unwrap();
    out.resize(out.len() + padded_len - s.len(), 0);
}

/// Two events with IDs {100, 101} and {200}, a data section, and the
/// HOSTNAME, ARCH and CMDLINE feature sections.
fn build_file(data: &[u8]) -> Vec<u8> {
    let attrs_offset = HEADER_SIZE;
    let attrs_size = 2 * FILE_ATTR_SIZE;
    let ids_offset = attrs_offset + attrs_size;
    let ids_size = 3 * 8;
    let data_offset = ids_offset + ids_size;
    let data_size = data.len() as u64;

    let mut file = Vec::new();
    file.write_all(b"PERFILE2").unwrap();
    file.write_u64::<LE>(HEADER_SIZE).unwrap();
    file.write_u64::<LE>(FILE_ATTR_SIZE).unwrap();
    file.write_u64::<LE>(attrs_offset).unwrap();
    file.write_u64::<LE>(attrs_size).unwrap();
    file.write_u64::<LE>(data_offset).unwrap();
    file.write_u64::<LE>(data_size).unwrap();
    file.write_u64::<LE>(0).unwrap(); // event_types offset
    file.write_u64::<LE>(0).unwrap(); // event_types size
    let feature_bits = (1u64 << Feature::HOSTNAME.0)
        | (1u64 << Feature::ARCH.0)
        | (1u64 << Feature::CMDLINE.0);
    file.write_u64::<LE>(feature_bits).unwrap();
    file.write_u64::<LE>(0).unwrap();
    file.write_u64::<LE>(0).unwrap();
    file.write_u64::<LE>(0).unwrap();
    assert_eq!(file.len() as u64, HEADER_SIZE);

    write_event_attr(&mut file, sample_format());
    file.write_u64::<LE>(ids_offset).unwrap();
    file.write_u64::<LE>(16).unwrap();
    write_event_attr(&mut file, sample_format());
    file.write_u64::<LE>(ids_offset + 16).unwrap();
    file.write_u64::<LE>(8).unwrap();

    for id in [100u64, 101, 200] {
        file.write_u64::<LE>(id).unwrap();
    }
    assert_eq!(file.len() as u64, data_offset);
    file.write_all(data).unwrap();

    let mut hostname = Vec::new();
    header_string(&mut hostname, "buildbox");
    let mut arch = Vec::new();
    header_string(&mut arch, "x86_64");
    let mut cmdline = Vec::new();
    cmdline.write_u32::<LE>(3).unwrap();
    for arg in ["perf", "record", "sleep"] {
        header_string(&mut cmdline, arg);
    }

    let table_size = 3 * 16;
    let mut section_offset = file.len() as u64 + table_size;
    for section in [&hostname, &arch, &cmdline] {
        file.write_u64::<LE>(section_offset).unwrap();
        file.write_u64::<LE>(section.len() as u64).unwrap();
        section_offset += section.len() as u64;
    }
    for section in [&hostname, &arch, &cmdline] {
        file.write_all(section).unwrap();
    }
    file
}

#[test]
fn reads_header_and_attributes() {
    let file = build_file(&data_section());
    let perf_file = PerfFile::parse(Cursor::new(&file[..])).unwrap();

    assert_eq!(perf_file.endian(), Endianness::LittleEndian);
    let features: Vec<_> = perf_file.features().iter().collect();
    assert_eq!(
        features,
        vec![Feature::HOSTNAME, Feature::ARCH, Feature::CMDLINE]
    );
    assert_eq!(perf_file.hostname().unwrap().as_deref(), Some("buildbox"));
    assert_eq!(perf_file.arch().unwrap().as_deref(), Some("x86_64"));
    assert_eq!(perf_file.os_release().unwrap(), None);
    assert_eq!(
        perf_file.cmdline().unwrap(),
        Some(vec![
            "perf".to_string(),
            "record".to_string(),
            "sleep".to_string()
        ])
    );

    let attributes = perf_file.attributes();
    assert_eq!(attributes.attributes().len(), 2);
    assert_eq!(attributes.sample_id_offset(), Some(0));
    assert_eq!(attributes.attributes()[0].ids(), &[100, 101]);
    assert_eq!(attributes.attributes()[1].ids(), &[200]);
    assert_eq!(attributes.attributes()[0].sample_format, sample_format());
    assert_eq!(attributes.lookup(101).unwrap(), 0);
    assert_eq!(attributes.lookup(200).unwrap(), 1);
}

#[test]
fn reads_records_in_file_order() {
    let file = build_file(&data_section());
    let mut perf_file = PerfFile::parse(Cursor::new(&file[..])).unwrap();
    let mut records = perf_file.records().unwrap();

    match records.next_record().unwrap() {
        Some(Record::Comm(comm)) => {
            assert!(comm.is_exec);
            assert_eq!(comm.pid, 1234);
            assert_eq!(comm.name, b"sleep");
        }
        other => panic!("expected COMM, got {:?}", other),
    }

    match records.next_record().unwrap() {
        Some(Record::Sample(sample)) => {
            assert_eq!(sample.attr_index, 0);
            assert_eq!(sample.cpu_mode, CpuMode::User);
            assert!(!sample.exact_ip);
            assert_eq!(sample.ip, 0x5555_0000_1000);
            assert_eq!((sample.pid, sample.tid), (1234, 1235));
            assert_eq!(sample.timestamp, 1_000_000);
            assert_eq!(sample.period, 4000);
        }
        other => panic!("expected SAMPLE, got {:?}", other),
    }

    match records.next_record().unwrap() {
        Some(Record::Sample(sample)) => {
            assert_eq!(sample.attr_index, 1);
            assert_eq!(sample.cpu_mode, CpuMode::Kernel);
            assert!(sample.exact_ip);
            assert_eq!(sample.ip, 0xffff_ffff_8100_0000);
            assert_eq!(sample.period, 1);
        }
        other => panic!("expected SAMPLE, got {:?}", other),
    }

    match records.next_record().unwrap() {
        Some(Record::Exit(exit)) => {
            assert_eq!(exit.pid, 1234);
            assert_eq!(exit.ppid, 1);
            assert_eq!(exit.timestamp, 2_000_000);
        }
        other => panic!("expected EXIT, got {:?}", other),
    }

    // The feature section table after the data section is not read as records.
    assert!(records.next_record().unwrap().is_none());
    assert!(records.error().is_none());
}

#[test]
fn records_can_be_read_twice() {
    let file = build_file(&data_section());
    let mut perf_file = PerfFile::parse(Cursor::new(&file[..])).unwrap();
    for _ in 0..2 {
        let mut records = perf_file.records().unwrap();
        let mut kinds = Vec::new();
        while let Some(record) = records.next_record().unwrap() {
            kinds.push(record.record_type());
        }
        assert_eq!(
            kinds,
            vec![
                RecordType::COMM,
                RecordType::SAMPLE,
                RecordType::SAMPLE,
                RecordType::EXIT
            ]
        );
    }
}

#[test]
fn sample_with_unknown_id_stops_iteration() {
    let mut data = Vec::new();
    write_record(&mut data, 9, 2, &sample_payload(999, 1, 1, 1, 1, 1));
    write_record(&mut data, 9, 2, &sample_payload(100, 1, 1, 1, 1, 1));
    let file = build_file(&data);
    let mut perf_file = PerfFile::parse(Cursor::new(&file[..])).unwrap();
    let mut records = perf_file.records().unwrap();

    assert!(matches!(
        records.next_record(),
        Err(Error::UnknownAttributeId(999))
    ));
    assert!(records.next_record().unwrap().is_none());
    assert!(matches!(
        records.error(),
        Some(Error::UnknownAttributeId(999))
    ));
}

#[test]
fn rejects_unknown_magic() {
    let mut file = build_file(&data_section());
    file[..8].copy_from_slice(b"PERFFILE");
    assert!(matches!(
        PerfFile::parse(Cursor::new(&file[..])),
        Err(Error::UnrecognizedMagicValue(magic)) if &magic == b"PERFFILE"
    ));
}
