use std::collections::HashMap;

use perf_record_decoder::{PerfFile, Record};

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .expect("Usage: perfrecords <perf.data>");
    let file = std::fs::File::open(path).unwrap();
    let reader = std::io::BufReader::new(file);
    let mut perf_file = match PerfFile::parse(reader) {
        Ok(perf_file) => perf_file,
        Err(e) => {
            println!("ERROR when parsing the file: {:?}", e);
            return;
        }
    };

    if let Ok(Some(hostname)) = perf_file.hostname() {
        println!("Hostname: {hostname}");
    }
    if let Ok(Some(os_release)) = perf_file.os_release() {
        println!("OS release: {os_release}");
    }
    if let Ok(Some(arch)) = perf_file.arch() {
        println!("Arch: {arch}");
    }
    if let Ok(Some(cmdline)) = perf_file.cmdline() {
        println!("CmdLine: {cmdline:?}");
    }
    if let Ok(Some(perf_version)) = perf_file.perf_version() {
        println!("Perf version: {perf_version}");
    }
    println!("Features: {:?}", perf_file.features());
    for (attr_index, attr) in perf_file.attributes().attributes().iter().enumerate() {
        println!(
            "Event {attr_index}: {} ({:?}, {} IDs)",
            attr.name().unwrap_or("<unnamed>"),
            attr.sample_format,
            attr.ids().len()
        );
    }
    println!();

    let mut records = perf_file.records().unwrap();
    let mut record_counts = HashMap::new();
    let mut samples_per_event = HashMap::new();
    let mut lost = 0;
    loop {
        let record = match records.next_record() {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(e) => {
                println!("ERROR while reading records: {e}");
                break;
            }
        };
        *record_counts.entry(record.record_type()).or_insert(0u64) += 1;
        match record {
            Record::Sample(sample) => {
                *samples_per_event.entry(sample.attr_index).or_insert(0u64) += 1;
            }
            Record::Lost(l) => lost += l.lost,
            Record::Comm(comm) => {
                println!(
                    "COMM pid={} tid={} {}{}",
                    comm.pid,
                    comm.tid,
                    String::from_utf8_lossy(&comm.name),
                    if comm.is_exec { " (exec)" } else { "" }
                );
            }
            Record::Mmap(mmap) => {
                println!(
                    "MMAP pid={} {:#x}-{:#x} {}",
                    mmap.pid,
                    mmap.address,
                    mmap.address.wrapping_add(mmap.length),
                    String::from_utf8_lossy(&mmap.filename)
                );
            }
            _ => {}
        }
    }

    println!();
    let mut record_counts: Vec<_> = record_counts.into_iter().collect();
    record_counts.sort_by_key(|(record_type, _)| record_type.0);
    for (record_type, count) in record_counts {
        println!("  {record_type:?}: {count}");
    }
    let mut samples_per_event: Vec<_> = samples_per_event.into_iter().collect();
    samples_per_event.sort();
    for (attr_index, count) in samples_per_event {
        println!("  samples for event {attr_index}: {count}");
    }
    if lost != 0 {
        println!("  lost events: {lost}");
    }
}
