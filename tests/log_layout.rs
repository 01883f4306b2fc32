use logslice::core::header::{MessageHeader, HEADER_SIZE, RECORD_ALIGN, TOPIC_TYPE_ID};
use logslice::core::mmap::MmapView;
use logslice::core::segment_store::{read_segment_header, SEG_DATA_OFFSET, SEG_MAGIC, SEG_VERSION};
use logslice::core::topic::decode_declaration;
use logslice::core::{LogReader, LogWriter, Timestamp};
use tempfile::tempdir;

const TEST_SEGMENT_SIZE: usize = 64 * 1024;

fn read_header(map: &[u8], offset: usize) -> MessageHeader {
    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(&map[offset..offset + HEADER_SIZE]);
    MessageHeader::from_bytes(&buf).expect("header parse")
}

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[test]
fn first_write_declares_topic_in_band() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("recording");

    let mut writer = LogWriter::create(&log_path, TEST_SEGMENT_SIZE).expect("log create");
    writer
        .write("/imu", Timestamp::from_nanos(42), b"alpha")
        .expect("write alpha");
    writer
        .write("/imu", Timestamp::from_nanos(43), b"bravo-bravo")
        .expect("write bravo");
    writer.finish().expect("finish");
    assert_eq!(writer.records_written(), 2);
    assert_eq!(writer.segments_written(), 1);

    let segment_path = log_path.join("000000000.q");
    assert!(!log_path.join("000000000.q.tmp").exists());
    let mmap = MmapView::open(&segment_path).expect("mmap open");
    assert_eq!(mmap.len(), TEST_SEGMENT_SIZE);

    let seg = read_segment_header(mmap.as_slice()).expect("segment header");
    assert_eq!(seg.magic, SEG_MAGIC);
    assert_eq!(seg.version, SEG_VERSION);
    assert_eq!(seg.segment_id, 0);
    assert!(seg.is_sealed());

    // Declaration, then the two data records.
    let decl_offset = SEG_DATA_OFFSET;
    let decl = read_header(mmap.as_slice(), decl_offset);
    assert_eq!(decl.type_id, TOPIC_TYPE_ID);
    assert_eq!(decl.seq, 0);
    assert_eq!(decl.timestamp_ns, 42);
    let decl_len = MessageHeader::payload_len_from_commit(decl.commit_len).expect("decl len");
    let decl_payload = &mmap.as_slice()[decl_offset + HEADER_SIZE..][..decl_len];
    decl.validate_crc(decl_payload).expect("decl crc");
    assert_eq!(decode_declaration(decl_payload).expect("decode"), (0, "/imu"));

    let first_offset = decl_offset + align_up(HEADER_SIZE + decl_len, RECORD_ALIGN);
    let first = read_header(mmap.as_slice(), first_offset);
    assert_eq!(first.type_id, 0);
    assert_eq!(first.seq, 1);
    assert_eq!(first.commit_len, 6);
    assert_eq!(
        &mmap.as_slice()[first_offset + HEADER_SIZE..][..5],
        b"alpha"
    );

    let second_offset = first_offset + align_up(HEADER_SIZE + 5, RECORD_ALIGN);
    let second = read_header(mmap.as_slice(), second_offset);
    assert_eq!(second.seq, 2);
    assert_eq!(second.timestamp_ns, 43);
    assert_eq!(second.commit_len, 12);

    let end_offset = second_offset + align_up(HEADER_SIZE + 11, RECORD_ALIGN);
    assert_eq!(read_header(mmap.as_slice(), end_offset).commit_len, 0);
}

#[test]
fn rollover_reads_back_in_order() {
    let dir = tempdir().expect("tempdir");
    let log_path = dir.path().join("recording");

    let payload = vec![0x5Au8; 4000];
    let mut writer = LogWriter::create(&log_path, 16 * 1024).expect("log create");
    for i in 0..20u64 {
        let topic = if i % 2 == 0 { "/even" } else { "/odd" };
        writer
            .write(topic, Timestamp::from_nanos(i), &payload)
            .expect("write");
    }
    writer.finish().expect("finish");
    assert!(writer.segments_written() > 1);

    let mut reader = LogReader::open(&log_path).expect("reader open");
    assert_eq!(reader.segments().len() as u64, writer.segments_written());
    let mut seen = Vec::new();
    while let Some(record) = reader.next().expect("next") {
        assert_eq!(record.payload.len(), payload.len());
        seen.push((record.topic.to_string(), record.timestamp.as_nanos()));
    }
    let expected: Vec<_> = (0..20u64)
        .map(|i| {
            let topic = if i % 2 == 0 { "/even" } else { "/odd" };
            (topic.to_string(), i)
        })
        .collect();
    assert_eq!(seen, expected);
    assert_eq!(reader.topics().len(), 2);
}
