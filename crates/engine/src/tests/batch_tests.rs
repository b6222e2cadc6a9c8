use super::Recorder;
use crate::*;

// -------------------- Encoding --------------------

#[test]
fn new_batch_is_just_a_header() {
    let batch = WriteBatch::new();
    assert_eq!(batch.contents(), &[0u8; BATCH_HEADER_SIZE][..]);
    assert_eq!(batch.count(), 0);
    assert_eq!(batch.sequence(), 0);
    assert!(batch.is_empty());
}

#[test]
fn put_and_delete_layout() {
    let mut batch = WriteBatch::new();
    batch.set_sequence(0x0102);
    batch.put(b"k", b"vv");
    batch.delete(b"");

    assert_eq!(
        batch.contents(),
        &[
            0x02, 0x01, 0, 0, 0, 0, 0, 0, // sequence
            2, 0, 0, 0, // count
            1, 1, b'k', 2, b'v', b'v', // put
            0, 0, // delete of the empty key
        ][..]
    );
    assert_eq!(batch.count(), 2);
    assert_eq!(batch.sequence(), 0x0102);
}

#[test]
fn clear_resets_sequence_and_entries() {
    let mut batch = WriteBatch::new();
    batch.set_sequence(9);
    batch.put(b"a", b"1");
    batch.clear();
    assert_eq!(batch, WriteBatch::new());
}

#[test]
fn debug_shows_header() {
    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1");
    let s = format!("{:?}", batch);
    assert!(s.contains("WriteBatch"));
    assert!(s.contains("count: 1"));
}

// -------------------- Iteration --------------------

#[test]
fn iterate_assigns_consecutive_sequences() -> anyhow::Result<()> {
    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1");
    batch.delete(b"b");
    batch.put(b"c", b"");
    batch.set_sequence(100);

    let mut rec = Recorder::default();
    batch.iterate(&mut rec)?;
    assert_eq!(
        rec.ops,
        vec![
            (100, b"a".to_vec(), Some(b"1".to_vec())),
            (101, b"b".to_vec(), None),
            (102, b"c".to_vec(), Some(Vec::new())),
        ]
    );
    Ok(())
}

#[test]
fn from_contents_round_trips() -> anyhow::Result<()> {
    let mut batch = WriteBatch::new();
    batch.put(b"key", b"value");
    batch.set_sequence(7);

    let copy = WriteBatch::from_contents(batch.contents().to_vec())?;
    assert_eq!(copy, batch);
    assert_eq!(copy.sequence(), 7);
    Ok(())
}

#[test]
fn short_record_is_rejected() {
    let err = WriteBatch::from_contents(vec![0; BATCH_HEADER_SIZE - 1]).unwrap_err();
    assert!(err.to_string().contains("too small"));
}

#[test]
fn malformed_entries_are_errors() {
    let header = |count: u8| {
        let mut v = vec![0u8; BATCH_HEADER_SIZE];
        v[8] = count;
        v
    };

    let cases: Vec<(Vec<u8>, &str)> = vec![
        ([header(1), vec![7]].concat(), "unknown WriteBatch tag 7"),
        ([header(1), vec![1, 3, b'a']].concat(), "bad WriteBatch put"),
        ([header(1), vec![1, 1, b'a']].concat(), "bad WriteBatch put"),
        ([header(1), vec![0]].concat(), "bad WriteBatch delete"),
        ([header(2), vec![0, 1, b'a']].concat(), "wrong count"),
        (header(1), "wrong count"),
    ];
    for (data, expected) in cases {
        let batch = WriteBatch::from_contents(data).unwrap();
        let err = batch.iterate(&mut Recorder::default()).unwrap_err();
        assert!(err.to_string().contains(expected), "{} vs {}", err, expected);
    }
}

#[test]
fn entries_before_a_bad_one_are_delivered() {
    let mut batch = WriteBatch::new();
    batch.put(b"good", b"1");
    let mut data = batch.contents().to_vec();
    data[8] = 2;
    data.push(9);

    let mut rec = Recorder::default();
    let batch = WriteBatch::from_contents(data).unwrap();
    assert!(batch.iterate(&mut rec).is_err());
    assert_eq!(rec.keys(), vec![&b"good"[..]]);
}
