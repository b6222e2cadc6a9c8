use crate::filename::{self, descriptor_file_name, read_current_file};
use crate::*;
use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tempfile::tempdir;
use wal::LogWriter;

const CMP: &str = "basalt.BytewiseComparator";

fn file(number: u64) -> FileMetaData {
    FileMetaData::new(number, 1000, b"a".to_vec(), b"z".to_vec())
}

/// Creates a database in `dir` and returns a recovered version set.
fn fresh(dir: &Path) -> Result<VersionSet> {
    VersionSet::new(dir, CMP).create_new_db()?;
    reopen(dir)
}

fn reopen(dir: &Path) -> Result<VersionSet> {
    let mut vs = VersionSet::new(dir, CMP);
    vs.recover()?;
    Ok(vs)
}

// -------------------- Create & recover --------------------

#[test]
fn new_db_recovers_initial_counters() -> Result<()> {
    let dir = tempdir()?;
    VersionSet::new(dir.path(), CMP).create_new_db()?;

    assert!(descriptor_file_name(dir.path(), 1).exists());
    assert_eq!(read_current_file(dir.path())?, "MANIFEST-000001");

    let mut vs = VersionSet::new(dir.path(), CMP);
    assert!(vs.recover()?);
    assert_eq!(vs.manifest_file_number(), 2);
    assert_eq!(vs.next_file_number(), 3);
    assert_eq!(vs.last_sequence(), 0);
    assert_eq!(vs.log_number(), 0);
    assert_eq!(vs.prev_log_number(), 0);
    assert_eq!(vs.num_level_files(0), 0);
    assert!(vs.live_files().is_empty());
    Ok(())
}

#[test]
fn first_apply_starts_new_manifest() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;

    let number = vs.new_file_number();
    assert_eq!(number, 3);
    let mut edit = VersionEdit::new();
    edit.add_file(0, file(number));
    vs.log_and_apply(&mut edit)?;

    assert_eq!(read_current_file(dir.path())?, "MANIFEST-000002");
    assert_eq!(edit.next_file_number(), Some(4));
    assert_eq!(edit.log_number(), Some(0));
    assert_eq!(vs.num_level_files(0), 1);
    assert!(vs.live_files().contains(&3));
    Ok(())
}

#[test]
fn applied_edits_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut vs = fresh(dir.path())?;
        let a = vs.new_file_number();
        let b = vs.new_file_number();
        let mut edit = VersionEdit::new();
        edit.add_file(0, file(a));
        edit.add_file(1, file(b).with_seqnos(1, 50));
        vs.set_last_sequence(50);
        vs.log_and_apply(&mut edit)?;

        let mut edit = VersionEdit::new();
        edit.delete_file(0, a);
        vs.set_last_sequence(75);
        vs.log_and_apply(&mut edit)?;
    }

    let vs = reopen(dir.path())?;
    assert_eq!(vs.last_sequence(), 75);
    assert_eq!(vs.num_level_files(0), 0);
    assert_eq!(vs.num_level_files(1), 1);
    let level1 = vs.current(0).unwrap().level(1);
    assert_eq!(level1[&4].largest_seqno, 50);
    // manifest 2 held next_file 5; it becomes manifest 5
    assert_eq!(vs.manifest_file_number(), 5);
    assert_eq!(vs.next_file_number(), 6);
    Ok(())
}

#[test]
fn each_reopen_writes_a_snapshot_manifest() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut vs = fresh(dir.path())?;
        let n = vs.new_file_number();
        let mut edit = VersionEdit::new();
        edit.add_file(2, file(n));
        vs.log_and_apply(&mut edit)?;
    }
    {
        let mut vs = reopen(dir.path())?;
        let manifest = vs.manifest_file_number();
        vs.log_and_apply(&mut VersionEdit::new())?;
        assert_eq!(
            read_current_file(dir.path())?,
            format!("MANIFEST-{:06}", manifest)
        );
    }

    // the new manifest alone is enough to rebuild the files
    let vs = reopen(dir.path())?;
    assert_eq!(vs.num_level_files(2), 1);
    assert!(vs.live_files().contains(&3));
    Ok(())
}

#[test]
fn log_numbers_are_recorded() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut vs = fresh(dir.path())?;
        let log = vs.new_file_number();
        let mut edit = VersionEdit::new();
        edit.set_log_number(log);
        edit.set_prev_log_number(0);
        vs.log_and_apply(&mut edit)?;
        assert_eq!(vs.log_number(), log);
    }

    let vs = reopen(dir.path())?;
    assert_eq!(vs.log_number(), 3);
    assert!(vs.next_file_number() > 3);
    Ok(())
}

#[test]
fn recovered_log_number_is_never_reallocated() -> Result<()> {
    let dir = tempdir()?;
    // a manifest whose log number is at or past its next-file counter
    let mut edit = VersionEdit::new();
    edit.set_comparator_name(CMP);
    edit.set_log_number(9);
    edit.set_prev_log_number(12);
    edit.set_next_file_number(5);
    edit.set_last_sequence(0);
    write_raw_manifest(dir.path(), &[edit.encode()])?;

    let mut vs = reopen(dir.path())?;
    assert_eq!(vs.manifest_file_number(), 13);
    assert!(vs.new_file_number() > 13);
    Ok(())
}

// -------------------- Validation --------------------

#[test]
fn log_number_out_of_range_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;

    let mut edit = VersionEdit::new();
    edit.set_log_number(vs.next_file_number() + 5);
    let err = vs.log_and_apply(&mut edit).unwrap_err();
    assert!(err.to_string().contains("out of range"));

    // nothing was written
    assert!(!descriptor_file_name(dir.path(), vs.manifest_file_number()).exists());
    assert_eq!(read_current_file(dir.path())?, "MANIFEST-000001");
    Ok(())
}

#[test]
fn comparator_mismatch_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    VersionSet::new(dir.path(), CMP).create_new_db()?;

    let mut vs = VersionSet::new(dir.path(), "other.Comparator");
    let err = vs.recover().unwrap_err();
    assert!(err.to_string().contains("does not match"));
    Ok(())
}

#[test]
fn missing_current_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    assert!(VersionSet::new(dir.path(), CMP).recover().is_err());
    Ok(())
}

#[test]
fn corrupted_manifest_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    VersionSet::new(dir.path(), CMP).create_new_db()?;

    let path = descriptor_file_name(dir.path(), 1);
    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes)?;

    let err = VersionSet::new(dir.path(), CMP).recover().unwrap_err();
    assert!(format!("{:#}", err).contains("corrupted manifest"));
    Ok(())
}

#[test]
fn torn_manifest_tail_is_tolerated() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut vs = fresh(dir.path())?;
        let n = vs.new_file_number();
        let mut edit = VersionEdit::new();
        edit.add_file(0, file(n));
        vs.log_and_apply(&mut edit)?;

        let mut edit = VersionEdit::new();
        edit.delete_file(0, n);
        vs.log_and_apply(&mut edit)?;
    }

    // a crash in the middle of appending the delete
    let path = descriptor_file_name(dir.path(), 2);
    let len = fs::metadata(&path)?.len();
    OpenOptions::new().write(true).open(&path)?.set_len(len - 2)?;

    let vs = reopen(dir.path())?;
    assert_eq!(vs.num_level_files(0), 1);
    Ok(())
}

#[test]
fn undecodable_edit_fails_recovery() -> Result<()> {
    let dir = tempdir()?;
    let mut edit = VersionEdit::new();
    edit.set_comparator_name(CMP);
    edit.set_log_number(0);
    edit.set_next_file_number(2);
    edit.set_last_sequence(0);
    write_raw_manifest(dir.path(), &[edit.encode(), vec![5, 1]])?;

    let err = VersionSet::new(dir.path(), CMP).recover().unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("edit #1"), "{}", msg);
    assert!(msg.contains("unknown tag"), "{}", msg);
    Ok(())
}

#[test]
fn missing_counters_fail_recovery() -> Result<()> {
    let cases = [
        ("next", "no meta-nextfile entry"),
        ("log", "no meta-lognumber entry"),
        ("seq", "no last-sequence-number entry"),
    ];
    for (missing, expected) in cases {
        let dir = tempdir()?;
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(CMP);
        if missing != "next" {
            edit.set_next_file_number(2);
        }
        if missing != "log" {
            edit.set_log_number(0);
        }
        if missing != "seq" {
            edit.set_last_sequence(0);
        }
        write_raw_manifest(dir.path(), &[edit.encode()])?;

        let err = VersionSet::new(dir.path(), CMP).recover().unwrap_err();
        assert!(err.to_string().contains(expected), "{}", err);
    }
    Ok(())
}

// -------------------- Column families --------------------

#[test]
fn column_families_are_created_and_dropped() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut vs = fresh(dir.path())?;
        let mut edit = VersionEdit::new();
        edit.set_column_family(1);
        edit.add_column_family("users");
        vs.log_and_apply(&mut edit)?;
        assert_eq!(vs.max_column_family(), 1);

        let n = vs.new_file_number();
        let mut edit = VersionEdit::new();
        edit.set_column_family(1);
        edit.add_file(0, file(n));
        vs.log_and_apply(&mut edit)?;
    }
    {
        let mut vs = reopen(dir.path())?;
        let families = vs.column_families();
        assert_eq!(families.get(&0).map(String::as_str), Some("default"));
        assert_eq!(families.get(&1).map(String::as_str), Some("users"));
        assert_eq!(vs.current(1).unwrap().num_level_files(0), 1);
        assert_eq!(vs.num_level_files(0), 0);
        assert_eq!(vs.column_family(1).unwrap().name(), "users");

        let mut edit = VersionEdit::new();
        edit.set_column_family(1);
        edit.drop_column_family();
        vs.log_and_apply(&mut edit)?;
        assert!(vs.current(1).is_none());
    }

    let vs = reopen(dir.path())?;
    assert_eq!(vs.column_families().len(), 1);
    assert_eq!(vs.max_column_family(), 1);
    assert!(vs.live_files().is_empty());
    Ok(())
}

#[test]
fn edit_for_unknown_column_family_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;
    let mut edit = VersionEdit::new();
    edit.set_column_family(5);
    edit.add_file(0, file(3));
    assert!(vs.log_and_apply(&mut edit).is_err());
    assert!(vs.live_files().is_empty());
    Ok(())
}

#[test]
fn default_column_family_cannot_be_dropped() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;
    let mut edit = VersionEdit::new();
    edit.drop_column_family();
    assert!(vs.log_and_apply(&mut edit).is_err());
    assert_eq!(vs.column_families().len(), 1);
    Ok(())
}

// -------------------- File numbers --------------------

#[test]
fn file_number_allocation() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;

    let a = vs.new_file_number();
    let b = vs.new_file_number();
    assert_eq!(b, a + 1);

    vs.reuse_file_number(a);
    assert_eq!(vs.next_file_number(), b + 1, "only the last number can be reused");
    vs.reuse_file_number(b);
    assert_eq!(vs.new_file_number(), b);

    vs.mark_file_number_used(100)?;
    assert_eq!(vs.new_file_number(), 101);
    vs.mark_file_number_used(50)?;
    assert_eq!(vs.new_file_number(), 102);
    Ok(())
}

#[test]
fn huge_file_numbers_are_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;
    let next = vs.next_file_number();

    for number in [u64::MAX, u64::MAX - 1, MAX_FILE_NUMBER] {
        let err = vs.mark_file_number_used(number).unwrap_err();
        assert!(err.to_string().contains("out of range"), "{:#}", err);
    }
    assert_eq!(vs.next_file_number(), next);

    vs.mark_file_number_used(MAX_FILE_NUMBER - 1)?;
    assert_eq!(vs.next_file_number(), MAX_FILE_NUMBER);

    // reuse never wraps around
    vs.reuse_file_number(u64::MAX);
    assert_eq!(vs.next_file_number(), MAX_FILE_NUMBER);
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn failed_manifest_append_moves_to_a_new_manifest() -> Result<()> {
    let dir = tempdir()?;
    let mut vs = fresh(dir.path())?;
    vs.log_and_apply(&mut VersionEdit::new())?;
    let old_manifest = vs.manifest_file_number();

    // every write to /dev/full fails with ENOSPC
    vs.descriptor_log = Some(LogWriter::open_append("/dev/full")?);
    let lost = vs.new_file_number();
    let mut edit = VersionEdit::new();
    edit.add_file(0, file(lost));
    assert!(vs.log_and_apply(&mut edit).is_err());
    assert!(!vs.live_files().contains(&lost));
    assert_ne!(vs.manifest_file_number(), old_manifest);

    let kept = vs.new_file_number();
    let mut edit = VersionEdit::new();
    edit.add_file(0, file(kept));
    vs.log_and_apply(&mut edit)?;
    assert_eq!(
        read_current_file(dir.path())?,
        format!("MANIFEST-{:06}", vs.manifest_file_number())
    );

    let vs = reopen(dir.path())?;
    assert_eq!(vs.live_files().into_iter().collect::<Vec<_>>(), vec![kept]);
    Ok(())
}

#[test]
fn debug_output_names_the_set() -> Result<()> {
    let dir = tempdir()?;
    let vs = fresh(dir.path())?;
    let dbg = format!("{:?}", vs);
    assert!(dbg.contains("VersionSet"));
    assert!(dbg.contains("next_file_number"));
    Ok(())
}

/// Writes `records` as MANIFEST-000001 and points CURRENT at it.
fn write_raw_manifest(dir: &Path, records: &[Vec<u8>]) -> Result<()> {
    let mut w = LogWriter::create(descriptor_file_name(dir, 1))?;
    for r in records {
        w.add_record(r)?;
    }
    w.sync()?;
    filename::set_current_file(dir, 1)?;
    Ok(())
}
