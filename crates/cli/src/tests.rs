use crate::dump::{dump_manifest, dump_wal};
use crate::shell::{Flow, Shell};
use anyhow::Result;
use config::Config;
use std::path::Path;
use tempfile::tempdir;

fn open(dir: &Path) -> Result<Shell> {
    Shell::open(Config::new(dir))
}

/// Runs `commands` (one per line) and returns everything printed.
fn run(shell: &mut Shell, commands: &str) -> Result<String> {
    let mut out = Vec::new();
    for line in commands.lines() {
        if shell.execute(line, &mut out)? == Flow::Exit {
            break;
        }
    }
    Ok(String::from_utf8(out)?)
}

// -------------------- Data commands --------------------

#[test]
fn put_get_del() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;

    let out = run(&mut shell, "PUT k hello world\nGET k\nDEL k\nGET k\n")?;
    assert_eq!(out, "OK\nhello world\nOK\n(nil)\n");
    Ok(())
}

#[test]
fn commands_are_case_insensitive() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "put a 1\nget a\n")?;
    assert_eq!(out, "OK\n1\n");
    Ok(())
}

#[test]
fn usage_errors() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;

    let out = run(&mut shell, "PUT k\nDEL\nGET a b\nDUMPWAL x\nADDFILE 0 1\nDELFILE a 1\n")?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        vec![
            "ERR usage: PUT key value",
            "ERR usage: DEL key",
            "ERR usage: GET key",
            "ERR usage: DUMPWAL number",
            "ERR usage: ADDFILE level number size smallest largest",
            "ERR usage: DELFILE level number",
        ]
    );
    Ok(())
}

#[test]
fn blank_lines_and_unknown_commands() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "\n   \nFROB x\n")?;
    assert_eq!(out, "unknown command: FROB\n");
    Ok(())
}

#[test]
fn exit_stops_processing() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "QUIT\nPUT a 1\n")?;
    assert_eq!(out, "bye\n");
    assert_eq!(run(&mut shell, "GET a\n")?, "(nil)\n");
    Ok(())
}

#[test]
fn data_survives_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut shell = open(dir.path())?;
        run(&mut shell, "PUT a 1\nPUT b 2\nDEL a\nROTATE\nPUT c 3\n")?;
    }

    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "GET a\nGET b\nGET c\n")?;
    assert_eq!(out, "(nil)\n2\n3\n");
    assert_eq!(shell.engine().last_sequence(), 4);
    Ok(())
}

// -------------------- Manifest commands --------------------

#[test]
fn addfile_and_files() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;

    let out = run(&mut shell, "FILES\nADDFILE 1 40 4096 apple melon\nFILES\n")?;
    assert_eq!(
        out,
        "(no files)\nOK\nL1 #40 4096 bytes ['apple' .. 'melon']\n(1 files)\n"
    );
    // the number can never be handed out again
    assert!(shell.engine().versions().next_file_number() > 40);
    Ok(())
}

#[test]
fn addfile_with_huge_number_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let next = shell.engine().versions().next_file_number();

    let out = run(
        &mut shell,
        "ADDFILE 0 18446744073709551615 10 a b\nADDFILE 0 18446744073709551614 10 a b\nFILES\nPUT k v\n",
    )?;
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4, "{}", out);
    assert!(lines[0].starts_with("ERR addfile failed: file number 18446744073709551615 out of range"));
    assert!(lines[1].starts_with("ERR addfile failed: file number 18446744073709551614 out of range"));
    assert_eq!(&lines[2..], ["(no files)", "OK"]);
    assert_eq!(shell.engine().versions().next_file_number(), next);
    Ok(())
}

#[test]
fn delfile_removes_from_listing() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;

    let out = run(&mut shell, "ADDFILE 0 7 10 a b\nDELFILE 0 7\nFILES\n")?;
    assert_eq!(out, "OK\nOK\n(no files)\n");
    Ok(())
}

#[test]
fn bad_level_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "ADDFILE 7 1 1 a b\nDELFILE 9 1\n")?;
    assert_eq!(out, "ERR level must be below 7\nERR level must be below 7\n");
    Ok(())
}

#[test]
fn files_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut shell = open(dir.path())?;
        run(&mut shell, "ADDFILE 2 30 100 a z\n")?;
    }
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "FILES\n")?;
    assert!(out.contains("L2 #30 100 bytes"));
    Ok(())
}

#[test]
fn clean_reports_removed_files() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    std::fs::write(dir.path().join("000099.sst"), b"orphan")?;

    let out = run(&mut shell, "CLEAN\nCLEAN\n")?;
    assert_eq!(out, "OK (removed 1)\nOK (removed 0)\n");
    Ok(())
}

#[test]
fn stats_prints_engine_state() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "PUT a 1\nSTATS\n")?;
    assert!(out.contains("Engine"));
    assert!(out.contains("last_sequence: 1"));
    assert!(out.contains("RecoveryStats"));
    assert!(out.contains("keys: 1"));
    Ok(())
}

// -------------------- Dumps --------------------

#[test]
fn dumpwal_lists_entries() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let wal = shell.engine().wal_number();
    run(&mut shell, "PUT a 1\nDEL a\n")?;

    let mut out = Vec::new();
    dump_wal(dir.path(), wal, &mut out)?;
    assert_eq!(
        String::from_utf8(out)?,
        "seq 1 PUT a 1\nseq 2 DEL a\n(2 records, 0 corruption events, 0 bytes dropped)\n"
    );
    Ok(())
}

#[test]
fn dumpwal_of_missing_log_is_an_error_line() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    let out = run(&mut shell, "DUMPWAL 999\n")?;
    assert!(out.starts_with("ERR dump failed: failed to open"));
    Ok(())
}

#[test]
fn dumpmanifest_shows_edits() -> Result<()> {
    let dir = tempdir()?;
    let mut shell = open(dir.path())?;
    run(&mut shell, "ADDFILE 0 12 64 k1 k9\n")?;

    let mut out = Vec::new();
    dump_manifest(dir.path(), &mut out)?;
    let text = String::from_utf8(out)?;
    assert!(text.starts_with("MANIFEST-000002\n"));
    assert!(text.contains("Comparator: basalt.BytewiseComparator"));
    assert!(text.contains("AddFile: 0 12 64 'k1' .. 'k9'"));
    assert!(text.contains("corruption events)"));
    Ok(())
}
