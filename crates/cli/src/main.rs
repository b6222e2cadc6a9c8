//! # CLI - Basalt Interactive Shell
//!
//! A REPL over the Basalt engine. Reads commands from stdin and prints
//! replies to stdout; usable interactively or scripted through a pipe.
//! Log output goes to stderr.
//!
//! ## Commands
//!
//! ```text
//! PUT key value                              Log a put and apply it
//! DEL key                                    Log a delete and apply it
//! GET key                                    Look up a key (value or "(nil)")
//! ROTATE                                     Switch to a new WAL
//! ADDFILE level number size smallest largest Record a table in the MANIFEST
//! DELFILE level number                       Remove a table from the MANIFEST
//! FILES                                      List live tables
//! DUMPWAL number                             Print the entries of a WAL
//! DUMPMANIFEST                               Print the edits of the MANIFEST
//! CLEAN                                      Delete obsolete files
//! STATS                                      Print engine and recovery info
//! EXIT / QUIT                                Shut down
//! ```
//!
//! ## Configuration
//!
//! ```text
//! BASALT_DB_DIR            database directory     (default: "data/basalt")
//! BASALT_CREATE_IF_MISSING create on open         (default: true)
//! BASALT_ERROR_IF_EXISTS   fail if db exists      (default: false)
//! BASALT_PARANOID_CHECKS   strict WAL recovery    (default: false)
//! BASALT_VERIFY_CHECKSUMS  verify record CRCs     (default: true)
//! BASALT_WAL_SYNC          fsync every WAL append (default: true)
//! BASALT_COMPARATOR        comparator name
//! BASALT_LOG               tracing filter         (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! Basalt started (dir=data/basalt, seq=0, wal=3)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

mod dump;
mod shell;

use anyhow::Result;
use config::Config;
use shell::{Flow, Shell};
use std::io::{self, BufRead, Write};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("BASALT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::from_env();
    let dir = config.db_dir.display().to_string();
    let mut shell = Shell::open(config)?;

    println!(
        "Basalt started (dir={}, seq={}, wal={})",
        dir,
        shell.engine().last_sequence(),
        shell.engine().wal_number()
    );
    println!("Commands: PUT key value | GET key | DEL key | ROTATE | FILES | STATS");
    println!("          ADDFILE level number size smallest largest | DELFILE level number");
    println!("          DUMPWAL number | DUMPMANIFEST | CLEAN | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if shell.execute(&line, &mut stdout)? == Flow::Exit {
            break;
        }
        print!("> ");
        stdout.flush().ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests;
