use std::path::PathBuf;

use anyhow::{bail, Result};

use rowpack::checksum::{self, LedgerEntry, VerifyStatus};
use rowpack::discover;
use rowpack::format::LEDGER_EXT;

pub fn run(input: Vec<PathBuf>, recursive: bool, save: Option<PathBuf>) -> Result<()> {
    // A single .sha256 input switches to verification mode
    let is_ledger = input.len() == 1
        && input[0]
            .extension()
            .is_some_and(|ext| ext == LEDGER_EXT);

    if is_ledger {
        if save.is_some() {
            eprintln!("warning: --save is ignored when verifying a ledger");
        }
        return verify(&input[0]);
    }

    let files = discover::collect_containers(&input, recursive)?;
    if files.is_empty() {
        bail!(
            "0 container files found; use --recursive if you intended a recursive search"
        );
    }

    match save {
        Some(ledger_path) => {
            let ledger_path = rowpack::builder::ensure_extension(&ledger_path, LEDGER_EXT);
            let mut entries = Vec::with_capacity(files.len());
            for file in &files {
                let entry = LedgerEntry {
                    path: checksum::ledger_entry_path(file, &ledger_path),
                    digest: checksum::file_digest(file)?,
                };
                println!("{}\t{}", entry.path.display(), entry.digest);
                entries.push(entry);
            }
            checksum::save(&entries, &ledger_path)?;
            println!("Checksum ledger saved to '{}'", ledger_path.display());
        }
        None => {
            for file in &files {
                println!("{}\t{}", file.display(), checksum::file_digest(file)?);
            }
        }
    }
    Ok(())
}

fn verify(ledger: &std::path::Path) -> Result<()> {
    println!("Verifying checksums in '{}' ...", ledger.display());

    let outcomes = checksum::verify(ledger)?;
    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.status {
            VerifyStatus::Ok => println!("{}\t[OK]", outcome.path.display()),
            VerifyStatus::Mismatch { expected, actual } => {
                failures += 1;
                eprintln!(
                    "{}\t[MISMATCH]\n  - Saved:      {expected}\n  - Calculated: {actual}",
                    outcome.path.display()
                );
            }
            VerifyStatus::Missing => {
                failures += 1;
                eprintln!("{}\t[MISSING]", outcome.path.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} file(s) failed verification", outcomes.len());
    }
    println!("All {} file(s) verified", outcomes.len());
    Ok(())
}
