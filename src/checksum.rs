//! # Checksum ledger
//!
//! Computes SHA-256 content digests for container files, persists them as a
//! sidecar ledger (`path<TAB>hexdigest`, one line per file), and re-verifies
//! files against a saved ledger. Verification always recomputes every digest
//! from the file bytes — nothing is trusted from earlier runs — and reports
//! a status per entry instead of stopping at the first problem.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Errors raised while computing, saving, or loading a ledger.
///
/// Per-file mismatches and missing files are verification *outcomes*, not
/// errors; see [`VerifyStatus`].
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// A file could not be read
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// A ledger line is not `path<TAB>hexdigest`
    #[error("malformed ledger line {line} in '{path}'")]
    MalformedLine {
        /// Ledger path
        path: PathBuf,
        /// One-based line number
        line: usize,
    },
}

/// One ledger entry: a covered file and its hex digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Covered file, absolute or relative to the ledger's directory
    pub path: PathBuf,
    /// 64-hex-character SHA-256 digest
    pub digest: String,
}

/// Verification status of one ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyStatus {
    /// Recomputed digest matches the ledger
    Ok,
    /// File exists but its content digest differs
    Mismatch {
        /// Digest recorded in the ledger
        expected: String,
        /// Digest recomputed from the file
        actual: String,
    },
    /// File referenced by the ledger does not exist
    Missing,
}

impl VerifyStatus {
    /// True only for [`VerifyStatus::Ok`].
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for VerifyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Mismatch { .. } => write!(f, "MISMATCH"),
            Self::Missing => write!(f, "MISSING"),
        }
    }
}

/// Verification outcome of one ledger entry.
#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    /// Covered file, as recorded in the ledger
    pub path: PathBuf,
    /// Status after recomputing the digest
    pub status: VerifyStatus,
}

/// Computes the SHA-256 digest of a file's full content.
pub fn file_digest(path: &Path) -> Result<String, ChecksumError> {
    let file = File::open(path).map_err(|source| ChecksumError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer).map_err(|source| ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let digest = hasher.finalize();
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Computes one ledger entry per given file, in order.
pub fn compute(paths: &[PathBuf]) -> Result<Vec<LedgerEntry>, ChecksumError> {
    paths
        .iter()
        .map(|path| {
            Ok(LedgerEntry {
                path: path.clone(),
                digest: file_digest(path)?,
            })
        })
        .collect()
}

/// Writes a ledger file, one `path<TAB>hexdigest` line per entry.
pub fn save(entries: &[LedgerEntry], ledger_path: &Path) -> Result<(), ChecksumError> {
    let mut file = File::create(ledger_path).map_err(|source| ChecksumError::Io {
        path: ledger_path.to_path_buf(),
        source,
    })?;
    for entry in entries {
        writeln!(file, "{}\t{}", entry.path.display(), entry.digest).map_err(|source| {
            ChecksumError::Io {
                path: ledger_path.to_path_buf(),
                source,
            }
        })?;
    }
    Ok(())
}

/// Loads a ledger file back into entries.
pub fn load(ledger_path: &Path) -> Result<Vec<LedgerEntry>, ChecksumError> {
    let file = File::open(ledger_path).map_err(|source| ChecksumError::Io {
        path: ledger_path.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| ChecksumError::Io {
            path: ledger_path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let (path, digest) = line
            .split_once('\t')
            .filter(|(path, digest)| !path.is_empty() && digest.len() == 64)
            .ok_or(ChecksumError::MalformedLine {
                path: ledger_path.to_path_buf(),
                line: index + 1,
            })?;
        entries.push(LedgerEntry {
            path: PathBuf::from(path),
            digest: digest.to_string(),
        });
    }
    Ok(entries)
}

/// Path form under which `file` should be recorded in a ledger at
/// `ledger_path`: relative to the ledger's directory when the file lives
/// under it, absolute otherwise.
pub fn ledger_entry_path(file: &Path, ledger_path: &Path) -> PathBuf {
    let ledger_dir = ledger_path.parent().unwrap_or_else(|| Path::new("."));
    if let (Ok(file_abs), Ok(dir_abs)) = (file.canonicalize(), ledger_dir.canonicalize()) {
        if let Ok(relative) = file_abs.strip_prefix(&dir_abs) {
            return relative.to_path_buf();
        }
        return file_abs;
    }
    file.to_path_buf()
}

/// Re-verifies every entry of a saved ledger.
///
/// Relative entry paths resolve against the ledger's own directory. Every
/// entry is checked; a mismatch or missing file never aborts the run.
pub fn verify(ledger_path: &Path) -> Result<Vec<VerifyOutcome>, ChecksumError> {
    let entries = load(ledger_path)?;
    let root = ledger_path.parent().unwrap_or_else(|| Path::new("."));

    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        let resolved = if entry.path.is_absolute() {
            entry.path.clone()
        } else {
            root.join(&entry.path)
        };

        let status = if !resolved.is_file() {
            VerifyStatus::Missing
        } else {
            let actual = file_digest(&resolved)?;
            if actual == entry.digest {
                VerifyStatus::Ok
            } else {
                VerifyStatus::Mismatch {
                    expected: entry.digest.clone(),
                    actual,
                }
            }
        };

        outcomes.push(VerifyOutcome {
            path: entry.path,
            status,
        });
    }
    Ok(outcomes)
}
