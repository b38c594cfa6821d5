//! CSV manifest loading.
//!
//! A manifest is the tabular row source for a pack run: a header of column
//! names followed by one row per data point. Row order defines the row index,
//! which in turn determines partition membership, so rows are kept exactly in
//! file order.

use std::path::{Path, PathBuf};

/// Errors raised while loading a manifest file.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read
    #[error("failed to read manifest '{path}': {source}")]
    Io {
        /// Manifest path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The manifest file is not well-formed CSV
    #[error("failed to parse manifest '{path}': {source}")]
    Csv {
        /// Manifest path
        path: PathBuf,
        /// Underlying CSV failure
        source: csv::Error,
    },
}

/// An in-memory manifest: header plus ordered raw string rows.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Manifest {
    /// Loads a manifest from a CSV file with a header row.
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(|source| ManifestError::Csv {
                path: path.to_path_buf(),
                source,
            })?;

        let header = reader
            .headers()
            .map_err(|source| ManifestError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| ManifestError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }

    /// Builds a manifest directly from parts (used by tests and unpacking).
    pub fn from_parts(path: PathBuf, header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { path, header, rows }
    }

    /// The file this manifest was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory raw file paths inside the manifest are relative to.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Column names in header order.
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Index of a column in the header, if present.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.header.iter().position(|name| name == column)
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The raw cell value at `(row, column_index)`.
    pub fn value(&self, row: usize, column_index: usize) -> &str {
        &self.rows[row][column_index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "filepath,split,snr").unwrap();
        writeln!(file, "a.wav,train,1.5").unwrap();
        writeln!(file, "b.wav,val,-3.0").unwrap();
        drop(file);

        let manifest = Manifest::from_path(&path).unwrap();
        assert_eq!(manifest.header(), ["filepath", "split", "snr"]);
        assert_eq!(manifest.row_count(), 2);
        assert_eq!(manifest.column_index("split"), Some(1));
        assert_eq!(manifest.column_index("missing"), None);
        assert_eq!(manifest.value(0, 1), "train");
        assert_eq!(manifest.value(1, 2), "-3.0");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Manifest::from_path(Path::new("/no/such/manifest.csv")).unwrap_err();
        assert!(err.to_string().contains("/no/such/manifest.csv"));
    }
}
