//! # Schema loading and resolution
//!
//! A schema file is a TOML document declaring one or more datasets, each with
//! optional string attributes and a `data` table naming the manifest file and
//! the fields to pack:
//!
//! ```toml
//! [datasets.noisy_speech]
//! attrs = { license = "CC-BY-4.0" }
//!
//! [datasets.noisy_speech.data]
//! file = "dataset.csv"
//!
//! [datasets.noisy_speech.data.fields.audio]
//! column = "filepath"
//! parser = "audio_int16"
//!
//! [datasets.noisy_speech.data.fields.split]
//! column = "split"
//! parser = "utf8"
//! ```
//!
//! Resolution validates a raw schema against a manifest header and the parser
//! registry and produces an immutable [`DatasetSpec`]. It is pure with respect
//! to the manifest's data rows: only the header is consulted, so every schema
//! error surfaces before any row-level I/O starts.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::parsers::ParserKind;

/// Errors raised while loading or resolving a schema file.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The schema file could not be read
    #[error("failed to read schema '{path}': {source}")]
    Io {
        /// Schema file path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The schema file is not valid TOML of the expected shape
    #[error("failed to parse schema '{path}': {source}")]
    Toml {
        /// Schema file path
        path: PathBuf,
        /// Underlying TOML failure
        source: toml::de::Error,
    },

    /// A field entry is not a `{ column, parser }` table
    #[error("field '{field}' is malformed: {source}")]
    MalformedField {
        /// Offending field name
        field: String,
        /// Underlying TOML failure
        source: toml::de::Error,
    },

    /// The requested dataset does not exist in the schema file
    #[error("dataset '{name}' not found; available datasets: {available}")]
    UnknownDataset {
        /// Requested dataset name
        name: String,
        /// Comma-separated available names
        available: String,
    },

    /// The schema file contains more than one dataset and none was selected
    #[error("schema declares multiple datasets ({available}); select one with --dataset")]
    AmbiguousDataset {
        /// Comma-separated available names
        available: String,
    },

    /// The schema file declares no datasets at all
    #[error("schema declares no datasets")]
    NoDatasets,

    /// A dataset has an empty field table
    #[error("dataset '{dataset}' declares no fields")]
    NoFields {
        /// Offending dataset
        dataset: String,
    },

    /// A field references a column absent from the manifest header
    #[error("column '{column}' of field '{field}' not found in the manifest header")]
    UnknownColumn {
        /// Offending field
        field: String,
        /// Missing column name
        column: String,
    },

    /// A field references a parser not present in the registry
    #[error("unknown parser '{parser}' for field '{field}'")]
    UnknownParser {
        /// Offending field
        field: String,
        /// Unregistered parser name
        parser: String,
    },

    /// The manifest file named by the dataset does not exist
    #[error("manifest file '{path}' does not exist or is not a file")]
    ManifestMissing {
        /// Resolved manifest path
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    datasets: toml::Table,
}

#[derive(Debug, Deserialize)]
struct RawDataset {
    #[serde(default)]
    attrs: std::collections::BTreeMap<String, String>,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawData {
    file: String,
    fields: toml::Table,
}

#[derive(Debug, Deserialize)]
struct RawField {
    column: String,
    parser: String,
}

/// A schema file as loaded from disk, prior to resolution.
#[derive(Debug)]
pub struct RawSchema {
    path: PathBuf,
    datasets: Vec<(String, RawDataset)>,
}

impl RawSchema {
    /// Loads and structurally parses a TOML schema file.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: RawDocument =
            toml::from_str(&text).map_err(|source| SchemaError::Toml {
                path: path.to_path_buf(),
                source,
            })?;

        let mut datasets = Vec::new();
        for (name, value) in document.datasets {
            let dataset: RawDataset =
                value.try_into().map_err(|source| SchemaError::Toml {
                    path: path.to_path_buf(),
                    source,
                })?;
            datasets.push((name, dataset));
        }

        Ok(Self {
            path: path.to_path_buf(),
            datasets,
        })
    }

    /// The directory the schema file lives in; manifest paths resolve
    /// against it.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Declared dataset names, in file order.
    pub fn dataset_names(&self) -> Vec<&str> {
        self.datasets.iter().map(|(name, _)| name.as_str()).collect()
    }

    fn select(&self, name: Option<&str>) -> Result<(&str, &RawDataset), SchemaError> {
        let available = || self.dataset_names().join(", ");
        match name {
            Some(requested) => self
                .datasets
                .iter()
                .find(|(name, _)| name == requested)
                .map(|(name, dataset)| (name.as_str(), dataset))
                .ok_or_else(|| SchemaError::UnknownDataset {
                    name: requested.to_string(),
                    available: available(),
                }),
            None => match self.datasets.len() {
                0 => Err(SchemaError::NoDatasets),
                1 => {
                    let (name, dataset) = &self.datasets[0];
                    Ok((name.as_str(), dataset))
                }
                _ => Err(SchemaError::AmbiguousDataset {
                    available: available(),
                }),
            },
        }
    }

    /// Resolved path of the manifest file backing the selected dataset.
    pub fn manifest_path(&self, dataset: Option<&str>) -> Result<PathBuf, SchemaError> {
        let (_, raw) = self.select(dataset)?;
        Ok(self.root().join(&raw.data.file))
    }
}

/// One field of a resolved dataset.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field name (the container dataset name)
    pub name: String,
    /// Manifest column backing the field
    pub column: String,
    /// Index of `column` in the manifest header
    pub column_index: usize,
    /// Parser converting the column's raw values
    pub parser: ParserKind,
}

/// A resolved, immutable dataset specification.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    /// Dataset name (the schema table key)
    pub name: String,
    /// User attributes copied into every container built from this spec
    pub attrs: Vec<(String, String)>,
    /// Resolved manifest path
    pub manifest_path: PathBuf,
    /// Fields in declaration order
    pub fields: Vec<FieldSpec>,
}

/// Validates `raw` against a manifest header and produces a [`DatasetSpec`].
///
/// `dataset` selects one dataset from a multi-dataset schema; `None` is
/// accepted when the file declares exactly one.
pub fn resolve(
    raw: &RawSchema,
    dataset: Option<&str>,
    manifest_header: &[String],
) -> Result<DatasetSpec, SchemaError> {
    let (name, raw_dataset) = raw.select(dataset)?;

    let manifest_path = raw.root().join(&raw_dataset.data.file);
    if !manifest_path.is_file() {
        return Err(SchemaError::ManifestMissing {
            path: manifest_path,
        });
    }

    if raw_dataset.data.fields.is_empty() {
        return Err(SchemaError::NoFields {
            dataset: name.to_string(),
        });
    }

    let mut fields = Vec::with_capacity(raw_dataset.data.fields.len());
    for (field_name, value) in &raw_dataset.data.fields {
        let raw_field: RawField =
            value
                .clone()
                .try_into()
                .map_err(|source| SchemaError::MalformedField {
                    field: field_name.clone(),
                    source,
                })?;

        let column_index = manifest_header
            .iter()
            .position(|column| *column == raw_field.column)
            .ok_or_else(|| SchemaError::UnknownColumn {
                field: field_name.clone(),
                column: raw_field.column.clone(),
            })?;

        let parser =
            ParserKind::from_name(&raw_field.parser).ok_or_else(|| SchemaError::UnknownParser {
                field: field_name.clone(),
                parser: raw_field.parser.clone(),
            })?;

        fields.push(FieldSpec {
            name: field_name.clone(),
            column: raw_field.column,
            column_index,
            parser,
        });
    }

    Ok(DatasetSpec {
        name: name.to_string(),
        attrs: raw_dataset
            .attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        manifest_path,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_schema(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("rowpack.toml");
        fs::write(&path, body).unwrap();
        path
    }

    fn header() -> Vec<String> {
        vec!["filepath".to_string(), "split".to_string()]
    }

    const BASIC: &str = r#"
[datasets.demo]
attrs = { license = "CC0" }

[datasets.demo.data]
file = "dataset.csv"

[datasets.demo.data.fields.audio]
column = "filepath"
parser = "audio_int16"

[datasets.demo.data.fields.split]
column = "split"
parser = "utf8"
"#;

    #[test]
    fn resolves_fields_in_declaration_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset.csv"), "filepath,split\n").unwrap();
        let raw = RawSchema::load(&write_schema(dir.path(), BASIC)).unwrap();

        let spec = resolve(&raw, Some("demo"), &header()).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.attrs, [("license".to_string(), "CC0".to_string())]);
        assert_eq!(spec.fields.len(), 2);
        assert_eq!(spec.fields[0].name, "audio");
        assert_eq!(spec.fields[0].parser, ParserKind::AudioInt16);
        assert_eq!(spec.fields[0].column_index, 0);
        assert_eq!(spec.fields[1].name, "split");
        assert_eq!(spec.fields[1].parser, ParserKind::Utf8);
    }

    #[test]
    fn single_dataset_needs_no_selection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset.csv"), "filepath,split\n").unwrap();
        let raw = RawSchema::load(&write_schema(dir.path(), BASIC)).unwrap();
        assert!(resolve(&raw, None, &header()).is_ok());
    }

    #[test]
    fn unknown_dataset_lists_available_names() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawSchema::load(&write_schema(dir.path(), BASIC)).unwrap();
        let err = resolve(&raw, Some("other"), &header()).unwrap_err();
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset.csv"), "filepath,split\n").unwrap();
        let raw = RawSchema::load(&write_schema(dir.path(), BASIC)).unwrap();
        let err = resolve(&raw, Some("demo"), &["filepath".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownColumn { .. }));
    }

    #[test]
    fn unknown_parser_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset.csv"), "x\n").unwrap();
        let schema = r#"
[datasets.demo.data]
file = "dataset.csv"

[datasets.demo.data.fields.x]
column = "x"
parser = "as_pickle"
"#;
        let raw = RawSchema::load(&write_schema(dir.path(), schema)).unwrap();
        let err = resolve(&raw, None, &["x".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownParser { .. }));
    }

    #[test]
    fn missing_manifest_is_rejected_before_row_io() {
        let dir = tempfile::tempdir().unwrap();
        let raw = RawSchema::load(&write_schema(dir.path(), BASIC)).unwrap();
        let err = resolve(&raw, Some("demo"), &header()).unwrap_err();
        assert!(matches!(err, SchemaError::ManifestMissing { .. }));
    }

    #[test]
    fn empty_field_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dataset.csv"), "x\n").unwrap();
        let schema = r#"
[datasets.demo.data]
file = "dataset.csv"

[datasets.demo.data.fields]
"#;
        let raw = RawSchema::load(&write_schema(dir.path(), schema)).unwrap();
        let err = resolve(&raw, None, &["x".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::NoFields { .. }));
    }
}
