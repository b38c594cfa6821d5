//! # Unpacking
//!
//! Mirrors the partition builder in reverse: reads a container (physical or
//! virtual), reconstructs the manifest CSV row by row, re-encodes file-backed
//! fields to audio files under the output directory, and emits a schema file
//! whose `column`/`parser` entries are sufficient to re-pack an equivalent
//! container.
//!
//! Output layout under `out_dir`:
//!
//! ```text
//! <out_dir>/
//! ├── dataset.csv          # reconstructed manifest
//! ├── rowpack.toml         # reconstructed schema
//! └── data/<field>/...     # re-encoded audio, one tree per audio field
//! ```

use std::path::{Path, PathBuf};

use arrow::array::{
    Array, Float32Array, Float64Array, Int16Array, ListArray, StringArray,
};
use log::{debug, info};

use crate::builder::ProducerStamp;
use crate::format::{is_reserved_attr, ATTR_PRODUCER};
use crate::parsers::{audio, ParserKind, META_SAMPLE_RATE, PATH_COLUMN_SUFFIX};
use crate::reader::{Container, FieldData, ReaderError};

/// Errors raised while unpacking a container.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// The container could not be opened or read
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// The container was not produced by this tool
    #[error("container produced by '{producer}', not by rowpack; refusing to unpack")]
    ForeignProducer {
        /// The `producer` attribute found, or `<none>`
        producer: String,
    },

    /// A field carries no parser metadata and cannot be reconstructed
    #[error("field '{field}' has no parser attribute; cannot reconstruct it faithfully")]
    MissingParser {
        /// Offending field
        field: String,
    },

    /// A field names a parser this build does not know
    #[error("field '{field}' was packed with unknown parser '{parser}'")]
    UnknownParser {
        /// Offending field
        field: String,
        /// Unrecognized parser name
        parser: String,
    },

    /// An audio field carries no sample rate
    #[error("audio field '{field}' has no sample_rate attribute")]
    MissingSampleRate {
        /// Offending field
        field: String,
    },

    /// A field's stored array does not match its declared parser
    #[error("field '{field}' holds a different array type than parser '{parser}' produces")]
    TypeMismatch {
        /// Offending field
        field: String,
        /// Declared parser
        parser: String,
    },

    /// Two fields of the same container expose different row counts
    #[error("field '{field}' holds {found} row(s), expected {expected}")]
    InconsistentRows {
        /// Offending field
        field: String,
        /// Row count of the first field
        expected: usize,
        /// Row count of the offending field
        found: usize,
    },

    /// I/O failure while writing reconstructed output
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Failure while writing the reconstructed manifest
    #[error("failed to write manifest '{path}': {source}")]
    Csv {
        /// Manifest path
        path: PathBuf,
        /// Underlying CSV failure
        source: csv::Error,
    },

    /// Failure while re-encoding an audio file
    #[error(transparent)]
    Audio(#[from] audio::AudioError),

    /// Failure while serializing the reconstructed schema
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Outcome of one successful unpack.
#[derive(Debug, Clone)]
pub struct UnpackReport {
    /// Reconstructed manifest path
    pub manifest_path: PathBuf,
    /// Reconstructed schema path
    pub schema_path: PathBuf,
    /// Rows reconstructed
    pub rows: usize,
    /// Fields reconstructed
    pub fields: usize,
}

struct ReconstructedColumn {
    /// Manifest column name
    column: String,
    /// Field name the column reconstructs
    field: String,
    /// Parser to record in the schema
    parser: ParserKind,
    /// Raw cell values, one per row
    values: Vec<String>,
}

/// Unpacks `container_path` into `out_dir`.
pub fn unpack(container_path: &Path, out_dir: &Path) -> Result<UnpackReport, UnpackError> {
    let container = Container::open(container_path)?;

    let producer = container
        .attrs()
        .get(ATTR_PRODUCER)
        .cloned()
        .unwrap_or_else(|| "<none>".to_string());
    if !ProducerStamp::recognizes(&producer) {
        return Err(UnpackError::ForeignProducer { producer });
    }

    std::fs::create_dir_all(out_dir).map_err(|source| UnpackError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut columns: Vec<ReconstructedColumn> = Vec::new();
    let mut rows: Option<usize> = None;

    for field_info in container.fields() {
        let parser_name = field_info
            .parser
            .clone()
            .ok_or_else(|| UnpackError::MissingParser {
                field: field_info.name.clone(),
            })?;
        let parser =
            ParserKind::from_name(&parser_name).ok_or_else(|| UnpackError::UnknownParser {
                field: field_info.name.clone(),
                parser: parser_name.clone(),
            })?;

        let data = container.read_field(&field_info.name)?;
        match rows {
            None => rows = Some(data.values.len()),
            Some(expected) if expected != data.values.len() => {
                return Err(UnpackError::InconsistentRows {
                    field: field_info.name.clone(),
                    expected,
                    found: data.values.len(),
                });
            }
            Some(_) => {}
        }

        debug!("unpacking field '{}' ({})", field_info.name, parser_name);
        let column = if parser.is_audio() {
            extract_audio_field(&data, parser, out_dir)?
        } else {
            extract_value_field(&data, parser)?
        };
        columns.push(column);
    }

    let rows = rows.unwrap_or(0);

    // Reconstructed manifest
    let manifest_path = out_dir.join("dataset.csv");
    write_manifest(&manifest_path, &columns, rows)?;

    // Reconstructed schema
    let schema_path = out_dir.join("rowpack.toml");
    let dataset_name = out_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    write_schema(&schema_path, &dataset_name, container.attrs(), &columns)?;

    info!(
        "unpacked {} row(s), {} field(s) into '{}'",
        rows,
        columns.len(),
        out_dir.display()
    );

    Ok(UnpackReport {
        manifest_path,
        schema_path,
        rows,
        fields: columns.len(),
    })
}

fn extract_value_field(
    data: &FieldData,
    parser: ParserKind,
) -> Result<ReconstructedColumn, UnpackError> {
    let field = &data.info.name;
    let mismatch = || UnpackError::TypeMismatch {
        field: field.clone(),
        parser: parser.name().to_string(),
    };

    let values = match parser {
        ParserKind::Int16 => {
            let array = data
                .values
                .as_any()
                .downcast_ref::<Int16Array>()
                .ok_or_else(mismatch)?;
            (0..array.len()).map(|i| array.value(i).to_string()).collect()
        }
        ParserKind::Float32 => {
            let array = data
                .values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(mismatch)?;
            (0..array.len()).map(|i| array.value(i).to_string()).collect()
        }
        ParserKind::Float64 => {
            let array = data
                .values
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(mismatch)?;
            (0..array.len()).map(|i| array.value(i).to_string()).collect()
        }
        ParserKind::Utf8 => {
            let array = data
                .values
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(mismatch)?;
            (0..array.len()).map(|i| array.value(i).to_string()).collect()
        }
        ParserKind::ListInt16 => render_lists::<Int16Array, _>(data, |a, i| a.value(i).to_string())
            .ok_or_else(mismatch)?,
        ParserKind::ListFloat32 => {
            render_lists::<Float32Array, _>(data, |a, i| a.value(i).to_string())
                .ok_or_else(mismatch)?
        }
        ParserKind::ListFloat64 => {
            render_lists::<Float64Array, _>(data, |a, i| a.value(i).to_string())
                .ok_or_else(mismatch)?
        }
        _ => return Err(mismatch()),
    };

    Ok(ReconstructedColumn {
        column: field.clone(),
        field: field.clone(),
        parser,
        values,
    })
}

/// Renders a list column back to its bracketed literal form.
fn render_lists<A: 'static, F>(data: &FieldData, render: F) -> Option<Vec<String>>
where
    F: Fn(&A, usize) -> String,
{
    let lists = data.values.as_any().downcast_ref::<ListArray>()?;
    let mut out = Vec::with_capacity(lists.len());
    for i in 0..lists.len() {
        let entry = lists.value(i);
        let entry = entry.as_any().downcast_ref::<A>()?;
        let rendered: Vec<String> = (0..lists.value(i).len())
            .map(|j| render(entry, j))
            .collect();
        out.push(format!("[{}]", rendered.join(", ")));
    }
    Some(out)
}

fn extract_audio_field(
    data: &FieldData,
    parser: ParserKind,
    out_dir: &Path,
) -> Result<ReconstructedColumn, UnpackError> {
    let field = &data.info.name;
    let mismatch = || UnpackError::TypeMismatch {
        field: field.clone(),
        parser: parser.name().to_string(),
    };

    let sample_rate: u32 = data
        .info
        .metadata
        .get(META_SAMPLE_RATE)
        .and_then(|fs| fs.parse().ok())
        .ok_or_else(|| UnpackError::MissingSampleRate {
            field: field.clone(),
        })?;

    let paths = data.paths.as_ref().ok_or_else(|| ReaderError::MissingPathColumn {
        field: field.clone(),
    })?;
    let paths = paths
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(mismatch)?;
    let lists = data
        .values
        .as_any()
        .downcast_ref::<ListArray>()
        .ok_or_else(mismatch)?;

    let field_dir = out_dir.join("data").join(field);
    let mut values = Vec::with_capacity(lists.len());

    for row in 0..lists.len() {
        let stored = paths.value(row);
        let relative = relative_audio_path(stored);
        let target = field_dir.join(&relative);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| UnpackError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let samples = lists.value(row);
        match parser {
            ParserKind::AudioInt16 => {
                let samples = samples
                    .as_any()
                    .downcast_ref::<Int16Array>()
                    .ok_or_else(mismatch)?;
                audio::write_i16(&target, samples.values(), sample_rate)?;
            }
            ParserKind::AudioFloat32 => {
                let samples = samples
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(mismatch)?;
                audio::write_f32(&target, samples.values(), sample_rate)?;
            }
            _ => {
                let samples = samples
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(mismatch)?;
                audio::write_f64(&target, samples.values(), sample_rate)?;
            }
        }

        values.push(
            Path::new("data")
                .join(field)
                .join(&relative)
                .to_string_lossy()
                .into_owned(),
        );
    }

    Ok(ReconstructedColumn {
        column: format!("{field}{PATH_COLUMN_SUFFIX}"),
        field: field.clone(),
        parser,
        values,
    })
}

/// Maps a stored provenance path to a path under the field's output tree.
/// Absolute provenance collapses to its file name; relative provenance keeps
/// its directory structure.
fn relative_audio_path(stored: &str) -> PathBuf {
    let path = Path::new(stored);
    if path.is_absolute() {
        PathBuf::from(path.file_name().unwrap_or_default())
    } else {
        path.to_path_buf()
    }
}

fn write_manifest(
    path: &Path,
    columns: &[ReconstructedColumn],
    rows: usize,
) -> Result<(), UnpackError> {
    let mut writer = csv::Writer::from_path(path).map_err(|source| UnpackError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let header: Vec<&str> = columns.iter().map(|c| c.column.as_str()).collect();
    writer.write_record(&header).map_err(|source| UnpackError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    for row in 0..rows {
        let record: Vec<&str> = columns.iter().map(|c| c.values[row].as_str()).collect();
        writer.write_record(&record).map_err(|source| UnpackError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    }

    writer.flush().map_err(|source| UnpackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn write_schema(
    path: &Path,
    dataset_name: &str,
    attrs: &std::collections::BTreeMap<String, String>,
    columns: &[ReconstructedColumn],
) -> Result<(), UnpackError> {
    use toml::{Table, Value};

    let mut fields = Table::new();
    for column in columns {
        let mut field = Table::new();
        field.insert("column".to_string(), Value::String(column.column.clone()));
        field.insert(
            "parser".to_string(),
            Value::String(column.parser.name().to_string()),
        );
        fields.insert(column.field.clone(), Value::Table(field));
    }

    let mut data = Table::new();
    data.insert("file".to_string(), Value::String("dataset.csv".to_string()));
    data.insert("fields".to_string(), Value::Table(fields));

    let mut dataset = Table::new();
    let user_attrs: Table = attrs
        .iter()
        .filter(|(key, _)| !is_reserved_attr(key))
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    if !user_attrs.is_empty() {
        dataset.insert("attrs".to_string(), Value::Table(user_attrs));
    }
    dataset.insert("data".to_string(), Value::Table(data));

    let mut datasets = Table::new();
    datasets.insert(dataset_name.to_string(), Value::Table(dataset));

    let mut root = Table::new();
    root.insert("datasets".to_string(), Value::Table(datasets));

    let rendered = toml::to_string_pretty(&Value::Table(root))?;
    std::fs::write(path, rendered).map_err(|source| UnpackError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
