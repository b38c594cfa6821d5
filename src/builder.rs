//! # Partition builder
//!
//! Builds one container file from one contiguous slice of manifest rows.
//! Every field of the dataset spec is converted to a typed Arrow array via
//! its parser, in field-declaration order, and the arrays are written as a
//! single Parquet file carrying the dataset's attributes in the footer.
//!
//! The container is written to a temporary file in the target directory and
//! atomically renamed into place once complete. A failed build removes the
//! temporary file and leaves nothing at the final path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::Local;
use log::debug;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;
use tempfile::NamedTempFile;

use crate::format::{
    ATTR_CREATION_DATE, ATTR_PRODUCER, CONTAINER_EXT, CREATION_DATE_FORMAT,
};
use crate::manifest::Manifest;
use crate::parsers::{ParseError, PATH_COLUMN_SUFFIX};
use crate::plan::PartitionRange;
use crate::schema::DatasetSpec;

/// Errors raised while building a partition container.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A cell failed to parse; names the field, row, and cause
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// I/O failure while creating or publishing the container
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path involved in the failing operation
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Error from the Arrow library while assembling record batches
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from the Parquet library while writing the container
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

/// The tool identity stamped into every container's `producer` attribute.
///
/// Threaded explicitly into each build call rather than read from ambient
/// state, so tests and embedders can stamp what they like.
#[derive(Debug, Clone)]
pub struct ProducerStamp {
    /// Tool name
    pub tool: String,
    /// Tool version
    pub version: String,
}

impl ProducerStamp {
    /// The stamp of this crate build.
    pub fn current() -> Self {
        Self {
            tool: "rowpack".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// The attribute value written to containers, e.g. `rowpack 0.3.1`.
    pub fn attr_value(&self) -> String {
        format!("{} {}", self.tool, self.version)
    }

    /// True if a `producer` attribute was written by this tool.
    pub fn recognizes(attr: &str) -> bool {
        attr.starts_with("rowpack")
    }
}

impl Default for ProducerStamp {
    fn default() -> Self {
        Self::current()
    }
}

/// Outcome of one successful partition build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Partition index the container belongs to
    pub partition: usize,
    /// Final path of the published container
    pub path: PathBuf,
    /// Rows written
    pub rows: usize,
}

/// Computes the container path for partition `index` of `count`.
///
/// A single-partition build writes directly to `<output>.rpk`; multi-partition
/// builds insert a `.pt<index>` suffix zero-padded to the width of `count`,
/// so `plan` determinism carries over to file naming.
pub fn partition_path(output: &Path, index: usize, count: usize) -> PathBuf {
    let base = ensure_extension(output, CONTAINER_EXT);
    if count == 1 {
        return base;
    }
    let width = count.to_string().len();
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    base.with_file_name(format!("{stem}.pt{index:0width$}.{CONTAINER_EXT}"))
}

/// Appends `ext` to `path` unless it already carries it.
pub fn ensure_extension(path: &Path, ext: &str) -> PathBuf {
    match path.extension() {
        Some(existing) if existing == ext => path.to_path_buf(),
        _ => {
            let mut name = path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.push('.');
            name.push_str(ext);
            path.with_file_name(name)
        }
    }
}

/// Builds the container for `range` and publishes it at `output`.
///
/// On success exactly one new file exists at `output`; on failure the
/// temporary file is discarded and the final path is untouched.
pub fn build(
    spec: &DatasetSpec,
    manifest: &Manifest,
    range: &PartitionRange,
    output: &Path,
    stamp: &ProducerStamp,
) -> Result<BuildReport, BuildError> {
    debug!(
        "building partition #{} (rows {}..={}) at '{}'",
        range.index,
        range.first_row,
        range.last_row,
        output.display()
    );

    let audio_root = manifest.root();
    let mut fields = Vec::new();
    let mut arrays = Vec::new();

    for field in &spec.fields {
        let mut column = field.parser.column_builder(audio_root);
        for row in range.first_row..=range.last_row {
            column
                .push(manifest.value(row, field.column_index))
                .map_err(|cause| ParseError {
                    field: field.name.clone(),
                    row,
                    cause,
                })?;
        }

        let finished = column.finish();
        fields.push(
            Field::new(field.name.as_str(), finished.values.data_type().clone(), true)
                .with_metadata(finished.metadata),
        );
        arrays.push(finished.values);

        if let Some(paths) = finished.paths {
            fields.push(Field::new(
                format!("{}{}", field.name, PATH_COLUMN_SUFFIX),
                paths.data_type().clone(),
                true,
            ));
            arrays.push(paths);
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let mut attrs = vec![
        KeyValue {
            key: ATTR_CREATION_DATE.to_string(),
            value: Some(Local::now().format(CREATION_DATE_FORMAT).to_string()),
        },
        KeyValue {
            key: ATTR_PRODUCER.to_string(),
            value: Some(stamp.attr_value()),
        },
    ];
    for (key, value) in &spec.attrs {
        attrs.push(KeyValue {
            key: key.clone(),
            value: Some(value.clone()),
        });
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(
            ZstdLevel::try_new(3).unwrap_or(ZstdLevel::default()),
        ))
        .set_key_value_metadata(Some(attrs))
        .build();

    let parent = output.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent).map_err(|source| BuildError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Written to a temp file in the same directory, then atomically renamed;
    // an interrupted build never leaves a half-written file at `output`.
    let temp = NamedTempFile::new_in(parent.unwrap_or_else(|| Path::new(".")))
        .map_err(|source| BuildError::Io {
            path: output.to_path_buf(),
            source,
        })?;

    let temp_handle = temp.as_file().try_clone().map_err(|source| BuildError::Io {
        path: temp.path().to_path_buf(),
        source,
    })?;
    let mut writer = ArrowWriter::try_new(temp_handle, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    temp.persist(output).map_err(|e| BuildError::Io {
        path: output.to_path_buf(),
        source: e.error,
    })?;

    Ok(BuildReport {
        partition: range.index,
        path: output.to_path_buf(),
        rows: range.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_partition_keeps_plain_name() {
        let path = partition_path(Path::new("out/dataset"), 0, 1);
        assert_eq!(path, Path::new("out/dataset.rpk"));
    }

    #[test]
    fn existing_extension_is_not_duplicated() {
        let path = partition_path(Path::new("dataset.rpk"), 0, 1);
        assert_eq!(path, Path::new("dataset.rpk"));
    }

    #[test]
    fn multi_partition_suffix_is_zero_padded() {
        assert_eq!(
            partition_path(Path::new("dataset"), 3, 12),
            Path::new("dataset.pt03.rpk")
        );
        assert_eq!(
            partition_path(Path::new("dataset"), 3, 4),
            Path::new("dataset.pt3.rpk")
        );
    }

    #[test]
    fn producer_stamp_is_recognized() {
        let stamp = ProducerStamp::current();
        assert!(ProducerStamp::recognizes(&stamp.attr_value()));
        assert!(!ProducerStamp::recognizes("h5py 3.10"));
    }
}
