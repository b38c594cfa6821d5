//! # Container reading
//!
//! Opens both kinds of container behind one [`Container`] type: physical
//! `.rpk` Parquet files, and `.vrpk` virtual compositions whose fields are
//! row-wise concatenations of other containers. Virtual reads resolve their
//! source references lazily, one source at a time, so a composition never
//! duplicates the bytes of its sources on disk.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::ArrayRef;
use arrow::compute::concat_batches;
use arrow::datatypes::{Field, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::format::VIRTUAL_EXT;
use crate::parsers::{META_PARSER, PATH_COLUMN_SUFFIX};

/// Errors raised while opening or reading containers.
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The container file could not be opened or read
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Error from the Parquet library
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Error from the Arrow library
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// A virtual composition document is not valid JSON
    #[error("failed to parse virtual composition '{path}': {source}")]
    Json {
        /// Offending path
        path: PathBuf,
        /// Underlying JSON failure
        source: serde_json::Error,
    },

    /// A field name that no data field in the container carries
    #[error("field '{field}' not found in container")]
    MissingField {
        /// Requested field name
        field: String,
    },

    /// An audio field without its companion source-path column
    #[error("field '{field}' is file-backed but has no '{field}{PATH_COLUMN_SUFFIX}' column")]
    MissingPathColumn {
        /// Offending field name
        field: String,
    },

    /// A composition source holds a different row count than its reference
    #[error(
        "source '{src}' holds {found} row(s) of field '{field}', composition expects {expected}"
    )]
    SourceRowMismatch {
        /// Source container path
        src: String,
        /// Field being read
        field: String,
        /// Rows recorded in the composition
        expected: u64,
        /// Rows found in the source
        found: usize,
    },
}

/// Descriptive information about one data field of a container.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    /// Field name
    pub name: String,
    /// Parser recorded in the field metadata, if any
    pub parser: Option<String>,
    /// Full field metadata (`parser`, `sample_rate`, ...)
    pub metadata: HashMap<String, String>,
    /// Display form of the Arrow data type
    pub data_type: String,
}

/// One fully-read field: its description, the typed array, and — for
/// file-backed fields — the parallel array of original source paths.
pub struct FieldData {
    /// Field description
    pub info: FieldInfo,
    /// Typed values, one entry per row
    pub values: ArrayRef,
    /// Original source paths for file-backed fields
    pub paths: Option<ArrayRef>,
}

/// One reference of a virtual field into a source container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    /// Source container path, relative to the composition file unless
    /// absolute-path mode was requested at creation time
    pub source: String,
    /// First row of the composition covered by this source
    pub row_offset: u64,
    /// Rows contributed by this source
    pub rows: u64,
}

/// One field of a virtual composition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualFieldDoc {
    /// Field name
    pub name: String,
    /// Parser recorded by the sources
    pub parser: Option<String>,
    /// Field metadata shared by all sources
    pub metadata: BTreeMap<String, String>,
    /// Display form of the shared Arrow data type
    pub data_type: String,
    /// Ordered references into the source containers
    pub references: Vec<SourceReference>,
}

/// A virtual composition document as serialized to a `.vrpk` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDocument {
    /// Root attributes of the composition
    pub attrs: BTreeMap<String, String>,
    /// Base names of the composed sources, in composition order
    pub source: Vec<String>,
    /// Composed fields, in source field order
    pub fields: Vec<VirtualFieldDoc>,
}

/// A physical `.rpk` container backed by one Parquet file.
pub struct PhysicalContainer {
    path: PathBuf,
    attrs: BTreeMap<String, String>,
    schema: SchemaRef,
    batch: RecordBatch,
}

impl PhysicalContainer {
    /// Opens a Parquet container and reads its batches into memory.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let file = File::open(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

        // The footer also carries writer-internal entries (the embedded Arrow
        // schema); only user-facing attributes are surfaced.
        let attrs = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(|kvs| {
                kvs.iter()
                    .filter(|kv| !kv.key.starts_with("ARROW:"))
                    .filter_map(|kv| kv.value.clone().map(|v| (kv.key.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();

        let schema = builder.schema().clone();
        let mut batches = Vec::new();
        for batch in builder.build()? {
            batches.push(batch?);
        }
        let batch = if batches.is_empty() {
            RecordBatch::new_empty(schema.clone())
        } else {
            concat_batches(&schema, &batches)?
        };

        Ok(Self {
            path: path.to_path_buf(),
            attrs,
            schema,
            batch,
        })
    }

    /// Root attributes from the Parquet footer.
    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// The file this container was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rows held by the container.
    pub fn row_count(&self) -> usize {
        self.batch.num_rows()
    }

    /// Data fields in schema order, excluding companion path columns.
    pub fn data_fields(&self) -> Vec<&Field> {
        self.schema
            .fields()
            .iter()
            .filter(|field| !self.is_companion(field.name()))
            .map(|field| field.as_ref())
            .collect()
    }

    fn is_companion(&self, name: &str) -> bool {
        name.strip_suffix(PATH_COLUMN_SUFFIX)
            .is_some_and(|base| self.schema.field_with_name(base).is_ok())
    }

    /// Reads one data field, including its path column when file-backed.
    pub fn read_field(&self, name: &str) -> Result<FieldData, ReaderError> {
        let (index, field) =
            self.schema
                .fields()
                .iter()
                .enumerate()
                .find(|(_, f)| f.name() == name)
                .ok_or_else(|| ReaderError::MissingField {
                    field: name.to_string(),
                })?;

        let info = field_info(field);
        let values = self.batch.column(index).clone();

        let paths = if is_audio_parser(info.parser.as_deref()) {
            let companion = format!("{name}{PATH_COLUMN_SUFFIX}");
            let column = self
                .schema
                .index_of(&companion)
                .map_err(|_| ReaderError::MissingPathColumn {
                    field: name.to_string(),
                })?;
            Some(self.batch.column(column).clone())
        } else {
            None
        };

        Ok(FieldData { info, values, paths })
    }
}

/// A `.vrpk` virtual composition; field reads resolve source containers
/// lazily, in reference order.
pub struct VirtualContainer {
    path: PathBuf,
    base: PathBuf,
    doc: VirtualDocument,
}

impl VirtualContainer {
    /// Opens and parses a virtual composition document.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: VirtualDocument =
            serde_json::from_str(&text).map_err(|source| ReaderError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        let base = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();

        Ok(Self {
            path: path.to_path_buf(),
            base,
            doc,
        })
    }

    /// The parsed composition document.
    pub fn document(&self) -> &VirtualDocument {
        &self.doc
    }

    /// The file this composition was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Root attributes of the composition.
    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.doc.attrs
    }

    /// Total rows exposed by the composition.
    pub fn row_count(&self) -> usize {
        self.doc
            .fields
            .first()
            .map(|field| field.references.iter().map(|r| r.rows as usize).sum())
            .unwrap_or(0)
    }

    fn resolve_source(&self, source: &str) -> PathBuf {
        let given = Path::new(source);
        if given.is_absolute() {
            given.to_path_buf()
        } else {
            self.base.join(given)
        }
    }

    /// Reads one field as the concatenation of its source references.
    pub fn read_field(&self, name: &str) -> Result<FieldData, ReaderError> {
        let field = self
            .doc
            .fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| ReaderError::MissingField {
                field: name.to_string(),
            })?;

        let mut value_parts = Vec::with_capacity(field.references.len());
        let mut path_parts = Vec::with_capacity(field.references.len());

        for reference in &field.references {
            let source = PhysicalContainer::open(&self.resolve_source(&reference.source))?;
            let data = source.read_field(name)?;
            if data.values.len() != reference.rows as usize {
                return Err(ReaderError::SourceRowMismatch {
                    src: reference.source.clone(),
                    field: name.to_string(),
                    expected: reference.rows,
                    found: data.values.len(),
                });
            }
            value_parts.push(data.values);
            if let Some(paths) = data.paths {
                path_parts.push(paths);
            }
        }

        let values = concat_arrays(&value_parts)?;
        let paths = if path_parts.len() == field.references.len() {
            Some(concat_arrays(&path_parts)?)
        } else {
            None
        };

        Ok(FieldData {
            info: FieldInfo {
                name: field.name.clone(),
                parser: field.parser.clone(),
                metadata: field
                    .metadata
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
                data_type: field.data_type.clone(),
            },
            values,
            paths,
        })
    }
}

fn concat_arrays(parts: &[ArrayRef]) -> Result<ArrayRef, ReaderError> {
    let refs: Vec<&dyn arrow::array::Array> = parts.iter().map(|a| a.as_ref()).collect();
    Ok(arrow::compute::concat(&refs)?)
}

/// Either kind of container, opened by file extension.
pub enum Container {
    /// A physical Parquet container
    Physical(PhysicalContainer),
    /// A virtual composition of containers
    Virtual(VirtualContainer),
}

impl Container {
    /// Opens `path` as a virtual composition when it carries the `.vrpk`
    /// extension, as a physical container otherwise.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        if path.extension().is_some_and(|ext| ext == VIRTUAL_EXT) {
            Ok(Self::Virtual(VirtualContainer::open(path)?))
        } else {
            Ok(Self::Physical(PhysicalContainer::open(path)?))
        }
    }

    /// True for virtual compositions.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual(_))
    }

    /// Root attributes of the container.
    pub fn attrs(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Physical(c) => c.attrs(),
            Self::Virtual(c) => c.attrs(),
        }
    }

    /// Total rows exposed by the container.
    pub fn row_count(&self) -> usize {
        match self {
            Self::Physical(c) => c.row_count(),
            Self::Virtual(c) => c.row_count(),
        }
    }

    /// Data field descriptions, in field order.
    pub fn fields(&self) -> Vec<FieldInfo> {
        match self {
            Self::Physical(c) => c.data_fields().into_iter().map(field_info).collect(),
            Self::Virtual(c) => c
                .doc
                .fields
                .iter()
                .map(|field| FieldInfo {
                    name: field.name.clone(),
                    parser: field.parser.clone(),
                    metadata: field
                        .metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect(),
                    data_type: field.data_type.clone(),
                })
                .collect(),
        }
    }

    /// Reads one data field.
    pub fn read_field(&self, name: &str) -> Result<FieldData, ReaderError> {
        match self {
            Self::Physical(c) => c.read_field(name),
            Self::Virtual(c) => c.read_field(name),
        }
    }
}

fn field_info(field: &Field) -> FieldInfo {
    let metadata: HashMap<String, String> = field
        .metadata()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    FieldInfo {
        name: field.name().clone(),
        parser: metadata.get(META_PARSER).cloned(),
        metadata,
        data_type: field.data_type().to_string(),
    }
}

fn is_audio_parser(parser: Option<&str>) -> bool {
    parser.is_some_and(|name| name.starts_with("audio_"))
}
