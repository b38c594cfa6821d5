//! # Virtual composition
//!
//! Merges N physical containers into one logical dataset without copying any
//! data bytes. The output is a `.vrpk` JSON document whose fields reference
//! row ranges of the source containers; readers resolve the references
//! lazily. All sources must expose an identical field layout — same field
//! names in the same order, same parser per field, same element type, same
//! parser metadata — or composition fails before any output is written.
//!
//! Source paths are stored relative to the composition file's own directory,
//! so a composition travels with its partitions. `force_abspath` pins the
//! stored paths to absolute ones instead; relative references break when the
//! composition alone is moved, which is the caller's trade-off to make.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::debug;
use tempfile::NamedTempFile;

use crate::builder::ProducerStamp;
use crate::format::{
    is_reserved_attr, ATTR_CREATION_DATE, ATTR_IS_VIRTUAL, ATTR_PRODUCER, ATTR_SOURCE,
    CREATION_DATE_FORMAT,
};
use crate::reader::{
    PhysicalContainer, ReaderError, SourceReference, VirtualDocument, VirtualFieldDoc,
};

/// Errors raised while composing a virtual dataset.
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    /// Composition needs at least one source container
    #[error("no source containers given")]
    NoSources,

    /// A source container could not be opened
    #[error(transparent)]
    Reader(#[from] ReaderError),

    /// A source exposes a different field list than the first source
    #[error("source '{src}' exposes fields [{found}], expected [{expected}]")]
    FieldSetMismatch {
        /// Offending source
        src: String,
        /// Field list of the first source
        expected: String,
        /// Field list of the offending source
        found: String,
    },

    /// A source disagrees on a field's parser, type, or metadata
    #[error("field '{field}' of source '{src}': {detail}")]
    FieldMismatch {
        /// Offending source
        src: String,
        /// Offending field
        field: String,
        /// What differs from the first source
        detail: String,
    },

    /// I/O failure while writing the composition document
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// The composition document could not be serialized
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Options controlling composition output.
#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Store absolute source paths instead of composition-relative ones
    pub force_abspath: bool,
    /// Extra root attributes; override attributes inherited from the first
    /// source on key collision
    pub attrs: Vec<(String, String)>,
}

/// Outcome of one successful composition.
#[derive(Debug, Clone)]
pub struct ComposeReport {
    /// Path of the written `.vrpk` document
    pub path: PathBuf,
    /// Total rows exposed by the composition
    pub rows: usize,
    /// Number of composed sources
    pub sources: usize,
}

struct FieldTemplate {
    name: String,
    parser: Option<String>,
    metadata: BTreeMap<String, String>,
    data_type: arrow::datatypes::DataType,
}

/// Composes `sources` into a virtual dataset document at `output`.
///
/// Validation runs over every source before anything is written; an
/// incompatible source therefore never leaves a partial output file behind.
pub fn compose(
    sources: &[PathBuf],
    output: &Path,
    options: &ComposeOptions,
    stamp: &ProducerStamp,
) -> Result<ComposeReport, CompositionError> {
    if sources.is_empty() {
        return Err(CompositionError::NoSources);
    }

    let out_dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();

    let mut templates: Vec<FieldTemplate> = Vec::new();
    let mut field_docs: Vec<VirtualFieldDoc> = Vec::new();
    let mut first_attrs: BTreeMap<String, String> = BTreeMap::new();
    let mut total_rows: usize = 0;

    for (source_index, source_path) in sources.iter().enumerate() {
        let container = PhysicalContainer::open(source_path)?;
        let source_label = source_path.display().to_string();

        let fields = container.data_fields();
        if source_index == 0 {
            first_attrs = container.attrs().clone();
            for field in &fields {
                let metadata: BTreeMap<String, String> = field
                    .metadata()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                templates.push(FieldTemplate {
                    name: field.name().clone(),
                    parser: metadata.get(crate::parsers::META_PARSER).cloned(),
                    metadata,
                    data_type: field.data_type().clone(),
                });
            }
            field_docs = templates
                .iter()
                .map(|template| VirtualFieldDoc {
                    name: template.name.clone(),
                    parser: template.parser.clone(),
                    metadata: template.metadata.clone(),
                    data_type: template.data_type.to_string(),
                    references: Vec::with_capacity(sources.len()),
                })
                .collect();
        } else {
            let expected: Vec<&str> = templates.iter().map(|t| t.name.as_str()).collect();
            let found: Vec<&str> = fields.iter().map(|f| f.name().as_str()).collect();
            if expected != found {
                return Err(CompositionError::FieldSetMismatch {
                    src: source_label,
                    expected: expected.join(", "),
                    found: found.join(", "),
                });
            }

            for (template, field) in templates.iter().zip(&fields) {
                let metadata: BTreeMap<String, String> = field
                    .metadata()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let parser = metadata.get(crate::parsers::META_PARSER).cloned();
                if parser != template.parser {
                    return Err(CompositionError::FieldMismatch {
                        src: source_label,
                        field: template.name.clone(),
                        detail: format!(
                            "parser is {:?}, expected {:?}",
                            parser, template.parser
                        ),
                    });
                }
                if field.data_type() != &template.data_type {
                    return Err(CompositionError::FieldMismatch {
                        src: source_label,
                        field: template.name.clone(),
                        detail: format!(
                            "data type is {}, expected {}",
                            field.data_type(),
                            template.data_type
                        ),
                    });
                }
                if metadata != template.metadata {
                    return Err(CompositionError::FieldMismatch {
                        src: source_label,
                        field: template.name.clone(),
                        detail: "field metadata differs".to_string(),
                    });
                }
            }
        }

        let rows = container.row_count();
        let stored = stored_source_path(source_path, &out_dir, options.force_abspath)
            .map_err(|source| CompositionError::Io {
                path: source_path.clone(),
                source,
            })?;
        for doc in &mut field_docs {
            doc.references.push(SourceReference {
                source: stored.clone(),
                row_offset: total_rows as u64,
                rows: rows as u64,
            });
        }
        total_rows += rows;
    }

    // Root attrs: user attrs of the first source, overridden by the caller's,
    // then the tool-managed ones.
    let mut attrs: BTreeMap<String, String> = first_attrs
        .into_iter()
        .filter(|(key, _)| !is_reserved_attr(key))
        .collect();
    for (key, value) in &options.attrs {
        attrs.insert(key.clone(), value.clone());
    }
    attrs.insert(
        ATTR_CREATION_DATE.to_string(),
        Local::now().format(CREATION_DATE_FORMAT).to_string(),
    );
    attrs.insert(ATTR_PRODUCER.to_string(), stamp.attr_value());
    attrs.insert(ATTR_IS_VIRTUAL.to_string(), "true".to_string());
    attrs.insert(
        ATTR_SOURCE.to_string(),
        sources
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect::<Vec<_>>()
            .join(", "),
    );

    let document = VirtualDocument {
        attrs,
        source: field_docs
            .first()
            .map(|doc| doc.references.iter().map(|r| r.source.clone()).collect())
            .unwrap_or_default(),
        fields: field_docs,
    };

    debug!(
        "composing {} source(s), {} row(s) into '{}'",
        sources.len(),
        total_rows,
        output.display()
    );

    std::fs::create_dir_all(&out_dir).map_err(|source| CompositionError::Io {
        path: out_dir.clone(),
        source,
    })?;
    let mut temp = NamedTempFile::new_in(&out_dir).map_err(|source| CompositionError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(&mut temp, &document)?;
    temp.write_all(b"\n").map_err(|source| CompositionError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    temp.persist(output).map_err(|e| CompositionError::Io {
        path: output.to_path_buf(),
        source: e.error,
    })?;

    Ok(ComposeReport {
        path: output.to_path_buf(),
        rows: total_rows,
        sources: sources.len(),
    })
}

/// Chooses the source path string stored in the composition document.
fn stored_source_path(
    source: &Path,
    out_dir: &Path,
    force_abspath: bool,
) -> std::io::Result<String> {
    if force_abspath {
        let absolute = if source.is_absolute() {
            source.to_path_buf()
        } else {
            std::env::current_dir()?.join(source)
        };
        return Ok(absolute.display().to_string());
    }

    // Relative to the composition file where possible; a source outside the
    // output directory keeps the path it was given.
    if let (Ok(abs_source), Ok(abs_dir)) = (source.canonicalize(), out_dir.canonicalize()) {
        if let Ok(relative) = abs_source.strip_prefix(&abs_dir) {
            return Ok(relative.display().to_string());
        }
    }
    Ok(source.display().to_string())
}
