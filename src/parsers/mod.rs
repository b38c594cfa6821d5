//! # Parser Registry
//!
//! A closed registry of cell parsers. Each manifest column referenced by a
//! field is converted to one typed Arrow array by a [`ColumnBuilder`] obtained
//! from a [`ParserKind`]. The set of parsers is a fixed enumeration validated
//! at schema-resolution time, so an unknown parser name fails before any row
//! is read.
//!
//! Scalar parsers accept plain numeric literals, list parsers accept a
//! bracketed comma-separated literal (`[1, 2, 3]`), and audio parsers accept
//! a file path whose decoded samples become one list entry per row. Audio
//! parsers additionally record the sample rate as field metadata and keep the
//! original source path for lossless round-trips.

pub mod audio;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float32Builder, Float64Builder, Int16Builder, ListBuilder, StringBuilder,
};

use audio::AudioError;

/// Field metadata key carrying the parser name.
pub const META_PARSER: &str = "parser";
/// Field metadata key carrying the sample rate of an audio field.
pub const META_SAMPLE_RATE: &str = "sample_rate";
/// Suffix of the companion column holding audio source paths.
pub const PATH_COLUMN_SUFFIX: &str = "_filepath";

/// The closed set of parsers a schema may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    /// Scalar 16-bit integer
    Int16,
    /// Scalar 32-bit float
    Float32,
    /// Scalar 64-bit float
    Float64,
    /// UTF-8 string, stored verbatim
    Utf8,
    /// Bracketed list of 16-bit integers
    ListInt16,
    /// Bracketed list of 32-bit floats
    ListFloat32,
    /// Bracketed list of 64-bit floats
    ListFloat64,
    /// Audio file decoded to 16-bit PCM samples
    AudioInt16,
    /// Audio file decoded to normalized 32-bit float samples
    AudioFloat32,
    /// Audio file decoded to normalized 64-bit float samples
    AudioFloat64,
}

/// All registered parser kinds, in registry order.
pub const ALL_PARSERS: [ParserKind; 10] = [
    ParserKind::Int16,
    ParserKind::Float32,
    ParserKind::Float64,
    ParserKind::Utf8,
    ParserKind::ListInt16,
    ParserKind::ListFloat32,
    ParserKind::ListFloat64,
    ParserKind::AudioInt16,
    ParserKind::AudioFloat32,
    ParserKind::AudioFloat64,
];

impl ParserKind {
    /// Resolves a schema-file parser name, or `None` if it is not registered.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int16" => Some(Self::Int16),
            "float32" => Some(Self::Float32),
            "float64" => Some(Self::Float64),
            "utf8" => Some(Self::Utf8),
            "list_int16" => Some(Self::ListInt16),
            "list_float32" => Some(Self::ListFloat32),
            "list_float64" => Some(Self::ListFloat64),
            "audio_int16" => Some(Self::AudioInt16),
            "audio_float32" => Some(Self::AudioFloat32),
            "audio_float64" => Some(Self::AudioFloat64),
            _ => None,
        }
    }

    /// The canonical name written to schema files and container metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Int16 => "int16",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Utf8 => "utf8",
            Self::ListInt16 => "list_int16",
            Self::ListFloat32 => "list_float32",
            Self::ListFloat64 => "list_float64",
            Self::AudioInt16 => "audio_int16",
            Self::AudioFloat32 => "audio_float32",
            Self::AudioFloat64 => "audio_float64",
        }
    }

    /// True for parsers whose raw value is a file path.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::AudioInt16 | Self::AudioFloat32 | Self::AudioFloat64
        )
    }

    /// Creates an empty column builder for this parser.
    ///
    /// `root` is the directory against which relative audio paths are
    /// resolved (the manifest's directory); non-audio parsers ignore it.
    pub fn column_builder(&self, root: &Path) -> ColumnBuilder {
        match self {
            Self::Int16 => ColumnBuilder::Int16(Int16Builder::new()),
            Self::Float32 => ColumnBuilder::Float32(Float32Builder::new()),
            Self::Float64 => ColumnBuilder::Float64(Float64Builder::new()),
            Self::Utf8 => ColumnBuilder::Utf8(StringBuilder::new()),
            Self::ListInt16 => ColumnBuilder::ListInt16(ListBuilder::new(Int16Builder::new())),
            Self::ListFloat32 => {
                ColumnBuilder::ListFloat32(ListBuilder::new(Float32Builder::new()))
            }
            Self::ListFloat64 => {
                ColumnBuilder::ListFloat64(ListBuilder::new(Float64Builder::new()))
            }
            Self::AudioInt16 | Self::AudioFloat32 | Self::AudioFloat64 => {
                ColumnBuilder::Audio(AudioColumnBuilder::new(*self, root.to_path_buf()))
            }
        }
    }
}

/// A cell-level parse failure with field and row attribution.
#[derive(Debug, thiserror::Error)]
#[error("field '{field}', row {row}: {cause}")]
pub struct ParseError {
    /// Field whose column was being parsed
    pub field: String,
    /// Zero-based manifest row index
    pub row: usize,
    /// Underlying cause
    #[source]
    pub cause: ParseCause,
}

/// The cause of a cell-level parse failure.
#[derive(Debug, thiserror::Error)]
pub enum ParseCause {
    /// Malformed or out-of-range integer literal
    #[error("invalid integer literal '{value}': {source}")]
    InvalidInt {
        /// Raw cell value
        value: String,
        /// Parse failure reported by the standard library
        source: std::num::ParseIntError,
    },

    /// Malformed float literal
    #[error("invalid float literal '{value}': {source}")]
    InvalidFloat {
        /// Raw cell value
        value: String,
        /// Parse failure reported by the standard library
        source: std::num::ParseFloatError,
    },

    /// List literal without the surrounding brackets
    #[error("invalid list literal '{value}': expected '[...]'")]
    UnbracketedList {
        /// Raw cell value
        value: String,
    },

    /// Audio file could not be decoded
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Audio file disagrees with the sample rate established by earlier rows
    #[error("'{path}' has sample rate {found}, but earlier rows of this field have {expected}")]
    SampleRateMismatch {
        /// Offending file
        path: String,
        /// Sample rate of the first row
        expected: u32,
        /// Sample rate of this row
        found: u32,
    },
}

/// A finished column: the typed array plus parser-emitted field metadata and,
/// for audio fields, the parallel array of original source paths.
pub struct FinishedColumn {
    /// Typed data array, one entry per row
    pub values: ArrayRef,
    /// Field metadata (`parser`, plus `sample_rate` for audio)
    pub metadata: HashMap<String, String>,
    /// Original source paths for file-backed fields
    pub paths: Option<ArrayRef>,
}

/// Accumulates raw cell values of one field into a typed Arrow array.
pub enum ColumnBuilder {
    /// Scalar i16 column
    Int16(Int16Builder),
    /// Scalar f32 column
    Float32(Float32Builder),
    /// Scalar f64 column
    Float64(Float64Builder),
    /// String column
    Utf8(StringBuilder),
    /// List-of-i16 column
    ListInt16(ListBuilder<Int16Builder>),
    /// List-of-f32 column
    ListFloat32(ListBuilder<Float32Builder>),
    /// List-of-f64 column
    ListFloat64(ListBuilder<Float64Builder>),
    /// Audio column of any encoding
    Audio(AudioColumnBuilder),
}

impl ColumnBuilder {
    /// Parses one raw cell value and appends it to the column.
    pub fn push(&mut self, raw: &str) -> Result<(), ParseCause> {
        match self {
            Self::Int16(b) => {
                b.append_value(parse_int(raw)?);
                Ok(())
            }
            Self::Float32(b) => {
                b.append_value(parse_float::<f32>(raw)?);
                Ok(())
            }
            Self::Float64(b) => {
                b.append_value(parse_float::<f64>(raw)?);
                Ok(())
            }
            Self::Utf8(b) => {
                b.append_value(raw);
                Ok(())
            }
            Self::ListInt16(b) => {
                for element in list_elements(raw)? {
                    b.values().append_value(parse_int(element)?);
                }
                b.append(true);
                Ok(())
            }
            Self::ListFloat32(b) => {
                for element in list_elements(raw)? {
                    b.values().append_value(parse_float::<f32>(element)?);
                }
                b.append(true);
                Ok(())
            }
            Self::ListFloat64(b) => {
                for element in list_elements(raw)? {
                    b.values().append_value(parse_float::<f64>(element)?);
                }
                b.append(true);
                Ok(())
            }
            Self::Audio(b) => b.push(raw),
        }
    }

    /// Finishes the column, yielding the array and its field metadata.
    pub fn finish(self) -> FinishedColumn {
        let parser = self.parser_name();
        match self {
            Self::Int16(mut b) => plain(Arc::new(b.finish()), parser),
            Self::Float32(mut b) => plain(Arc::new(b.finish()), parser),
            Self::Float64(mut b) => plain(Arc::new(b.finish()), parser),
            Self::Utf8(mut b) => plain(Arc::new(b.finish()), parser),
            Self::ListInt16(mut b) => plain(Arc::new(b.finish()), parser),
            Self::ListFloat32(mut b) => plain(Arc::new(b.finish()), parser),
            Self::ListFloat64(mut b) => plain(Arc::new(b.finish()), parser),
            Self::Audio(b) => b.finish(),
        }
    }

    fn parser_name(&self) -> &'static str {
        match self {
            Self::Int16(_) => ParserKind::Int16.name(),
            Self::Float32(_) => ParserKind::Float32.name(),
            Self::Float64(_) => ParserKind::Float64.name(),
            Self::Utf8(_) => ParserKind::Utf8.name(),
            Self::ListInt16(_) => ParserKind::ListInt16.name(),
            Self::ListFloat32(_) => ParserKind::ListFloat32.name(),
            Self::ListFloat64(_) => ParserKind::ListFloat64.name(),
            Self::Audio(b) => b.kind.name(),
        }
    }
}

fn plain(values: ArrayRef, parser: &str) -> FinishedColumn {
    let mut metadata = HashMap::new();
    metadata.insert(META_PARSER.to_string(), parser.to_string());
    FinishedColumn {
        values,
        metadata,
        paths: None,
    }
}

/// Accumulates decoded audio samples plus the provenance path column.
pub struct AudioColumnBuilder {
    kind: ParserKind,
    root: PathBuf,
    sample_rate: Option<u32>,
    paths: StringBuilder,
    i16_values: ListBuilder<Int16Builder>,
    f32_values: ListBuilder<Float32Builder>,
    f64_values: ListBuilder<Float64Builder>,
}

impl AudioColumnBuilder {
    fn new(kind: ParserKind, root: PathBuf) -> Self {
        debug_assert!(kind.is_audio());
        Self {
            kind,
            root,
            sample_rate: None,
            paths: StringBuilder::new(),
            i16_values: ListBuilder::new(Int16Builder::new()),
            f32_values: ListBuilder::new(Float32Builder::new()),
            f64_values: ListBuilder::new(Float64Builder::new()),
        }
    }

    fn push(&mut self, raw: &str) -> Result<(), ParseCause> {
        let given = Path::new(raw);
        let resolved = if given.is_absolute() {
            given.to_path_buf()
        } else {
            self.root.join(given)
        };

        let sample_rate = match self.kind {
            ParserKind::AudioInt16 => {
                let (samples, fs) = audio::read_i16(&resolved)?;
                for sample in samples {
                    self.i16_values.values().append_value(sample);
                }
                self.i16_values.append(true);
                fs
            }
            ParserKind::AudioFloat32 => {
                let (samples, fs) = audio::read_f32(&resolved)?;
                for sample in samples {
                    self.f32_values.values().append_value(sample);
                }
                self.f32_values.append(true);
                fs
            }
            _ => {
                let (samples, fs) = audio::read_f64(&resolved)?;
                for sample in samples {
                    self.f64_values.values().append_value(sample);
                }
                self.f64_values.append(true);
                fs
            }
        };

        match self.sample_rate {
            None => self.sample_rate = Some(sample_rate),
            Some(expected) if expected != sample_rate => {
                return Err(ParseCause::SampleRateMismatch {
                    path: resolved.display().to_string(),
                    expected,
                    found: sample_rate,
                });
            }
            Some(_) => {}
        }

        // Provenance keeps the path exactly as written in the manifest
        self.paths.append_value(raw);
        Ok(())
    }

    fn finish(mut self) -> FinishedColumn {
        let values: ArrayRef = match self.kind {
            ParserKind::AudioInt16 => Arc::new(self.i16_values.finish()),
            ParserKind::AudioFloat32 => Arc::new(self.f32_values.finish()),
            _ => Arc::new(self.f64_values.finish()),
        };

        let mut metadata = HashMap::new();
        metadata.insert(META_PARSER.to_string(), self.kind.name().to_string());
        if let Some(fs) = self.sample_rate {
            metadata.insert(META_SAMPLE_RATE.to_string(), fs.to_string());
        }

        FinishedColumn {
            values,
            metadata,
            paths: Some(Arc::new(self.paths.finish())),
        }
    }
}

fn parse_int(raw: &str) -> Result<i16, ParseCause> {
    raw.trim().parse::<i16>().map_err(|source| ParseCause::InvalidInt {
        value: raw.to_string(),
        source,
    })
}

fn parse_float<T: std::str::FromStr<Err = std::num::ParseFloatError>>(
    raw: &str,
) -> Result<T, ParseCause> {
    raw.trim().parse::<T>().map_err(|source| ParseCause::InvalidFloat {
        value: raw.to_string(),
        source,
    })
}

fn list_elements(raw: &str) -> Result<impl Iterator<Item = &str>, ParseCause> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ParseCause::UnbracketedList {
            value: raw.to_string(),
        })?;
    Ok(inner
        .split(',')
        .map(str::trim)
        .filter(|element| !element.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int16Array, ListArray, StringArray};

    fn finish_values(builder: ColumnBuilder) -> ArrayRef {
        builder.finish().values
    }

    #[test]
    fn parser_names_roundtrip() {
        for kind in ALL_PARSERS {
            assert_eq!(ParserKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ParserKind::from_name("as_pickle"), None);
    }

    #[test]
    fn scalar_int16_column() {
        let mut builder = ParserKind::Int16.column_builder(Path::new("."));
        builder.push("7").unwrap();
        builder.push(" -32768 ").unwrap();

        let values = finish_values(builder);
        let ints = values.as_any().downcast_ref::<Int16Array>().unwrap();
        assert_eq!(ints.value(0), 7);
        assert_eq!(ints.value(1), -32768);
    }

    #[test]
    fn int16_overflow_is_rejected() {
        let mut builder = ParserKind::Int16.column_builder(Path::new("."));
        let err = builder.push("40000").unwrap_err();
        assert!(matches!(err, ParseCause::InvalidInt { .. }));
    }

    #[test]
    fn utf8_column_stores_verbatim() {
        let mut builder = ParserKind::Utf8.column_builder(Path::new("."));
        builder.push("train").unwrap();
        builder.push(" spaced ").unwrap();

        let values = finish_values(builder);
        let strings = values.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(strings.value(0), "train");
        assert_eq!(strings.value(1), " spaced ");
    }

    #[test]
    fn list_literal_parses_elements() {
        let mut builder = ParserKind::ListInt16.column_builder(Path::new("."));
        builder.push("[1, 2, 3]").unwrap();
        builder.push("[]").unwrap();

        let values = finish_values(builder);
        let lists = values.as_any().downcast_ref::<ListArray>().unwrap();
        assert_eq!(lists.len(), 2);
        let first = lists.value(0);
        let first = first.as_any().downcast_ref::<Int16Array>().unwrap();
        assert_eq!(first.values().to_vec(), vec![1i16, 2, 3]);
        assert_eq!(lists.value(1).len(), 0);
    }

    #[test]
    fn list_without_brackets_is_rejected() {
        let mut builder = ParserKind::ListFloat32.column_builder(Path::new("."));
        let err = builder.push("1.0, 2.0").unwrap_err();
        assert!(matches!(err, ParseCause::UnbracketedList { .. }));
    }

    #[test]
    fn list_with_bad_element_is_rejected() {
        let mut builder = ParserKind::ListFloat64.column_builder(Path::new("."));
        let err = builder.push("[1.0, beep]").unwrap_err();
        assert!(matches!(err, ParseCause::InvalidFloat { .. }));
    }

    #[test]
    fn audio_column_collects_samples_and_paths() {
        let dir = tempfile::tempdir().unwrap();
        audio::write_i16(&dir.path().join("a.wav"), &[1, 2, 3], 16_000).unwrap();
        audio::write_i16(&dir.path().join("b.wav"), &[4, 5], 16_000).unwrap();

        let mut builder = ParserKind::AudioInt16.column_builder(dir.path());
        builder.push("a.wav").unwrap();
        builder.push("b.wav").unwrap();

        let finished = builder.finish();
        assert_eq!(
            finished.metadata.get(META_SAMPLE_RATE).map(String::as_str),
            Some("16000")
        );
        let lists = finished
            .values
            .as_any()
            .downcast_ref::<ListArray>()
            .unwrap();
        assert_eq!(lists.len(), 2);
        assert_eq!(lists.value(0).len(), 3);
        assert_eq!(lists.value(1).len(), 2);

        let paths = finished.paths.unwrap();
        let paths = paths.as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(paths.value(0), "a.wav");
        assert_eq!(paths.value(1), "b.wav");
    }

    #[test]
    fn audio_sample_rate_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        audio::write_i16(&dir.path().join("a.wav"), &[1], 16_000).unwrap();
        audio::write_i16(&dir.path().join("b.wav"), &[2], 8_000).unwrap();

        let mut builder = ParserKind::AudioInt16.column_builder(dir.path());
        builder.push("a.wav").unwrap();
        let err = builder.push("b.wav").unwrap_err();
        assert!(matches!(err, ParseCause::SampleRateMismatch { .. }));
    }
}
