//! # rowpack - Partitioned Dataset Containers
//!
//! `rowpack` converts a tabular manifest (rows describing raw files and
//! per-row annotations) plus a declarative schema into one or more
//! self-describing Parquet containers, and reverses the process losslessly.
//!
//! ## Key Features
//!
//! - **Typed packing**: Every manifest column referenced by a field is
//!   converted to a typed Arrow array through a closed parser registry,
//!   validated against the schema before any row is read.
//!
//! - **Deterministic partitioning**: Rows split into disjoint, contiguous
//!   partitions — either a fixed partition count or a fixed rows-per-partition
//!   size — and the same inputs always produce the same partition files.
//!
//! - **Bounded parallel builds**: Each partition is an independent unit of
//!   work; a worker pool builds them concurrently, and a failed partition
//!   never disturbs its siblings.
//!
//! - **Virtual composition**: Separately-built containers merge into one
//!   logical dataset by reference, without copying a single data byte.
//!
//! - **Integrity ledger**: SHA-256 digests persist alongside the containers
//!   and re-verify them at any later time.
//!
//! - **Lossless audio round-trips**: File-backed audio fields store the
//!   decoded samples plus the original source paths, so unpacking re-creates
//!   the raw files and a manifest/schema pair that re-packs equivalently.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rowpack::builder::{self, ProducerStamp};
//! use rowpack::manifest::Manifest;
//! use rowpack::plan::{plan, PlanMode};
//! use rowpack::pool;
//! use rowpack::schema::{resolve, RawSchema};
//! # fn main() -> anyhow::Result<()> {
//!
//! let raw = RawSchema::load("rowpack.toml".as_ref())?;
//! let manifest = Manifest::from_path(&raw.manifest_path(None)?)?;
//! let spec = resolve(&raw, None, manifest.header())?;
//!
//! let plan = plan(manifest.row_count(), PlanMode::FixedCount(4))?;
//! let outputs: Vec<_> = plan
//!     .iter()
//!     .map(|r| builder::partition_path("out/dataset".as_ref(), r.index, plan.len()))
//!     .collect();
//!
//! let results = pool::run_all(
//!     &plan,
//!     &spec,
//!     &manifest,
//!     &outputs,
//!     0, // one worker per core
//!     &ProducerStamp::current(),
//! );
//! for (range, result) in results {
//!     println!("partition #{}: {:?}", range.index, result.is_ok());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into the following modules, leaves first:
//!
//! - [`parsers`]: the closed parser registry and the audio codec collaborator
//! - [`schema`]: schema file loading and resolution against a manifest header
//! - [`manifest`]: CSV manifest loading
//! - [`plan`]: deterministic partition planning
//! - [`builder`]: one-partition container builds with atomic publishing
//! - [`pool`]: bounded-parallel partition execution
//! - [`reader`]: physical and virtual container reading
//! - [`compose`]: non-copying virtual composition
//! - [`checksum`]: the SHA-256 sidecar ledger
//! - [`unpack`]: manifest/schema/raw-file reconstruction
//! - [`discover`]: container discovery with select/filter patterns
//!
//! ## Container Layout
//!
//! A container is a standard Parquet file. Root attributes (`creation_date`,
//! `producer`, user attrs) live in the footer key-value metadata; each field
//! is one column whose Arrow metadata carries `parser` and, for audio,
//! `sample_rate`; audio fields have a companion `<field>_filepath` column of
//! original source paths. Any Parquet-compatible tool can read the data
//! columns directly.

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod checksum;
pub mod compose;
pub mod discover;
pub mod format;
pub mod manifest;
pub mod parsers;
pub mod plan;
pub mod pool;
pub mod reader;
pub mod schema;
pub mod unpack;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::builder::{build, partition_path, BuildError, BuildReport, ProducerStamp};
    pub use crate::checksum::{
        compute, file_digest, verify, ChecksumError, LedgerEntry, VerifyOutcome, VerifyStatus,
    };
    pub use crate::compose::{compose, ComposeOptions, ComposeReport, CompositionError};
    pub use crate::manifest::{Manifest, ManifestError};
    pub use crate::parsers::{ParseError, ParserKind};
    pub use crate::plan::{plan, PartitionPlan, PartitionRange, PlanError, PlanMode};
    pub use crate::pool::{run_all, PoolResults};
    pub use crate::reader::{Container, FieldData, FieldInfo, ReaderError};
    pub use crate::schema::{resolve, DatasetSpec, FieldSpec, RawSchema, SchemaError};
    pub use crate::unpack::{unpack, UnpackError, UnpackReport};
}
