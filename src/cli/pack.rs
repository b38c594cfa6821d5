use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::debug;

use rowpack::builder::{partition_path, ProducerStamp};
use rowpack::checksum::{self, LedgerEntry};
use rowpack::compose::{compose, ComposeOptions};
use rowpack::format::{LEDGER_EXT, VIRTUAL_EXT};
use rowpack::manifest::Manifest;
use rowpack::plan::{plan, PlanMode};
use rowpack::pool;
use rowpack::schema::{resolve, RawSchema};

pub struct PackArgs {
    pub config: PathBuf,
    pub dataset: Option<String>,
    pub output: PathBuf,
    pub partitions: usize,
    pub files_per_partition: Option<usize>,
    pub workers: usize,
    pub create_virtual: bool,
    pub skip_checksum: bool,
    pub overwrite: bool,
    pub yes: bool,
}

pub fn run(args: PackArgs) -> Result<()> {
    let raw = RawSchema::load(&args.config).context("failed to load schema")?;
    println!("Using root folder '{}'", raw.root().display());

    let manifest_path = raw.manifest_path(args.dataset.as_deref())?;
    let manifest = Manifest::from_path(&manifest_path).context("failed to load manifest")?;

    let spec = resolve(&raw, args.dataset.as_deref(), manifest.header())
        .context("schema validation failed")?;
    println!(
        "Packing dataset '{}' ({} field(s), {} row(s))",
        spec.name,
        spec.fields.len(),
        manifest.row_count()
    );

    let mode = match args.files_per_partition {
        Some(rows_per) => PlanMode::RowsPer(rows_per),
        None if args.partitions <= 1 => PlanMode::Single,
        None => PlanMode::FixedCount(args.partitions),
    };
    let plan = plan(manifest.row_count(), mode).context("partition planning failed")?;
    debug!("plan: {:?}", plan.ranges());

    let outputs: Vec<PathBuf> = plan
        .iter()
        .map(|range| partition_path(&args.output, range.index, plan.len()))
        .collect();

    for output in &outputs {
        if output.exists() && !args.overwrite {
            bail!(
                "'{}' already exists; use --overwrite to replace existing files",
                output.display()
            );
        }
    }

    if !args.yes {
        super::confirm(&format!("{} partition(s) will be created.", plan.len()))?;
    }

    let stamp = ProducerStamp::current();
    let results = pool::run_all(&plan, &spec, &manifest, &outputs, args.workers, &stamp);

    let mut failures = 0;
    for (range, result) in &results {
        match result {
            Ok(report) => {
                println!(
                    "Partition #{} saved to '{}' ({} row(s))",
                    report.partition,
                    report.path.display(),
                    report.rows
                );
            }
            Err(error) => {
                failures += 1;
                eprintln!("Partition #{} failed: {error}", range.index);
            }
        }
    }

    if failures > 0 {
        bail!(
            "{failures} of {} partition(s) failed; completed partitions were kept on disk",
            results.len()
        );
    }

    let mut covered = outputs.clone();

    if args.create_virtual && plan.len() > 1 {
        let virtual_path = sibling_path(&args.output, VIRTUAL_EXT);
        let report = compose(&outputs, &virtual_path, &ComposeOptions::default(), &stamp)
            .context("virtual composition failed")?;
        println!(
            "Virtual dataset saved to '{}' ({} row(s) across {} source(s))",
            report.path.display(),
            report.rows,
            report.sources
        );
        covered.push(virtual_path);
    }

    if !args.skip_checksum {
        let ledger_path = sibling_path(&args.output, LEDGER_EXT);
        let mut entries = Vec::with_capacity(covered.len());
        for file in &covered {
            entries.push(LedgerEntry {
                path: checksum::ledger_entry_path(file, &ledger_path),
                digest: checksum::file_digest(file)?,
            });
        }
        checksum::save(&entries, &ledger_path)?;
        println!("Checksum ledger saved to '{}'", ledger_path.display());
    }

    println!("{} partition(s) created", plan.len());
    Ok(())
}

/// Derives a sidecar path (`.vrpk`, `.sha256`) from the pack output path.
fn sibling_path(output: &std::path::Path, ext: &str) -> PathBuf {
    match output.extension() {
        Some(existing) if existing == "rpk" => output.with_extension(ext),
        _ => rowpack::builder::ensure_extension(output, ext),
    }
}
