use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use rowpack::builder::{ensure_extension, ProducerStamp};
use rowpack::compose::{compose, ComposeOptions};
use rowpack::discover;
use rowpack::format::VIRTUAL_EXT;

pub struct VirtualArgs {
    pub input: Vec<PathBuf>,
    pub output: PathBuf,
    pub recursive: bool,
    pub select: Option<String>,
    pub filter: Option<String>,
    pub attrs: Option<Vec<String>>,
    pub force_abspath: bool,
    pub yes: bool,
}

pub fn run(args: VirtualArgs) -> Result<()> {
    let attrs = match &args.attrs {
        Some(raw) => super::attr_pairs(raw)?,
        None => Vec::new(),
    };

    println!("Collecting input files ...");
    let mut sources = discover::collect_containers(&args.input, args.recursive)?;
    if sources.is_empty() {
        bail!(
            "0 container files found; use --recursive if you intended a recursive search"
        );
    }
    println!("{} container file(s) found", sources.len());

    if let Some(pattern) = &args.select {
        sources = discover::select(sources, pattern)?;
        println!(
            "{} file(s) remain after applying --select '{pattern}'",
            sources.len()
        );
    }
    if let Some(pattern) = &args.filter {
        sources = discover::filter_out(sources, pattern)?;
        println!(
            "{} file(s) remain after applying --filter '{pattern}'",
            sources.len()
        );
    }
    if sources.is_empty() {
        bail!("no container files left after filtering");
    }

    println!("A virtual dataset will be created from:");
    for (index, source) in sources.iter().enumerate() {
        println!("  {}. '{}'", index + 1, source.display());
    }

    if !args.yes {
        super::confirm("The listed files will be composed.")?;
    }

    let output = ensure_extension(&args.output, VIRTUAL_EXT);
    let options = ComposeOptions {
        force_abspath: args.force_abspath,
        attrs,
    };
    let report = compose(&sources, &output, &options, &ProducerStamp::current())
        .context("virtual composition failed")?;

    println!(
        "Virtual dataset saved to '{}' ({} row(s) across {} source(s))",
        report.path.display(),
        report.rows,
        report.sources
    );
    Ok(())
}
