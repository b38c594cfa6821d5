use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use rowpack::unpack::unpack;

pub fn run(input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    if !input.is_file() {
        bail!("input file '{}' does not exist", input.display());
    }

    // Default output folder: the input path without its extension
    let output = output.unwrap_or_else(|| input.with_extension(""));

    println!(
        "Unpacking '{}' into '{}' ...",
        input.display(),
        output.display()
    );

    let report = unpack(&input, &output).context("unpacking failed")?;

    println!(
        "Unpacked {} row(s) across {} field(s)",
        report.rows, report.fields
    );
    println!("Manifest written to '{}'", report.manifest_path.display());
    println!("Schema written to '{}'", report.schema_path.display());
    Ok(())
}
