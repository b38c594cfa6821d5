use std::path::PathBuf;

use anyhow::{bail, Result};

use rowpack::reader::Container;

pub fn run(file: PathBuf) -> Result<()> {
    if !file.is_file() {
        bail!("file '{}' does not exist", file.display());
    }

    let container = Container::open(&file)?;

    println!("Container Information");
    println!("=====================");
    println!("File: {}", file.display());
    println!(
        "Kind: {}",
        if container.is_virtual() {
            "virtual composition"
        } else {
            "physical container"
        }
    );
    println!("Rows: {}", container.row_count());
    println!();

    println!("Attributes:");
    for (key, value) in container.attrs() {
        println!("  {key}: {value}");
    }
    println!();

    println!("Fields:");
    for field in container.fields() {
        let parser = field.parser.as_deref().unwrap_or("<none>");
        println!("  {} ({parser}, {})", field.name, field.data_type);
        for (key, value) in &field.metadata {
            if key != "parser" {
                println!("    {key}: {value}");
            }
        }
    }

    Ok(())
}
