//! # rowpack CLI
//!
//! Command-line interface for packing, unpacking, composing, inspecting, and
//! verifying partitioned dataset containers.
//!
//! ## Usage
//!
//! ```bash
//! # Pack a manifest into 4 container partitions plus a virtual view
//! rowpack pack -i rowpack.toml -o out/dataset -p 4 --create-virtual -y
//!
//! # Recreate the manifest, schema, and raw files
//! rowpack unpack out/dataset.pt0.rpk -o restored/
//!
//! # Compose previously built containers
//! rowpack virtual -i out/ -o all.vrpk -r -y
//!
//! # Verify integrity later
//! rowpack checksum out/dataset.sha256
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbosity());
    cli::dispatch(cli)
}
