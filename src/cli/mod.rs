use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

mod checksum;
mod info;
mod pack;
mod unpack;
mod virtual_view;

/// rowpack - pack tabular manifests into partitioned Parquet containers
#[derive(Parser)]
#[command(name = "rowpack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a manifest and schema into container partition(s)
    Pack {
        /// TOML schema file with dataset specifications
        #[arg(short = 'i', long)]
        config: PathBuf,

        /// Dataset name if the schema declares more than one
        #[arg(short, long)]
        dataset: Option<String>,

        /// Output container path; partitions derive their names from it
        #[arg(short, long)]
        output: PathBuf,

        /// Number of partitions to generate
        #[arg(short, long, default_value_t = 1)]
        partitions: usize,

        /// Rows per partition (mutually exclusive with --partitions)
        #[arg(long, conflicts_with = "partitions")]
        files_per_partition: Option<usize>,

        /// Number of workers (0 means one worker per core)
        #[arg(short, long, default_value_t = 0)]
        workers: usize,

        /// Also compose the partitions into a virtual dataset
        #[arg(long)]
        create_virtual: bool,

        /// Skip writing the checksum ledger
        #[arg(long)]
        skip_checksum: bool,

        /// Replace existing container files
        #[arg(long)]
        overwrite: bool,

        /// Unattended mode (no confirmation prompt)
        #[arg(short, long)]
        yes: bool,
    },

    /// Unpack a container back into a manifest, schema, and raw files
    Unpack {
        /// Input container (.rpk) or virtual composition (.vrpk)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output folder (defaults to the input path without extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compose containers into a virtual dataset without copying data
    Virtual {
        /// Input container file(s) or folder(s) containing them
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output virtual dataset path (.vrpk)
        #[arg(short, long)]
        output: PathBuf,

        /// Search folders recursively
        #[arg(short, long)]
        recursive: bool,

        /// Keep only sources matching this glob pattern
        #[arg(short, long, value_name = "PATTERN")]
        select: Option<String>,

        /// Drop sources matching this glob pattern
        #[arg(short, long, value_name = "PATTERN", conflicts_with = "select")]
        filter: Option<String>,

        /// Root attributes as KEY VALUE pairs
        #[arg(short, long, num_args = 1.., value_name = "KEY VALUE")]
        attrs: Option<Vec<String>>,

        /// Store absolute source paths instead of relative ones
        #[arg(long)]
        force_abspath: bool,

        /// Unattended mode (no confirmation prompt)
        #[arg(short, long)]
        yes: bool,
    },

    /// Display information about a container or virtual dataset
    Info {
        /// Input container (.rpk) or virtual composition (.vrpk)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Compute or verify container checksums
    Checksum {
        /// A .sha256 ledger to verify, or container file(s)/folder(s) to digest
        #[arg(value_name = "INPUT", required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Search folders recursively
        #[arg(short, long)]
        recursive: bool,

        /// Write the computed digests to a ledger at this path
        #[arg(long, value_name = "FILE")]
        save: Option<PathBuf>,
    },
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Pack {
            config,
            dataset,
            output,
            partitions,
            files_per_partition,
            workers,
            create_virtual,
            skip_checksum,
            overwrite,
            yes,
        } => pack::run(pack::PackArgs {
            config,
            dataset,
            output,
            partitions,
            files_per_partition,
            workers,
            create_virtual,
            skip_checksum,
            overwrite,
            yes,
        }),
        Commands::Unpack { input, output } => unpack::run(input, output),
        Commands::Virtual {
            input,
            output,
            recursive,
            select,
            filter,
            attrs,
            force_abspath,
            yes,
        } => virtual_view::run(virtual_view::VirtualArgs {
            input,
            output,
            recursive,
            select,
            filter,
            attrs,
            force_abspath,
            yes,
        }),
        Commands::Info { file } => info::run(file),
        Commands::Checksum {
            input,
            recursive,
            save,
        } => checksum::run(input, recursive, save),
    }
}

/// Asks for interactive confirmation; declining aborts the command.
fn confirm(prompt: &str) -> Result<()> {
    print!("{prompt} Continue? [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    if !matches!(answer.trim(), "y" | "Y" | "yes") {
        bail!("aborted by user");
    }
    Ok(())
}

/// Parses `--attrs KEY VALUE KEY VALUE ...` into pairs.
fn attr_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    if raw.len() % 2 != 0 {
        bail!(
            "--attrs expects an even number of items, alternating keys and values \
             (got {})",
            raw.len()
        );
    }
    Ok(raw
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}
