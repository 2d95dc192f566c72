//!
//! Command-line interface for flattening detector-simulation dumps into
//! randomly-indexable HDF5 datasets and merging the results.
#![allow(clippy::uninlined_format_args)]

use clap::{Parser, Subcommand, ValueEnum};
use flathit_core::{QualifyConfig, QualifyPolicy, Stream, VetoConfig};
use flathit_io::{
    convert_files, file_summary, merge_files, ConvertConfig, ProvenanceAttrs,
};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    FlathitIo(#[from] flathit_io::Error),
}

/// Qualification policy selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    /// Qualify each sensor stream against the threshold on its own
    Independent,
    /// Qualify on the summed hit count across streams
    Combined,
}

impl From<Policy> for QualifyPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Independent => QualifyPolicy::Independent,
            Policy::Combined => QualifyPolicy::Combined,
        }
    }
}

/// Detector-simulation hit flattening.
#[derive(Parser)]
#[command(name = "flathit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert simulation dump file(s) into one flat dataset
    Convert {
        /// Input dump file(s)
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum hit count for event retention
        #[arg(long, default_value = "1")]
        min_hits: usize,

        /// How per-stream hit counts combine into the retention decision
        #[arg(long, value_enum, default_value = "independent")]
        policy: Policy,

        /// Detector cylinder radius (veto geometry)
        #[arg(short = 'R', long)]
        radius: f32,

        /// Detector cylinder half-height (veto geometry)
        #[arg(short = 'H', long)]
        half_height: f32,

        /// Muon veto energy threshold
        #[arg(long, default_value = "166.0")]
        muon_energy: f32,

        /// Electron veto energy threshold
        #[arg(long, default_value = "2.0")]
        electron_energy: f32,

        /// Photon veto energy threshold
        #[arg(long, default_value = "2.0")]
        gamma_energy: f32,

        /// Energy loss per unit track length for the end-of-track estimate
        #[arg(long, default_value = "2.0")]
        energy_loss_rate: f32,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Merge flat datasets by concatenation, re-basing offset indices
    Merge {
        /// Input flat dataset file(s), merged in the given order
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the layout and provenance of a flat dataset
    Info {
        /// Input flat dataset file
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            output,
            min_hits,
            policy,
            radius,
            half_height,
            muon_energy,
            electron_energy,
            gamma_energy,
            energy_loss_rate,
            verbose,
        } => {
            if verbose {
                eprintln!("Converting {} file(s)...", input.len());
                eprintln!("Policy: {:?}, min hits: {}", policy, min_hits);
                eprintln!("Volume: radius {}, half-height {}", radius, half_height);
            }

            let config = ConvertConfig {
                qualify: QualifyConfig {
                    min_hits,
                    policy: policy.into(),
                },
                veto: VetoConfig {
                    radius,
                    half_height,
                    muon_energy,
                    electron_energy,
                    gamma_energy,
                    energy_loss_rate,
                },
            };
            let attrs = ProvenanceAttrs::for_invocation(env!("CARGO_PKG_VERSION"));

            let start = Instant::now();
            let summary = convert_files(&input, &output, &config, &attrs, verbose)?;
            let elapsed = start.elapsed();

            println!(
                "Converted {} files ({} events) in {:.2}s",
                summary.files,
                summary.events,
                elapsed.as_secs_f64()
            );
            println!("Rows written: {}", summary.rows);
            for stream in Stream::ALL {
                println!(
                    "Hits written ({}): {}",
                    stream,
                    summary.stream_hits[stream.index()]
                );
            }
            println!("Output: {}", output.display());
        }

        Commands::Merge { input, output } => {
            merge_files(&input, &output)?;
            println!("Merged {} files into {}", input.len(), output.display());
        }

        Commands::Info { input } => {
            let summary = file_summary(&input)?;
            println!("File: {}", input.display());
            for (name, value) in &summary.attrs {
                println!("  attr {}: {}", name, value);
            }
            for dataset in &summary.datasets {
                println!(
                    "  {} shape {:?} dtype {}",
                    dataset.name, dataset.shape, dataset.dtype
                );
            }
        }
    }

    Ok(())
}
