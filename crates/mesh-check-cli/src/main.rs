//! mesh-check: Command-line front end for mesh defect checks.
//!
//! Three modes are available:
//! - `single`: check one OBJ file and print its summary
//! - `batch`: check every OBJ file in a folder, optionally writing a CSV table
//! - `intersect`: test apparel meshes against a mannequin mesh
//!
//! # Logging
//!
//! Set the `RUST_LOG` environment variable to control log output:
//! - `RUST_LOG=mesh_check=info` - Basic operation logging
//! - `RUST_LOG=mesh_check=debug` - Detailed analysis logging
//! - `RUST_LOG=mesh_check::timing=debug` - Performance timing
//!
//! # Example
//!
//! ```bash
//! mesh-check single model.obj
//! mesh-check batch ./assets --output results.csv --workers 8
//! mesh-check intersect --mannequin body.obj --apparel shirt.obj pants.obj
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod csv;
mod loader;
mod output;

use commands::{CheckArgs, batch, intersect, single};

/// mesh-check - Find defects in triangle meshes.
///
/// Reports watertightness, non-manifold vertices, self-intersections, holes,
/// degenerate faces, and UV layout problems.
#[derive(Parser)]
#[command(name = "mesh-check")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format for results
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Suppress all non-error output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    /// Increase output verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a single OBJ file
    Single {
        /// Input OBJ file
        input: PathBuf,

        #[command(flatten)]
        checks: CheckArgs,
    },

    /// Check every OBJ file in a folder
    Batch {
        /// Folder to scan for .obj files
        folder: PathBuf,

        /// Write a CSV table of results to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Worker threads ("auto" or a positive integer)
        #[arg(long, default_value = "auto")]
        workers: String,

        #[command(flatten)]
        checks: CheckArgs,
    },

    /// Test apparel meshes against a mannequin
    Intersect {
        /// Reference mesh (mannequin)
        #[arg(long)]
        mannequin: PathBuf,

        /// Meshes to probe against the mannequin
        #[arg(long, num_args = 1.., required = true)]
        apparel: Vec<PathBuf>,

        /// Contact tolerance
        #[arg(long, default_value = "1e-10")]
        epsilon: f64,
    },
}

/// Initialize the tracing subscriber based on verbosity level.
fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v flags
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "warn",
            1 => "mesh_check=info,mesh_check_cli=info",
            2 => "mesh_check=debug,mesh_check_cli=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn main() -> Result<()> {
    #[cfg(debug_assertions)]
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Single { input, checks } => single::run(input, checks, &cli),
        Commands::Batch {
            folder,
            output,
            workers,
            checks,
        } => batch::run(folder, output.as_deref(), workers, checks, &cli),
        Commands::Intersect {
            mannequin,
            apparel,
            epsilon,
        } => intersect::run(mannequin, apparel, *epsilon, &cli),
    };

    if let Err(e) = &result {
        if !cli.quiet {
            if let Some(mesh_err) = e.downcast_ref::<mesh_check::MeshError>() {
                eprintln!("{}: {}", "Error".red().bold(), mesh_err);
                eprintln!("  {}: {}", "Code".cyan(), mesh_err.code());
                if let Some(help) = miette::Diagnostic::help(mesh_err) {
                    eprintln!("  {}: {}", "Suggestion".green(), help);
                }
            } else {
                eprintln!("{}: {}", "Error".red().bold(), e);
                for cause in e.chain().skip(1) {
                    eprintln!("  {}: {}", "Caused by".yellow(), cause);
                }
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
