use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use toa_residuals::prelude::PlotAxis;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v: debug, -vv: trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate residual files from TOA lists.
    Residuals {
        /// Timing model (parameter file)
        #[arg(short, long)]
        par: PathBuf,
        /// TOA lists, or directories searched for .tim files
        #[arg(short, long, required = true, num_args = 1..)]
        tim: Vec<PathBuf>,
        /// TOA selection file
        #[arg(short, long)]
        select: Option<PathBuf>,
        /// Phase align the residuals on a synthetic reference TOA
        #[arg(short, long)]
        align: bool,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Measure the dispersion measure of TOA lists.
    Dm {
        /// Timing model (parameter file)
        #[arg(short, long)]
        par: PathBuf,
        /// TOA lists, or directories searched for .tim files
        #[arg(short, long, required = true, num_args = 1..)]
        tim: Vec<PathBuf>,
        /// TOA selection file
        #[arg(short, long)]
        select: Option<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Summarize residual files: count, weighted mean and weighted RMS.
    Summary {
        /// Full precision residual files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Reject outliers, using the configured threshold
        #[arg(long)]
        clean: bool,
        /// Reject outliers beyond this many robust sigmas
        #[arg(short = 'f', long)]
        outlier_factor: Option<f64>,
        /// Rebase the residuals on their mean phase
        #[arg(short, long)]
        rebase: bool,
        /// Plot abscissa of the exported series
        #[arg(long, default_value = "mjd")]
        axis: PlotAxis,
        /// Number of frequency channels, for sequential numbering
        #[arg(long)]
        nchan: Option<usize>,
        /// Export the plot series of each file in this directory
        #[arg(long, value_name = "DIR")]
        series: Option<PathBuf>,
        /// Report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration.
    Config,
}
