mod cli;

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use itertools::Itertools;
use log::{error, info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use toa_residuals::prelude::{
    generate_residuals, measure_dm, read_residuals, reduce, weighted_mean, weighted_rms, FitMode,
    FitRequest, PipelineConfig, PlotOptions, PlotSeries, ResidualRequest, Tempo2,
};

use cli::{Cli, Command};

fn setup_logging(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        _ => builder.filter_level(log::LevelFilter::Trace),
    };
    builder.init();
}

/// Expands directories into the .tim files they contain.
fn toa_lists(inputs: &[PathBuf]) -> Vec<PathBuf> {
    inputs
        .iter()
        .flat_map(|input| {
            if input.is_dir() {
                WalkDir::new(input)
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry.into_path()),
                        Err(e) => {
                            warn!("{}", e);
                            None
                        },
                    })
                    .filter(|path| {
                        path.is_file()
                            && path.extension().map(|ext| ext == "tim").unwrap_or(false)
                    })
                    .collect::<Vec<_>>()
            } else {
                vec![input.clone()]
            }
        })
        .sorted()
        .dedup()
        .collect()
}

/// Summary report of one residual file
#[derive(Debug, Serialize)]
struct Summary {
    file: String,
    count: usize,
    weighted_mean_us: Option<f64>,
    wrms_us: Option<f64>,
}

fn summarize(
    path: &Path,
    options: &PlotOptions,
    config: &PipelineConfig,
    series_dir: Option<&Path>,
) -> Result<Summary, Box<dyn std::error::Error>> {
    let residuals = read_residuals(path)?;

    // statistics describe the plotted residuals
    let displayed = reduce(&residuals, options)?;
    let series = PlotSeries::from_reduced(&displayed, options, &config.display)?;

    let (weighted_mean_us, wrms_us) = if displayed.is_empty() {
        (None, None)
    } else {
        (
            Some(weighted_mean(&displayed)? * 1.0E6),
            Some(weighted_rms(&displayed)? * 1.0E6),
        )
    };

    if let Some(dir) = series_dir {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let output = dir.join(format!("{}.series.txt", name));
        let mut writer = BufWriter::new(File::create(&output)?);
        series.format(&mut writer)?;
        info!("plot series exported to {}", output.display());
    }

    Ok(Summary {
        file: path.display().to_string(),
        count: displayed.len(),
        weighted_mean_us,
        wrms_us,
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            },
        },
        None => PipelineConfig::default(),
    };

    let mut failures = 0;

    match cli.command {
        Command::Residuals {
            par,
            tim,
            select,
            align,
            out_dir,
        } => {
            let fitter = Tempo2::new(config.fitter.clone());
            let lists = toa_lists(&tim);
            info!("{} toa lists to process", lists.len());

            for tim in lists {
                let mut request = ResidualRequest::new(&par, &tim)
                    .with_out_dir(&out_dir)
                    .with_alignment(align);
                if let Some(select) = &select {
                    request = request.with_select(select);
                }

                match generate_residuals(&fitter, &request, &config) {
                    Ok(products) => info!(
                        "{}: {} residuals ({})",
                        tim.display(),
                        products.residuals.len(),
                        products.paths.residuals.display()
                    ),
                    Err(e) => {
                        error!("{}: {}", tim.display(), e);
                        failures += 1;
                    },
                }
            }
        },
        Command::Dm {
            par,
            tim,
            select,
            out_dir,
        } => {
            let fitter = Tempo2::new(config.fitter.clone());

            for tim in toa_lists(&tim) {
                let mut request = FitRequest::new(&par, &tim, FitMode::DispersionMeasure);
                if let Some(select) = &select {
                    request = request.with_select(select);
                }

                match measure_dm(&fitter, &request, &out_dir) {
                    Ok(Some(dm)) => println!(
                        "{}\tDM={}\tERR={}\tEPOCH={}",
                        tim.display(),
                        dm.dm,
                        dm.error,
                        dm.epoch
                    ),
                    Ok(None) => warn!("{}: no valid dm measurement", tim.display()),
                    Err(e) => {
                        error!("{}: {}", tim.display(), e);
                        failures += 1;
                    },
                }
            }
        },
        Command::Summary {
            files,
            clean,
            outlier_factor,
            rebase,
            axis,
            nchan,
            series,
            json,
        } => {
            let mut config = config;
            if nchan.is_some() {
                config.display.nchan = nchan;
            }

            let factor = match (outlier_factor, clean) {
                (Some(factor), _) => Some(factor),
                (None, true) => Some(config.outliers.factor),
                (None, false) => None,
            };

            let mut options = PlotOptions::default().with_axis(axis).with_rebase(rebase);
            if let Some(factor) = factor {
                options = options.with_outlier_factor(factor);
            }

            for file in files {
                match summarize(&file, &options, &config, series.as_deref()) {
                    Ok(summary) => {
                        if json {
                            match serde_json::to_string(&summary) {
                                Ok(content) => println!("{}", content),
                                Err(e) => error!("{}", e),
                            }
                        } else {
                            println!(
                                "{}\t{}\t{}\t{}",
                                summary.file,
                                summary.count,
                                summary
                                    .weighted_mean_us
                                    .map(|v| format!("{:.3}", v))
                                    .unwrap_or_else(|| "-".to_string()),
                                summary
                                    .wrms_us
                                    .map(|v| format!("{:.3}", v))
                                    .unwrap_or_else(|| "-".to_string()),
                            );
                        }
                    },
                    Err(e) => {
                        error!("{}: {}", file.display(), e);
                        failures += 1;
                    },
                }
            }
        },
        Command::Config => match serde_json::to_string_pretty(&config) {
            Ok(content) => println!("{}", content),
            Err(e) => {
                error!("{}", e);
                failures += 1;
            },
        },
    }

    if failures > 0 {
        error!("{} failure(s)", failures);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
