//! mvme listfile decoder CLI application.
//!
//! Converts mvme listfiles into per-event CSV tables and per-channel
//! histograms.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mvme_core::output::{write_histograms, CsvSink, HistogramSink};
use mvme_core::runlog::RUN_LOG_FILE;
use mvme_core::{Calibration, DecodeSummary, ListfileDecoder, RunLog};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Calibration file mvme keeps next to its listfiles.
const ANALYSIS_FILE: &str = "analysis.analysis";

/// Decoder for mvme VME DAQ listfiles.
///
/// Writes `<name>.csv` with one row per event and `<name>_histos.csv` with
/// the per-channel ADC and TDC histograms for every input listfile.
#[derive(Parser, Debug)]
#[command(name = "mvme-decode")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input listfile paths
    #[arg(value_name = "LISTFILE", required = true)]
    inputs: Vec<PathBuf>,

    /// Trace every decoded word
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Output directory (defaults to the directory of each listfile)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// mvme analysis file to take the amplitude calibration from.
    ///
    /// Without this option `analysis.analysis` next to each listfile is
    /// used when present.
    #[arg(long, value_name = "FILE")]
    calibration: Option<PathBuf>,

    /// Skip writing the histogram file
    #[arg(long)]
    no_histograms: bool,
}

/// Outcome of one converted listfile.
struct Conversion {
    summary: DecodeSummary,
    events_path: PathBuf,
    histograms_path: Option<PathBuf>,
    elapsed: Duration,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let calibration = args
        .calibration
        .as_deref()
        .map(|path| {
            Calibration::load(path)
                .with_context(|| format!("Failed to load calibration from {}", path.display()))
        })
        .transpose()?;

    // Setup progress bar
    let progress = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
        );
        pb
    };

    let mut converted = 0usize;
    let mut failed = 0usize;

    for input in &args.inputs {
        info!("Processing {}", input.display());
        progress.set_message(format!(
            "Decoding {:?}...",
            input.file_name().unwrap_or_default()
        ));

        match convert(input, &args, calibration.as_ref()) {
            Ok(conversion) => {
                converted += 1;
                if !args.quiet {
                    print_summary(input, &conversion);
                }
            }
            Err(err) => {
                failed += 1;
                error!("{}: {:#}", input.display(), err);
            }
        }
    }

    progress.finish_with_message("Done!");
    eprintln!("{} files converted / {} failed", converted, failed);

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_directives = if verbose {
        "mvme_core=trace,mvme_decode=info"
    } else {
        "mvme_core=info,mvme_decode=info"
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Decodes one listfile and writes its outputs.
fn convert(input: &Path, args: &Args, calibration: Option<&Calibration>) -> Result<Conversion> {
    let is_archive = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if is_archive {
        bail!("zip archives are not supported, extract the listfile first");
    }

    let stem = input
        .file_stem()
        .context("Input path has no file name")?
        .to_string_lossy()
        .into_owned();
    let input_dir = input.parent().unwrap_or_else(|| Path::new("."));
    let output_dir = args.output_dir.as_deref().unwrap_or(input_dir);
    if !output_dir.as_os_str().is_empty() {
        fs::create_dir_all(output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;
    }

    let run_log = load_run_log(input_dir);
    let calibration = match calibration {
        Some(calibration) => Some(calibration.clone()),
        None => load_calibration(input_dir),
    };

    let start_time = Instant::now();

    let events_path = output_dir.join(format!("{}.csv", stem));
    let file = File::create(&events_path)
        .with_context(|| format!("Failed to create {}", events_path.display()))?;
    let mut events = CsvSink::new(file);
    if let Some(calibration) = &calibration {
        events = events.with_calibration(calibration.clone());
    }

    let mut decoder = ListfileDecoder::new();
    let (summary, histograms_path) = if args.no_histograms {
        let summary = decoder
            .decode_file(input, &mut events)
            .context("Failed to decode listfile")?;
        (summary, None)
    } else {
        let mut histograms = HistogramSink::new(calibration.unwrap_or_default());
        let summary = decoder
            .decode_file(input, &mut (&mut events, &mut histograms))
            .context("Failed to decode listfile")?;

        let histograms_path = output_dir.join(format!("{}_histos.csv", stem));
        write_histograms(&histograms_path, &histograms, run_log.as_ref())
            .context("Failed to write histogram output")?;
        (summary, Some(histograms_path))
    };

    Ok(Conversion {
        summary,
        events_path,
        histograms_path,
        elapsed: start_time.elapsed(),
    })
}

/// Reads the run log next to the listfile, if there is one.
fn load_run_log(dir: &Path) -> Option<RunLog> {
    let path = dir.join(RUN_LOG_FILE);
    if !path.is_file() {
        debug!("No run log at {}", path.display());
        return None;
    }

    match RunLog::load(&path) {
        Ok(log) => {
            match log.start {
                Some(start) => info!("Run started {}", start),
                None => warn!("No readout start found in {}", path.display()),
            }
            if let Some(stop) = log.stop {
                info!("Run stopped {}", stop);
            }
            if let Some(duration) = log.duration() {
                info!("Run duration {} s", duration.num_seconds());
            }
            Some(log)
        }
        Err(err) => {
            warn!("Failed to read run log {}: {}", path.display(), err);
            None
        }
    }
}

/// Reads the amplitude calibration next to the listfile, if there is one.
fn load_calibration(dir: &Path) -> Option<Calibration> {
    let path = dir.join(ANALYSIS_FILE);
    if !path.is_file() {
        debug!("No analysis file at {}, energies not calibrated", path.display());
        return None;
    }

    match Calibration::load(&path) {
        Ok(calibration) => {
            info!("Calibration loaded from {}", path.display());
            Some(calibration)
        }
        Err(err) => {
            warn!("Using identity calibration, {}: {}", path.display(), err);
            None
        }
    }
}

fn print_summary(input: &Path, conversion: &Conversion) {
    let summary = &conversion.summary;
    let seconds = conversion.elapsed.as_secs_f64();
    let events_per_sec = if seconds > 0.0 {
        summary.events as f64 / seconds
    } else {
        0.0
    };

    eprintln!();
    eprintln!("Summary:");
    eprintln!("  Input:        {:?}", input);
    eprintln!("  Events CSV:   {:?}", conversion.events_path);
    if let Some(path) = &conversion.histograms_path {
        eprintln!("  Histograms:   {:?}", path);
    }
    eprintln!("  Version:      {}", summary.version);
    eprintln!("  Events:       {}", summary.events);
    eprintln!("  Timeticks:    {}", summary.timeticks);
    eprintln!("  Warnings:     {}", summary.warnings.len());
    eprintln!("  Duration:     {:.3}s", seconds);
    eprintln!("  Throughput:   {:.0} events/s", events_per_sec);
}
