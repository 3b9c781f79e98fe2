//! DBC Compare CLI Application
//!
//! This is the command-line interface for comparing two releases of DBC files.
//! It uses the dbc-compare library and adds:
//! - TOML configuration
//! - Report generation (TXT/HTML/JSON)
//! - Run summary table

use anyhow::{Context, Result};
use clap::Parser;
use dbc_compare::{Comparator, RunReport};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

mod config;
mod report;

use config::{AppConfig, OutputFormat};
use report::ReportContext;

/// DBC Compare - Compare the DBC files of two release folders bus by bus
#[derive(Parser, Debug)]
#[command(name = "dbc-compare")]
#[command(about = "Compare the DBC files of two release folders", long_about = None)]
#[command(version)]
struct Args {
    /// Folder with the old version of the DBC files
    #[arg(value_name = "OLD_FOLDER")]
    old_folder: PathBuf,

    /// Folder with the new version of the DBC files
    #[arg(value_name = "NEW_FOLDER")]
    new_folder: PathBuf,

    /// Output folder (default: <parent of OLD>/DBC_Compare_<old>_vs_<new>)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format (can be repeated; default: txt and html)
    #[arg(short, long, value_enum, value_name = "FORMAT")]
    format: Vec<OutputFormat>,

    /// Compare buses one after another instead of in parallel
    #[arg(long)]
    sequential: bool,

    /// Fail on DBC files that are not valid UTF-8
    #[arg(long)]
    strict_encoding: bool,

    /// Number of bus name segments in file names (e.g. 2 for 01_CAN_CH1_...)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    bus_segments: Option<u16>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("DBC Compare CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using dbc-compare library v{}", dbc_compare::VERSION);

    let config = resolve_config(&args)?;
    let old_label = folder_label(&args.old_folder);
    let new_label = folder_label(&args.new_folder);
    let output_dir = config
        .output
        .output_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(&args.old_folder, &old_label, &new_label));

    let comparator = Comparator::new(config.compare.clone());
    let report = comparator
        .compare_folders(&args.old_folder, &args.new_folder)
        .with_context(|| {
            format!(
                "Failed to compare {:?} with {:?}",
                args.old_folder, args.new_folder
            )
        })?;

    print_inputs(&report, &old_label, &new_label);

    if report.nothing_to_compare() {
        println!("\nNothing to compare: no bus exists in both folders.");
        print_skipped(&report);
        return Ok(());
    }

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;
    println!("\nOutput directory: {}", output_dir.display());

    for bus in &report.comparisons {
        let summary = bus.result.summary();
        println!("\n[{}] Comparing...", bus.pair.bus_name);
        println!("  Old: {}", report::file_name(&bus.pair.old));
        println!("  New: {}", report::file_name(&bus.pair.new));
        println!("  Total signal rows: {}", summary.total_rows);
        println!("  Rows with differences: {}", summary.differing_rows);

        let ctx = ReportContext {
            old_label: &old_label,
            new_label: &new_label,
            bus,
        };
        for &format in &config.output.formats {
            let path = report::write_report(format, &ctx, &output_dir)?;
            println!("  Saved {}: {}", format.extension().to_uppercase(), path.display());
        }
    }

    print_skipped(&report);

    println!("\n{}", "=".repeat(60));
    println!("SUMMARY");
    println!("{}", "=".repeat(60));
    print!("{}", report::summary_table(&report.summary()));

    if !report.failed.is_empty() {
        for failed in &report.failed {
            eprintln!("[{}] {}", failed.pair.bus_name, failed.error);
        }
        anyhow::bail!("{} bus comparison(s) failed", report.failed.len());
    }

    println!("\nOutput saved to: {}", output_dir.display());
    Ok(())
}

/// Load the config file (if any) and apply command line overrides
fn resolve_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };

    if args.sequential {
        config.compare.parallel = false;
    }
    if args.strict_encoding {
        config.compare.strict_encoding = true;
    }
    if let Some(segments) = args.bus_segments {
        config.compare.bus_segments = Some(usize::from(segments));
    }
    if !args.format.is_empty() {
        config.output.formats = args.format.clone();
    }
    if args.output.is_some() {
        config.output.output_dir = args.output.clone();
    }
    // keep the first occurrence of each format
    let mut seen = BTreeSet::new();
    config.output.formats.retain(|format| seen.insert(*format));

    log::debug!("Effective configuration: {:?}", config.compare);
    Ok(config)
}

/// Folder name used in report titles and file names
fn folder_label(folder: &Path) -> String {
    folder
        .components()
        .next_back()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

fn default_output_dir(old_folder: &Path, old_label: &str, new_label: &str) -> PathBuf {
    let parent = old_folder.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("DBC_Compare_{}_vs_{}", old_label, new_label))
}

fn print_inputs(report: &RunReport, old_label: &str, new_label: &str) {
    for (label, files) in [(old_label, &report.old_files), (new_label, &report.new_files)] {
        println!("\nFolder {}: {} DBC files", label, files.len());
        for (prefix, path) in files {
            println!("  {}: {}", prefix, report::file_name(path));
        }
    }
}

fn print_skipped(report: &RunReport) {
    if report.skipped.is_empty() {
        return;
    }
    println!("\nSkipped:");
    for skipped in &report.skipped {
        println!(
            "  [{}] {} ({})",
            skipped.label(),
            report::file_name(&skipped.path),
            skipped.reason
        );
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
