//! Glory2Wide: convert melody slide decks to wide format.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use wide_cli::{FailurePolicy, OverwritePolicy, PipelineConfig, ScanRules};
use wide_core::CropConfig;

/// Exit status when the input directory had to be created.
const EXIT_NO_INPUT: u8 = 2;

/// Convert 4:3 hymn melody decks into 16:9 presentations.
#[derive(Parser, Debug)]
#[command(name = "glory2wide")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the hymn pack
    #[arg(short, long, default_value = "hymns")]
    input: PathBuf,

    /// Directory receiving the converted presentations
    #[arg(short, long, default_value = "out")]
    output: PathBuf,

    /// Scratch directory, recreated on every run
    #[arg(short, long, default_value = "temp")]
    work_dir: PathBuf,

    /// Text a file name must contain to be converted
    #[arg(long, default_value = "Melody")]
    marker: String,

    /// Rows removed from the top of each image before cropping
    #[arg(long, default_value_t = 40)]
    top_margin: u32,

    /// Rows removed from the bottom of each image before cropping
    #[arg(long, default_value_t = 70)]
    bottom_margin: u32,

    /// Columns kept to the right of the music
    #[arg(long, default_value_t = 100)]
    right_padding: u32,

    /// Gray level below which a pixel counts as ink
    #[arg(long, default_value_t = 128)]
    threshold: u8,

    /// What to do when an output file already exists
    #[arg(long, value_enum, default_value_t = OverwritePolicy::Overwrite)]
    on_existing: OverwritePolicy,

    /// Stop at the first file that fails instead of skipping it
    #[arg(long)]
    fail_fast: bool,

    /// Keep the scratch directory after the run
    #[arg(long)]
    keep_work: bool,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_dir: self.input.clone(),
            output_dir: self.output.clone(),
            work_dir: self.work_dir.clone(),
            scan: ScanRules::new().with_marker(&self.marker),
            crop: CropConfig::new()
                .with_margins(self.top_margin, self.bottom_margin)
                .with_right_padding(self.right_padding)
                .with_threshold(self.threshold),
            overwrite: self.on_existing,
            failure: if self.fail_fast {
                FailurePolicy::Abort
            } else {
                FailurePolicy::Continue
            },
            keep_work: self.keep_work,
            quiet: self.quiet,
            ..PipelineConfig::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    println!("\nGlory2Wide\n");

    match convert(&args) {
        Ok(code) => code,
        Err(e) => {
            if let Some(wide_core::Error::MissingInputDirectory(dir)) = e.downcast_ref::<wide_core::Error>() {
                println!(
                    "Please extract the Glory to God hymn pack into the \"{}\" directory",
                    dir.display()
                );
                return ExitCode::from(EXIT_NO_INPUT);
            }
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Run the batch and print its summary.
fn convert(args: &Args) -> Result<ExitCode> {
    let config = args.to_config();
    let report = wide_cli::run(&config).context("Conversion failed")?;

    for id in &report.skipped {
        println!("Skipped {} (output already exists)", id);
    }

    if !report.is_success() {
        eprintln!("\n{} file(s) could not be converted:", report.failed.len());
        for (id, reason) in &report.failed {
            eprintln!("  {}: {}", id, reason);
        }
        println!(
            "\nConverted {} hymn(s) into the \"{}\" folder.",
            report.converted.len(),
            config.output_dir.display()
        );
        return Ok(ExitCode::FAILURE);
    }

    println!(
        "Successfully converted {} hymn(s) to wide format.\nThe exported hymns are in the \"{}\" folder.\n",
        report.converted.len(),
        config.output_dir.display()
    );
    Ok(ExitCode::SUCCESS)
}
