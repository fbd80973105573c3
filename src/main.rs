//! Audio Optimizer - command line driver

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use clap::Parser;
use audio_optimizer::{init_logging, Args, AudioOptimizerError, Config, Pipeline, ReportGenerator};

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::from_args_and_config(&args)?;
    init_logging(config.verbose());

    if config.verbose() && !args.json {
        println!("{}", audio_optimizer::get_library_info());
        println!();
    }

    let input_path = resolve_input(&args.input)?;

    if !args.json {
        println!("=== Audio Optimizer ===");
        println!("Input: {}", input_path.display());
        println!("Output directory: {}", config.output_dir.display());
        println!("=======================\n");
    }

    let mut pipeline = Pipeline::new(config)?;
    let summary = pipeline.run(&input_path)?;
    let report = ReportGenerator::generate(&summary);

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }

    Ok(())
}

/// A file is used as is; a directory yields its first `.wav` file by name
fn resolve_input(input: &Path) -> anyhow::Result<PathBuf> {
    if !input.exists() {
        return Err(AudioOptimizerError::config(format!(
            "Input path does not exist: {}", input.display()
        )).into());
    }
    if !input.is_dir() {
        return Ok(input.to_path_buf());
    }

    let mut wavs: Vec<PathBuf> = fs::read_dir(input)
        .map_err(|e| AudioOptimizerError::io(format!("Cannot read directory {}: {}", input.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        })
        .collect();
    wavs.sort();

    wavs.into_iter().next().ok_or_else(|| {
        AudioOptimizerError::config(format!("No WAV files found in {}", input.display())).into()
    })
}
