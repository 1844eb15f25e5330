use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use pdfscrub::{load_config, redact_file, summarize, verify_file, AppConfig};

/// Detect and permanently remove emails, phone numbers and names from a PDF.
#[derive(Debug, Parser)]
#[command(name = "pdfscrub", version, about)]
struct Cli {
    /// PDF to redact
    input_pdf: PathBuf,
    /// Where to write the redacted PDF
    output_pdf: PathBuf,
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Re-open the output and check that no detected text remains
    #[arg(long)]
    verify: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if !cli.input_pdf.exists() {
        eprintln!("Error: Input file '{}' does not exist.", cli.input_pdf.display());
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("An error occurred: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` when verification found leftovers.
fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => AppConfig::default(),
    };

    let report = redact_file(&cli.input_pdf, &cli.output_pdf, &config)?;
    for line in summarize(&report) {
        log::info!("[Summary] {}", line);
    }
    println!("Redacted PDF saved as {}", cli.output_pdf.display());

    if cli.verify || config.verify {
        let result = verify_file(&cli.output_pdf, &report);
        for warning in &result.warnings {
            log::warn!("[Verify] {}", warning);
        }
        for leak in &result.leaks {
            log::warn!(
                "[Verify] page {}: {} occurrence(s) of a detected term remain",
                leak.page + 1,
                leak.occurrences
            );
        }
        if !result.ok {
            eprintln!("Verification failed: {} leak(s)", result.leaks.len());
            return Ok(false);
        }
        log::info!("[Verify] output is clean");
    }

    Ok(true)
}
