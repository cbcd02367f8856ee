//! Chamberlab: a client for remote causal chamber experiments.
//!
//! The remote lab runs experiment protocols on physical chambers (fans,
//! lights, sensors) and publishes the results as zip archives. This crate
//! submits protocols, tracks their status and turns finished experiments
//! into local datasets.
//!
//! # Modules
//!
//! - [`retrieval`]: download, checksum verification and extraction of result archives
//! - [`dataset`]: manifest loading and lazy access to observations and images
//! - [`api`]: HTTP transport, credentials, records and status values
//! - [`protocol`]: experiment protocols as instruction lists
//! - [`lab`]: orchestration over the API (submit, poll, download)
//! - [`error`]: error types for chamberlab operations

pub mod api;
pub mod dataset;
pub mod error;
pub mod lab;
pub mod protocol;
pub mod retrieval;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

pub use dataset::Dataset;
pub use error::LabError;
pub use lab::{Lab, PollOptions};
pub use retrieval::{CachePolicy, RemoteArchiveDescriptor, RetrievalOptions};

use api::{status_display, Credentials, ExperimentRecord};
use retrieval::{CancelToken, ChecksumAlgorithm, LogProgress};

/// The chamberlab CLI application.
#[derive(Parser)]
#[command(name = "chamberlab")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compute the checksum of a file and optionally check it.
    Verify(VerifyArgs),
    /// Download, verify and extract a dataset archive from a URL.
    Fetch(FetchArgs),
    /// Summarize an extracted dataset directory.
    Inspect(InspectArgs),
    /// Show the status of the chambers.
    Status(RemoteArgs),
    /// List submitted experiments.
    Experiments(ExperimentsArgs),
    /// Show a single experiment.
    Experiment(ExperimentArgs),
    /// Download the data of a finished experiment.
    Download(DownloadArgs),
}

/// Arguments for the verify subcommand.
#[derive(clap::Args)]
struct VerifyArgs {
    /// File to hash.
    input: PathBuf,

    /// Checksum algorithm ('md5' or 'sha256').
    #[arg(long, default_value = "md5")]
    algorithm: String,

    /// Expected digest (hex). Exits non-zero on mismatch.
    #[arg(long)]
    expected: Option<String>,
}

/// Arguments for the fetch subcommand.
#[derive(clap::Args)]
struct FetchArgs {
    /// Archive URL (http, https or file).
    #[arg(long)]
    url: String,

    /// Name of the dataset directory created under the root.
    #[arg(long)]
    id: String,

    /// Expected archive checksum. Without it, verification is skipped.
    #[arg(long)]
    checksum: Option<String>,

    /// Checksum algorithm ('md5' or 'sha256').
    #[arg(long, default_value = "md5")]
    algorithm: String,

    #[command(flatten)]
    storage: StorageArgs,

    /// Abort the download after this many seconds.
    #[arg(long)]
    timeout: Option<u64>,
}

/// Where and how retrieved datasets are stored.
#[derive(clap::Args)]
struct StorageArgs {
    /// Directory the dataset is extracted under.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Download again even if the dataset is already present.
    #[arg(long)]
    force: bool,

    /// Keep the downloaded zip file.
    #[arg(long)]
    keep_archive: bool,

    /// Do not log download progress.
    #[arg(long)]
    quiet: bool,
}

/// Arguments for the inspect subcommand.
#[derive(clap::Args)]
struct InspectArgs {
    /// Extracted dataset directory (containing manifest.yaml).
    input: PathBuf,
}

/// Connection settings for commands that talk to the lab.
#[derive(clap::Args)]
struct RemoteArgs {
    /// API endpoint.
    #[arg(long, env = "CHAMBERLAB_ENDPOINT", default_value = api::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Credentials file with an [api_keys] section.
    #[arg(long, env = "CHAMBERLAB_CREDENTIALS", default_value = ".credentials")]
    credentials: PathBuf,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

/// Arguments for the experiments subcommand.
#[derive(clap::Args)]
struct ExperimentsArgs {
    /// Show at most this many experiments.
    #[arg(long)]
    max: Option<usize>,

    #[command(flatten)]
    remote: RemoteArgs,
}

/// Arguments for the experiment subcommand.
#[derive(clap::Args)]
struct ExperimentArgs {
    /// Experiment ID.
    experiment_id: String,

    #[command(flatten)]
    remote: RemoteArgs,
}

/// Arguments for the download subcommand.
#[derive(clap::Args)]
struct DownloadArgs {
    /// Experiment ID.
    experiment_id: String,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(flatten)]
    storage: StorageArgs,
}

/// Run the chamberlab CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), LabError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Verify(args)) => run_verify(args),
        Some(Commands::Fetch(args)) => run_fetch(args),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Status(args)) => run_status(args),
        Some(Commands::Experiments(args)) => run_experiments(args),
        Some(Commands::Experiment(args)) => run_experiment(args),
        Some(Commands::Download(args)) => run_download(args),
        None => {
            println!("chamberlab {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Client for remote causal chamber experiments.");
            println!();
            println!("Run 'chamberlab --help' for usage information.");
            Ok(())
        }
    }
}

fn run_verify(args: VerifyArgs) -> Result<(), LabError> {
    let algorithm: ChecksumAlgorithm = args.algorithm.parse()?;
    let digest = retrieval::compute_digest(&args.input, algorithm)?;
    println!("{}  {}", digest, args.input.display());

    if let Some(expected) = args.expected.as_deref() {
        retrieval::verify_file(&args.input, algorithm, Some(expected))?;
        println!("Checksum OK ({algorithm})");
    }
    Ok(())
}

fn run_fetch(args: FetchArgs) -> Result<(), LabError> {
    let algorithm: ChecksumAlgorithm = args.algorithm.parse()?;
    let mut descriptor = RemoteArchiveDescriptor::new(args.url);
    if let Some(checksum) = args.checksum {
        descriptor = descriptor.with_checksum(checksum, algorithm);
    }

    let mut options = retrieval_options(&args.storage);
    if let Some(seconds) = args.timeout {
        options = options.with_cancel(CancelToken::with_timeout(Duration::from_secs(seconds)));
    }

    let dataset = retrieval::retrieve(&descriptor, &args.storage.root, &args.id, options)?;
    print_dataset_summary(&dataset)
}

fn run_inspect(args: InspectArgs) -> Result<(), LabError> {
    let dataset = Dataset::open(&args.input)?;
    print_dataset_summary(&dataset)
}

fn run_status(args: RemoteArgs) -> Result<(), LabError> {
    let lab = connect(&args)?;
    for chamber in lab.get_status()? {
        let (text, _) = status_display(chamber.status);
        println!(
            "  {:<10} {:<20} {}",
            text,
            chamber.chamber_id,
            chamber.config.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn run_experiments(args: ExperimentsArgs) -> Result<(), LabError> {
    let lab = connect(&args.remote)?;
    let experiments = lab.get_experiments()?;
    for line in experiment_listing(&experiments, args.max) {
        println!("{line}");
    }
    Ok(())
}

/// Table rows for the first `max` experiments plus a footer with the total.
fn experiment_listing(experiments: &[ExperimentRecord], max: Option<usize>) -> Vec<String> {
    let shown = max.unwrap_or(experiments.len()).min(experiments.len());
    let mut lines: Vec<String> = experiments[..shown]
        .iter()
        .map(|experiment| {
            let (text, _) = status_display(experiment.status);
            format!(
                "  {:<10} {:<12} {:<38} {:<16} {:<10} {}",
                text,
                experiment.tag.as_deref().unwrap_or(""),
                experiment.experiment_id,
                experiment.chamber_id.as_deref().unwrap_or("-"),
                experiment.config.as_deref().unwrap_or("-"),
                experiment.submitted_on.as_deref().unwrap_or("-")
            )
        })
        .collect();
    lines.push(format!(
        "  --- showing {shown} / {} experiments ---",
        experiments.len()
    ));
    lines
}

fn run_experiment(args: ExperimentArgs) -> Result<(), LabError> {
    let lab = connect(&args.remote)?;
    let record = lab.get_experiment(&args.experiment_id)?;
    let (text, _) = status_display(record.status);

    println!("Experiment:   {}", record.experiment_id);
    println!("Status:       {text}");
    println!("Chamber:      {}", record.chamber_id.as_deref().unwrap_or("-"));
    println!("Config:       {}", record.config.as_deref().unwrap_or("-"));
    println!("Tag:          {}", record.tag.as_deref().unwrap_or("-"));
    println!("Submitted on: {}", record.submitted_on.as_deref().unwrap_or("-"));
    if let Some(url) = record.download_url.as_deref() {
        println!("Download URL: {url}");
    }
    Ok(())
}

fn run_download(args: DownloadArgs) -> Result<(), LabError> {
    let lab = connect(&args.remote)?;
    let options = retrieval_options(&args.storage);
    let dataset = lab.download_data(&args.experiment_id, &args.storage.root, options)?;
    print_dataset_summary(&dataset)
}

fn connect(args: &RemoteArgs) -> Result<Lab, LabError> {
    let credentials = Credentials::from_file(&args.credentials)?;
    Lab::connect_with_timeout(
        credentials,
        Some(&args.endpoint),
        Duration::from_secs(args.timeout),
    )
}

fn retrieval_options(storage: &StorageArgs) -> RetrievalOptions {
    let mut options = RetrievalOptions::default().keep_archive(storage.keep_archive);
    if storage.force {
        options = options.force_refresh();
    }
    if !storage.quiet {
        options = options.with_progress(LogProgress::default());
    }
    options
}

fn print_dataset_summary(dataset: &Dataset) -> Result<(), LabError> {
    let observations = dataset.observations()?;

    println!("Dataset:      {}", dataset.root().display());
    println!(
        "Observations: {} ({} rows, {} columns)",
        relative_display(dataset.root(), dataset.observations_path()),
        observations.len(),
        observations.columns().len()
    );
    for column in observations.columns() {
        println!("  {:<28} {}", column.name, column.kind);
    }

    match dataset.image_count() {
        Ok(count) => {
            let dir = dataset.image_directory()?;
            println!(
                "Images:       {} ({} files)",
                relative_display(dataset.root(), dir),
                count
            );
        }
        Err(LabError::NotSupported { .. }) => println!("Images:       none"),
        Err(err) => return Err(err),
    }
    Ok(())
}

fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExperimentStatus;

    fn record(id: &str, status: ExperimentStatus) -> ExperimentRecord {
        ExperimentRecord {
            experiment_id: id.to_string(),
            status,
            chamber_id: Some("wt-demo-ch4lu".to_string()),
            config: Some("full".to_string()),
            tag: None,
            submitted_on: None,
            download_url: None,
            checksum: None,
            checksum_algorithm: None,
        }
    }

    #[test]
    fn experiment_listing_truncates_to_max() {
        let experiments = vec![
            record("exp-1", ExperimentStatus::Running),
            record("exp-2", ExperimentStatus::Done),
            record("exp-3", ExperimentStatus::Done),
        ];

        let lines = experiment_listing(&experiments, Some(1));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("exp-1"));
        assert_eq!(lines[1], "  --- showing 1 / 3 experiments ---");
    }

    #[test]
    fn experiment_listing_without_max_shows_everything() {
        let experiments = vec![record("exp-1", ExperimentStatus::Queued)];

        let lines = experiment_listing(&experiments, None);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "  --- showing 1 / 1 experiments ---");

        let oversized = experiment_listing(&experiments, Some(50));
        assert_eq!(
            oversized.last().map(String::as_str),
            Some("  --- showing 1 / 1 experiments ---")
        );
    }
}
