use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tlc_harvest::batch::Orchestrator;
use tlc_harvest::config::{ConfigLoader, LinkManifest, ResolvedConfig};
use tlc_harvest::domain::LinkBatch;
use tlc_harvest::error::HarvestError;
use tlc_harvest::fetcher::Fetcher;
use tlc_harvest::output::{ConsoleProgress, JsonOutput, OutputMode, format_megabytes};
use tlc_harvest::progress::ProgressSink;
use tlc_harvest::remote::HttpRemote;
use tlc_harvest::store::Store;

#[derive(Parser)]
#[command(name = "tlc-harvest")]
#[command(about = "Resumable downloader for NYC TLC trip-record datasets")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    root: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download every link of a manifest, resuming partial files")]
    Download(DownloadArgs),
    #[command(about = "Show the format ledger of every group")]
    Status,
    #[command(about = "List csv files waiting for conversion")]
    Pending,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(long, required_unless_present = "bypass")]
    manifest: Option<PathBuf>,

    #[arg(long)]
    bypass: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(error) = report.downcast_ref::<HarvestError>() {
                return ExitCode::from(map_exit_code(error));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::ManifestRead(_)
        | HarvestError::ManifestParse(_)
        | HarvestError::InvalidUrl(_) => 2,
        HarvestError::UnreachableResource { .. } | HarvestError::TransferError { .. } => 3,
        HarvestError::Filesystem(_) => 4,
        HarvestError::LedgerCorruption { .. } | HarvestError::InvalidFormat(_) => 5,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.download_root = root.into();
    }
    let store = Store::new(config.download_root.clone());

    match cli.command {
        Commands::Download(args) => run_download(args, config, store, output_mode),
        Commands::Status => run_status(store, output_mode),
        Commands::Pending => run_pending(store, output_mode),
    }
}

fn run_download(
    args: DownloadArgs,
    config: ResolvedConfig,
    store: Store,
    output_mode: OutputMode,
) -> miette::Result<ExitCode> {
    let links = match &args.manifest {
        Some(path) if !args.bypass => LinkManifest::load(path)?,
        _ => LinkBatch::new(),
    };

    let remote = HttpRemote::new(&config.http)?;
    let orchestrator = Orchestrator::new(store, Fetcher::new(remote));
    let console = ConsoleProgress::new();

    let report = match output_mode {
        OutputMode::Interactive => {
            println!("Downloading files into {}", orchestrator.store().root());
            let sink: &dyn ProgressSink = &console;
            orchestrator.download_all(&links, args.bypass, sink, &mut |position, item| {
                console.print_position(position, item)
            })?
        }
        OutputMode::NonInteractive => {
            orchestrator.download_all(&links, args.bypass, &JsonOutput, &mut |_, _| {})?
        }
    };

    match output_mode {
        OutputMode::Interactive => print_download_summary(&report),
        OutputMode::NonInteractive => JsonOutput::print_report(&report).into_diagnostic()?,
    }

    Ok(match report.first_failure() {
        Some(error) => ExitCode::from(map_exit_code(error)),
        None => ExitCode::SUCCESS,
    })
}

fn run_status(store: Store, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let status = store.status()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_status(&status).into_diagnostic()?,
        OutputMode::Interactive => {
            if status.is_empty() {
                println!("No ledgers under {}", store.root());
            }
            for group in &status {
                println!("{} ({})", group.group, group.ledger_path);
                for entry in &group.entries {
                    println!("  {}: {}", entry.canonical_name, entry.format);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_pending(store: Store, output_mode: OutputMode) -> miette::Result<ExitCode> {
    let pending = store.pending()?;
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_pending(&pending).into_diagnostic()?,
        OutputMode::Interactive => {
            if pending.is_empty() {
                println!("No files to convert");
            }
            for group in &pending {
                for name in &group.names {
                    println!("{}\t{}", group.group, name);
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_download_summary(report: &tlc_harvest::batch::BatchReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    let elapsed = report.finished_at - report.started_at;
    let bytes: u64 = report
        .items
        .iter()
        .filter_map(|item| match item.outcome {
            Some(tlc_harvest::fetcher::FetchOutcome::Downloaded { bytes_written, .. }) => {
                Some(bytes_written)
            }
            _ => None,
        })
        .sum();

    println!(
        "{green}Transferred: {} file(s), {} in {}s{reset}",
        report.transferred_count(),
        format_megabytes(bytes),
        elapsed.num_seconds()
    );
    println!(
        "{yellow}Already present: {}{reset}",
        report.items.len() - report.transferred_count() - report.failed_count()
    );
    if report.failed_count() > 0 {
        println!("{red}Failed: {}{reset}", report.failed_count());
    }
}
