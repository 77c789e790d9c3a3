use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use takeout_restore::config::{self, RestoreConfig};
use takeout_restore::pipeline::{self, UnitOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "takeout-restore",
    version,
    about = "Restore capture metadata from exported JSON sidecars back into JPEG, HEIC, and MP4/MOV files"
)]
struct Cli {
    /// Directory containing media files and their JSON sidecars
    #[arg(value_name = "DIR")]
    root: PathBuf,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Maximum number of sidecars processed at once
    #[arg(long, value_name = "N")]
    concurrency: Option<usize>,

    /// Output the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = RestoreConfig {
        root: cli.root,
        dry_run: cli.dry_run,
        concurrency: cli.concurrency.unwrap_or_else(config::default_concurrency),
    };

    log::info!("processing directory: {}", config.root.display());

    // Ctrl-C stops dispatching new units; in-flight units finish their
    // commit-or-rollback before the run returns.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received — finishing in-flight files");
                cancel.cancel();
            }
        });
    }

    let summary = pipeline::run_batch(&config, cancel).await?;

    if cli.json {
        let reports: Vec<serde_json::Value> = summary
            .reports
            .iter()
            .map(|r| {
                let (status, reason) = match &r.outcome {
                    UnitOutcome::Written => ("written", None),
                    UnitOutcome::WouldWrite => ("would-write", None),
                    UnitOutcome::NothingToWrite => ("nothing-to-write", None),
                    UnitOutcome::Skipped { reason } => ("skipped", Some(reason.clone())),
                    UnitOutcome::Failed { reason } => ("failed", Some(reason.clone())),
                };
                serde_json::json!({
                    "sidecar": r.sidecar.display().to_string(),
                    "media": r.media.as_ref().map(|p| p.display().to_string()),
                    "status": status,
                    "reason": reason,
                })
            })
            .collect();

        let out = serde_json::json!({
            "sidecars_found": summary.sidecars_found,
            "matched": summary.matched,
            "written": summary.written,
            "skipped": summary.skipped,
            "failed": summary.failed,
            "dry_run": config.dry_run,
            "reports": reports,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    }

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
