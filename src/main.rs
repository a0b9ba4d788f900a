use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use netassert_rs::assertion::AssertionEngine;
use netassert_rs::config::{self, Settings, TracingDiagnostics};
use netassert_rs::manifest;
use netassert_rs::report;
use netassert_rs::runner;
use netassert_rs::scanner::NmapScanner;
use netassert_rs::types::{HostCheck, RunSummary};

/// netassert-rs — check that hosts expose (or block) the ports declared in a manifest.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netassert-rs",
    version,
    about = "Check that hosts expose (or block) the TCP/UDP/HTTP ports declared in a manifest.",
    long_about = None
)]
struct Cli {
    /// Enable debug diagnostics (also enabled by DEBUG / REMOTE_DEBUG).
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Scan every host in the manifest and assert its port states.
    Run {
        /// Path to the manifest (`.yaml`/`.yml` as YAML, otherwise JSON).
        #[arg(short = 'f', long = "input-file")]
        input_file: PathBuf,

        /// TAP output file.
        #[arg(short = 't', long, default_value = "results.tap")]
        tap: PathBuf,

        /// Write results as pretty JSON to this path (optional).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Max scans running at once (unbounded if omitted).
        #[arg(long)]
        concurrency: Option<usize>,

        /// nmap binary to invoke.
        #[arg(long, default_value = "nmap")]
        nmap: PathBuf,
    },
    /// Check that a manifest is well formed without scanning anything.
    Validate {
        /// Path to the manifest (`.yaml`/`.yml` as YAML, otherwise JSON).
        #[arg(short = 'f', long = "input-file")]
        input_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::from_env().with_debug(cli.debug);
    config::init_tracing(&settings);

    match cli.command {
        Command::Validate { input_file } => {
            let checks = load_checks(&input_file)?;
            println!(
                "All test cases are valid: {} scan(s) planned from {}",
                checks.len(),
                input_file.display()
            );
            Ok(())
        }
        Command::Run {
            input_file,
            tap,
            output,
            concurrency,
            nmap,
        } => {
            let checks = load_checks(&input_file)?;
            tracing::info!(scans = checks.len(), manifest = %input_file.display(), "starting run");

            let engine = AssertionEngine::new(
                Arc::new(NmapScanner::new(nmap)),
                Arc::new(TracingDiagnostics::new(&settings)),
            );
            let cancel = CancellationToken::new();
            runner::cancel_on_ctrl_c(cancel.clone());

            let outcomes = runner::run_checks(&engine, checks, concurrency, cancel)
                .await
                .context("run aborted")?;
            let summary = RunSummary::new(report::now_rfc3339(), outcomes);

            report::write_table(&mut std::io::stdout().lock(), &summary)?;
            report::write_tap_file(&tap, &summary.outcomes)?;
            println!("Wrote TAP results to {}", tap.display());
            if let Some(path) = output.as_deref() {
                if let Err(e) = report::write_summary_json(path, &summary) {
                    eprintln!("Failed to write JSON to {}: {}", path.display(), e);
                } else {
                    println!("Wrote JSON results to {}", path.display());
                }
            }

            if !summary.all_passed() {
                bail!("{} of {} assertion(s) failed", summary.failed, summary.total);
            }
            Ok(())
        }
    }
}

fn load_checks(path: &Path) -> Result<Vec<HostCheck>> {
    let doc = manifest::load_manifest_from_path(path)?;
    let checks = manifest::plan(&doc)
        .with_context(|| format!("invalid manifest: {}", path.display()))?;
    Ok(checks)
}
