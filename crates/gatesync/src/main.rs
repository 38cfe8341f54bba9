// # gatesync - Gateway list sync
//
// The gatesync binary is a thin integration layer:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the Cloudflare client and the orchestrator
// 4. Running one command and reporting its outcome
//
// All list, rule, and partitioning logic lives in gatesync-core.
//
// ## Configuration
//
// ### Accounts
// - `CLOUDFLARE_ACCOUNT_ID`, `CLOUDFLARE_API_TOKEN`: Single account
// - `CLOUDFLARE_API_KEY`, `CLOUDFLARE_ACCOUNT_EMAIL`: Key-based credentials
// - `CLOUDFLARE_ACCOUNT_ID_<n>`, `CLOUDFLARE_API_TOKEN_<n>`: Multiple accounts (n = 1, 2, ...)
// - `CLOUDFLARE_API_HOST`: API base URL
//
// ### Lists and rules
// - `CLOUDFLARE_LIST_ITEM_SIZE`: Domains per list (default 1000)
// - `CLOUDFLARE_LIST_ITEM_LIMIT`: Domains per account (default 300000)
// - `BLOCK_BASED_ON_SNI`: Also create the SNI rule
// - `BLOCK_PAGE_ENABLED`: Show the block page
// - `GATESYNC_BLOCKLIST`, `GATESYNC_ALLOWLIST`: Domain files
//
// ### Runtime
// - `GATESYNC_MODE=dry-run`: Lookups only, no changes
// - `GATESYNC_MAX_RETRIES`: Retries of transient API failures
// - `GATESYNC_RETRY_DELAY_SECS`: Delay before the first retry
// - `GATESYNC_LOG_LEVEL`, `DEBUG`: Logging
// - `WEBHOOK_URL`: Summary notification target
//
// ## Example
//
// ```bash
// export CLOUDFLARE_ACCOUNT_ID=your_account_id
// export CLOUDFLARE_API_TOKEN=your_token
// export GATESYNC_BLOCKLIST=/etc/gatesync/blocklist.txt
//
// gatesync sync
// ```

mod cli;
mod config;
mod notify;

use clap::Parser;
use gatesync_cloudflare::CloudflareGateway;
use gatesync_core::{DomainSet, Error, Orchestrator, Result, RunReport};
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, Command};
use crate::config::Config;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// - 0: Every account succeeded (or was skipped)
/// - 1: Configuration or pre-flight error; nothing was changed
/// - 2: Runtime error (at least one account failed, or interrupted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatesyncExitCode {
    /// Run completed
    Success = 0,
    /// Configuration error or pre-flight failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<GatesyncExitCode> for ExitCode {
    fn from(code: GatesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                GatesyncExitCode::ConfigError.into()
            } else {
                GatesyncExitCode::Success.into()
            };
        }
    };

    // Load configuration from environment
    let mut config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return GatesyncExitCode::ConfigError.into();
        }
    };
    config.dry_run |= cli.dry_run;

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return GatesyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GatesyncExitCode::ConfigError.into();
    }

    info!(
        "Starting gatesync {:?} ({} account(s){})",
        cli.command,
        config.accounts.len(),
        if config.dry_run { ", dry-run" } else { "" }
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GatesyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        tokio::select! {
            code = run_command(cli.command, &config) => code,
            signal = wait_for_interrupt() => {
                warn!("Received {}, aborting run", signal);
                GatesyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Run one command to completion
async fn run_command(command: Command, config: &Config) -> GatesyncExitCode {
    let gateway =
        match CloudflareGateway::new(config.api_host.as_str(), config.retry_policy(), config.dry_run) {
            Ok(gateway) => gateway,
            Err(e) => {
                error!("Failed to create Cloudflare client: {}", e);
                return GatesyncExitCode::ConfigError;
            }
        };

    let orchestrator = match Orchestrator::new(Box::new(gateway), config.sync_config()) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            error!("{}", e);
            return GatesyncExitCode::ConfigError;
        }
    };

    let domains = if command.reads_domains() {
        match DomainSet::load(&config.blocklist, config.allowlist.as_deref()).await {
            Ok(set) => set,
            Err(e) => {
                error!(
                    "Could not read domains from {}: {}",
                    config.blocklist.display(),
                    e
                );
                return GatesyncExitCode::ConfigError;
            }
        }
    } else {
        DomainSet::default()
    };

    let reports = match execute(command, &orchestrator, &domains).await {
        Ok(reports) => reports,
        Err(e) => {
            error!("{}", e);
            return exit_code_for(&e);
        }
    };

    let message = reports
        .iter()
        .map(RunReport::summary)
        .collect::<Vec<_>>()
        .join("\n");
    notify::notify(config.webhook_url.as_deref(), &message).await;

    if reports.iter().any(RunReport::has_failures) {
        GatesyncExitCode::RuntimeError
    } else {
        GatesyncExitCode::Success
    }
}

/// Exit code for a command that stopped before producing reports
///
/// Pre-flight errors mean nothing was changed remotely.
fn exit_code_for(error: &Error) -> GatesyncExitCode {
    if error.is_preflight() {
        GatesyncExitCode::ConfigError
    } else {
        GatesyncExitCode::RuntimeError
    }
}

/// Dispatch `command` to the orchestrator
///
/// Remote failures are reported per account in the reports.
async fn execute(
    command: Command,
    orchestrator: &Orchestrator,
    domains: &DomainSet,
) -> Result<Vec<RunReport>> {
    if command.reads_domains() && domains.is_empty() {
        warn!("No domains to upload");
    }

    let reports = match command {
        Command::Upload => vec![orchestrator.run_create(&domains.domains).await?],
        Command::CreateRules => vec![orchestrator.run_create_rules().await?],
        Command::Delete => vec![orchestrator.run_delete().await?],
        Command::Sync => {
            // Nothing is deleted when the new set would not fit
            orchestrator.preflight(&domains.domains)?;

            let deleted = orchestrator.run_delete().await?;
            if deleted.has_failures() {
                warn!(
                    "Delete failed for account(s) {:?}, skipping upload",
                    deleted.failed()
                );
                vec![deleted]
            } else {
                let created = orchestrator.run_create(&domains.domains).await?;
                vec![deleted, created]
            }
        }
    };

    Ok(reports)
}

/// Wait for an interrupt (SIGTERM, SIGINT)
///
/// Returns the name of the signal received. If the handlers cannot be
/// installed the run continues without them.
#[cfg(unix)]
async fn wait_for_interrupt() -> &'static str {
    let handlers = signal(SignalKind::terminate())
        .and_then(|sigterm| Ok((sigterm, signal(SignalKind::interrupt())?)));

    match handlers {
        Ok((mut sigterm, mut sigint)) => tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        },
        Err(e) => {
            warn!("Failed to setup signal handlers: {}", e);
            std::future::pending().await
        }
    }
}

/// Wait for an interrupt (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_interrupt() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to wait for CTRL-C: {}", e);
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
