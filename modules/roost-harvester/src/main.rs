use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use apify_client::ApifyClient;
use roost_common::Config;
use roost_harvester::{ApifyCollector, CycleOutcome, Orchestrator, Scheduler};
use roost_store::PostStore;

#[derive(Parser)]
#[command(name = "roost", about = "Periodic X/Twitter post harvester")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run harvest cycles on the configured cron schedule until terminated
    Run,
    /// Run a single harvest cycle now and exit
    Once,
    /// Create or update the database schema
    Migrate,
    /// Manage the accounts table
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    /// List active accounts in harvest order
    List,
    /// Add an account, or reactivate it if it exists
    Add { handle: String },
    /// Stop harvesting an account
    Deactivate { handle: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    let store = Arc::new(PostStore::from_config(&config));
    let result = dispatch(cli.command, &config, store.clone()).await;
    store.close().await;

    if let Err(e) = &result {
        error!(error = %e, "roost exited with an error");
    }
    result
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("roost=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn dispatch(command: Command, config: &Config, store: Arc<PostStore>) -> Result<()> {
    match command {
        Command::Run => {
            let cancel = shutdown_token();
            let orchestrator = build_orchestrator(config, store, cancel.clone())?;
            let scheduler = Scheduler::new(&config.schedule, cancel)?;
            info!(schedule = config.schedule.as_str(), "Roost scheduler starting");
            scheduler.run(&orchestrator).await?;
        }
        Command::Once => {
            let cancel = shutdown_token();
            let orchestrator = build_orchestrator(config, store, cancel)?;
            match orchestrator.run_cycle().await? {
                CycleOutcome::Completed(stats) => info!(%stats, "Harvest finished"),
                CycleOutcome::Cancelled => info!("Harvest cancelled, exiting"),
                CycleOutcome::Skipped => warn!("Harvest skipped"),
            }
        }
        Command::Migrate => {
            store.initialize().await?;
        }
        Command::Accounts { action } => {
            store.initialize().await?;
            match action {
                AccountsAction::List => {
                    for account in store.list_accounts().await? {
                        println!(
                            "{:>6}  @{:<24} since {}",
                            account.id,
                            account.handle,
                            account.created_at.format("%Y-%m-%d")
                        );
                    }
                }
                AccountsAction::Add { handle } => {
                    let account = store.add_account(&handle).await?;
                    println!("Active: @{} (id {})", account.handle, account.id);
                }
                AccountsAction::Deactivate { handle } => {
                    if !store.deactivate_account(&handle).await? {
                        bail!("No account named @{}", handle.trim_start_matches('@'));
                    }
                    println!("Deactivated @{}", handle.trim_start_matches('@'));
                }
            }
        }
    }
    Ok(())
}

fn build_orchestrator(
    config: &Config,
    store: Arc<PostStore>,
    cancel: CancellationToken,
) -> Result<Orchestrator> {
    let Some(key) = config.apify_api_key.as_deref() else {
        bail!("APIFY_API_KEY is required to harvest");
    };
    let collector = ApifyCollector::new(ApifyClient::new(key.to_string()), config.collect_limit);
    Ok(Orchestrator::new(
        store,
        Arc::new(collector),
        config.pacing,
        cancel,
    ))
}

/// Token cancelled on SIGINT or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Termination requested");
        trigger.cancel();
    });
    cancel
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
