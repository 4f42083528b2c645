//! zitadel-reconcile CLI entrypoint.
//!
//! Command results go to stdout; progress, prompts and logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use zitadel_reconcile::cli::{Cli, Commands, MessageLevel, OutputFormatter, StateCommands};
use zitadel_reconcile::config::{find_config_file, ConfigParser, ConfigValidator, DeployConfig};
use zitadel_reconcile::error::Result;
use zitadel_reconcile::reconciler::Reconciler;
use zitadel_reconcile::resource::ResourceKind;
use zitadel_reconcile::state::{generate_holder_id, LocalStateStore, StateStore};
use zitadel_reconcile::zitadel::{ProviderContext, ZitadelClient};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over the verbosity flag.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point. Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Kinds { kind } => cmd_kinds(kind, &formatter),
        Commands::Plan { detailed, no_refresh } => cmd_plan(config_path, detailed, no_refresh, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
            no_refresh,
        } => cmd_apply(config_path, yes, continue_on_error, no_refresh, &formatter).await,
        Commands::Refresh => cmd_refresh(config_path, &formatter).await,
        Commands::Import { name, kind, key } => cmd_import(config_path, &name, kind, &key, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config_path, yes, &formatter).await,
        Commands::Drift => cmd_drift(config_path, &formatter).await,
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Validate the declaration file.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool, formatter: &OutputFormatter) -> Result<bool> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating declarations: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().check(&config);
    emit(&formatter.format_validation(&result, &config, show_warnings))?;
    Ok(result.is_valid())
}

/// List supported kinds.
fn cmd_kinds(kind: Option<ResourceKind>, formatter: &OutputFormatter) -> Result<bool> {
    let kinds = kind.map_or_else(|| ResourceKind::ALL.to_vec(), |k| vec![k]);
    emit(&formatter.format_kinds(&kinds))?;
    Ok(true)
}

/// Show the plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    no_refresh: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = Session::open(config_path)?;
    let reconciler = session.reconciler().with_refresh(!no_refresh);

    let (diff, plan) = reconciler.plan().await?;
    emit(&formatter.format_plan(&plan, &diff, detailed))?;
    Ok(true)
}

/// Apply the declarations.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    no_refresh: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = Session::open(config_path)?;
    let reconciler = session
        .reconciler()
        .with_refresh(!no_refresh)
        .with_continue_on_error(continue_on_error);

    if !auto_approve {
        let (diff, plan) = reconciler.plan().await?;
        if plan.is_empty() {
            emit(&formatter.format_plan(&plan, &diff, false))?;
            return Ok(true);
        }

        eprintln!("{}", formatter.format_plan(&plan, &diff, true));
        if !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            eprintln!("Apply cancelled.");
            return Ok(true);
        }
    }

    let result = reconciler.reconcile().await?;
    emit(&formatter.format_reconciliation(&result))?;
    Ok(result.success)
}

/// Read recorded entities back.
async fn cmd_refresh(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let session = Session::open(config_path)?;
    let report = session.reconciler().refresh().await?;
    emit(&formatter.format_refresh(&report))?;
    Ok(true)
}

/// Adopt an existing entity.
async fn cmd_import(
    config_path: Option<&PathBuf>,
    name: &str,
    kind: ResourceKind,
    key: &str,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let session = Session::open(config_path)?;
    if session.config.resource(name).is_none() {
        warn!("'{name}' is not declared; the next apply will delete it");
    }

    let imported = session.reconciler().import(name, kind, key).await?;
    emit(&formatter.format_import(name, kind, &imported))?;
    Ok(true)
}

/// Delete every recorded entity.
async fn cmd_destroy(config_path: Option<&PathBuf>, auto_approve: bool, formatter: &OutputFormatter) -> Result<bool> {
    let session = Session::open(config_path)?;
    let state = session.store.load_or_default().await?;

    if state.present().is_empty() {
        emit(&formatter.message(MessageLevel::Success, "Nothing to destroy."))?;
        return Ok(true);
    }

    if !auto_approve {
        eprintln!("The following entities will be deleted:");
        for record in state.present() {
            eprintln!("  - {} ({}, {})", record.name, record.kind, record.id());
        }
        if !confirm("\nThis cannot be undone. Type 'destroy' to confirm: ", "destroy")? {
            eprintln!("Destroy cancelled.");
            return Ok(true);
        }
    }

    let result = session.reconciler().destroy_all().await?;
    emit(&formatter.format_destroy(&result))?;
    Ok(result.success)
}

/// Check for drift.
async fn cmd_drift(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<bool> {
    let session = Session::open(config_path)?;
    let report = session.reconciler().check_drift().await?;
    emit(&formatter.format_drift(&report))?;
    Ok(true)
}

/// State management commands.
async fn cmd_state(config_path: Option<&PathBuf>, command: StateCommands, formatter: &OutputFormatter) -> Result<bool> {
    let (_, store) = load_config_and_state(config_path)?;

    match command {
        StateCommands::Show => match store.load().await? {
            Some(state) => emit(&formatter.format_state(&state))?,
            None => emit(&formatter.message(MessageLevel::Warning, "No state recorded yet."))?,
        },
        StateCommands::Lock { operation } => {
            let lock = store.acquire_lock(&generate_holder_id(), &operation).await?;
            emit(&formatter.format_lock(&lock))?;
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                match store.force_unlock().await? {
                    Some(lock) => {
                        warn!("Removed lock held by {}", lock.holder);
                        emit(&formatter.message(MessageLevel::Success, "State forcefully unlocked."))?;
                    }
                    None => emit(&formatter.message(MessageLevel::Success, "State was not locked."))?,
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                emit(&formatter.message(MessageLevel::Success, "State unlocked."))?;
            } else {
                emit(&formatter.message(MessageLevel::Error, "Provide --lock-id or use --force"))?;
                return Ok(false);
            }
        }
    }

    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Declarations, state store and provider context for one command.
struct Session {
    config: DeployConfig,
    store: LocalStateStore,
    ctx: ProviderContext,
}

impl Session {
    /// Loads everything a command talking to the service needs.
    fn open(config_path: Option<&PathBuf>) -> Result<Self> {
        let (config, store) = load_config_and_state(config_path)?;

        let token = ConfigParser::access_token()?;
        let client = ZitadelClient::from_settings(&config.provider, &token)?;
        debug!("Talking to {}", client.base_url());

        let ctx = ProviderContext::new(Arc::new(client))
            .with_default_org(config.provider.org_id.clone())
            .with_cancellation(interrupt_token());

        Ok(Self { config, store, ctx })
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.config, &self.store, &self.ctx)
    }
}

/// A token cancelled on the first Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current call and saving state");
            on_interrupt.cancel();
        }
    });
    token
}

/// Resolves the declaration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn base_dir(config_file: &Path) -> &Path {
    config_file.parent().unwrap_or_else(|| Path::new("."))
}

/// Loads and validates the declarations and opens the state store next to them.
fn load_config_and_state(config_path: Option<&PathBuf>) -> Result<(DeployConfig, LocalStateStore)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading declarations from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    ConfigValidator::new().validate(&config)?;

    let store = LocalStateStore::with_state_path(base_dir(&config_file).join(&config.state.path));
    Ok((config, store))
}

/// Writes a command result to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    Ok(())
}

/// Asks on stderr and reads the answer from stdin.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
