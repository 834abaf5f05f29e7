use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use runtime::{AppConfig, AppConfigProvider, CliArgs};
use scoped_access::config::ScopedAccessConfig;
use scoped_access::contract::{Entity, ResultSet, Role, ScopedCollectionApi, UserProfile};
use scoped_access::domain::policy::PolicyTable;
use scoped_access::infra::MemoryBackend;
use scoped_access::AccessLayer;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// ConsultDesk CLI - inspect role-scoped access to dashboard collections
#[derive(Parser)]
#[command(name = "consultdesk-cli")]
#[command(about = "ConsultDesk CLI - inspect role-scoped access to dashboard collections")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration
    Check,
    /// Print the scope decision for a principal on an entity
    Scope {
        /// Entity collection (enquiries, assessments, applications, visa_applications, payments, users)
        entity: Entity,
        /// Role of the principal
        #[arg(long)]
        role: Role,
        /// Uid of the principal
        #[arg(long, default_value = "cli")]
        uid: String,
        /// Branch the principal is bound to
        #[arg(long)]
        branch: Option<String>,
    },
    /// Sign in from the seed data and print the live view of an entity
    View {
        entity: Entity,
        /// Uid of a record in the users collection
        #[arg(long)]
        uid: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.runtime.home_dir));
    tracing::info!("ConsultDesk CLI starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let provider = AppConfigProvider::new(config.clone());
    let module_cfg: ScopedAccessConfig = provider.module_config("scoped_access")?;

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Check => check_config(&config, &module_cfg),
        Commands::Scope {
            entity,
            role,
            uid,
            branch,
        } => print_scope(&module_cfg, entity, role, uid, branch),
        Commands::View { entity, uid } => view(&config, &module_cfg, entity, &uid).await,
    }
}

fn check_config(config: &AppConfig, module_cfg: &ScopedAccessConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    if let Some(seed) = &module_cfg.seed_file {
        let path = resolve_path(seed, &config.runtime.home_dir);
        if !path.is_file() {
            anyhow::bail!("seed file not found: {}", path.display());
        }
    }

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("{}", config.to_yaml()?);
    Ok(())
}

fn print_scope(
    module_cfg: &ScopedAccessConfig,
    entity: Entity,
    role: Role,
    uid: String,
    branch: Option<String>,
) -> Result<()> {
    let mut policies = PolicyTable::default();
    policies.apply_overrides(&module_cfg.policies);

    let mut profile = UserProfile::new(uid, role);
    profile.branch_id = branch;

    let decision = policies.decide(entity, Some(&profile));
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

async fn view(
    config: &AppConfig,
    module_cfg: &ScopedAccessConfig,
    entity: Entity,
    uid: &str,
) -> Result<()> {
    let backend = MemoryBackend::new();
    if let Some(seed) = &module_cfg.seed_file {
        backend.load_seed_file(&resolve_path(seed, &config.runtime.home_dir))?;
    } else {
        tracing::warn!("No seed_file configured, the in-memory backend is empty");
    }

    let layer = AccessLayer::new(Arc::new(backend), module_cfg);
    layer
        .sign_in(uid)
        .await
        .with_context(|| format!("sign-in failed for '{uid}'"))?;

    let handle = layer.open(entity);
    let mut rx = handle.watch();
    let wait = Duration::from_millis(config.runtime.snapshot_timeout_ms);
    let state: ResultSet = tokio::time::timeout(wait, rx.wait_for(|s| !s.loading))
        .await
        .context("timed out waiting for the first snapshot")?
        .context("subscription closed")?
        .clone();

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Relative paths resolve against `runtime.home_dir`.
fn resolve_path(raw: &str, home_dir: &str) -> PathBuf {
    let p = PathBuf::from(raw);
    if p.is_relative() {
        Path::new(home_dir).join(p)
    } else {
        p
    }
}
