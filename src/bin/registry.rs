use clap::{Args as ClapArgs, Parser, Subcommand};
use definition_registry::config::RegistryConfig;
use definition_registry::db::enums::DefinitionStatus;
use definition_registry::db::models::{AlertDefinitionImport, CheckDefinitionImport};
use definition_registry::{AppError, Authority, RegistryService};
use serde::Serialize;
use std::fs;
use tracing::{error, info};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// The acting identity, as resolved by the caller's identity provider.
#[derive(ClapArgs, Debug)]
struct Identity {
    #[arg(long)]
    user: String,
    /// Team membership; repeat for several teams, first one is the default owner
    #[arg(long = "team")]
    teams: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the registry tables and snapshot counters
    Migrate,
    /// Create or update a check definition from a JSON file
    ImportCheck {
        #[arg(long)]
        file: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Create or update an alert definition from a JSON file
    ImportAlert {
        #[arg(long)]
        file: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// List check definitions
    Checks {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "id")]
        ids: Vec<i32>,
        #[arg(long = "owning-team")]
        owning_teams: Vec<String>,
    },
    /// List alert definitions
    Alerts {
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "id")]
        ids: Vec<i32>,
        #[arg(long = "owning-team")]
        owning_teams: Vec<String>,
        #[arg(long)]
        check_id: Option<i32>,
    },
    /// Check definitions changed since a snapshot
    DiffChecks {
        #[arg(long)]
        since: Option<i64>,
    },
    /// Alert definitions changed since a snapshot
    DiffAlerts {
        #[arg(long)]
        since: Option<i64>,
    },
    /// Mark a check definition as deleted
    DeleteCheck {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owning_team: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Mark an alert definition as deleted
    DeleteAlert {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owning_team: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Remove deleted check definitions no live alert refers to
    DeleteDetached,
    /// List every team known to the registry
    Teams,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "registry.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Human-readable on stderr; stdout carries command output
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
}

fn parse_status(status: Option<&str>) -> Result<Option<DefinitionStatus>, AppError> {
    status
        .map(|s| {
            s.parse::<DefinitionStatus>()
                .map_err(|_| AppError::InvalidInput(format!("unknown status '{s}'")))
        })
        .transpose()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, AppError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| AppError::InvalidInput(format!("Failed to read {path}: {e}")))?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(registry: &RegistryService, command: Command) -> Result<(), AppError> {
    match command {
        Command::Migrate => registry.setup_schema().await,
        Command::ImportCheck { file, identity } => {
            let import: CheckDefinitionImport = read_json(&file)?;
            let authority = Authority::new(identity.user, identity.teams);
            let result = registry
                .create_or_update_check_definition(import, &authority)
                .await?;
            print_json(&result)
        }
        Command::ImportAlert { file, identity } => {
            let import: AlertDefinitionImport = read_json(&file)?;
            let authority = Authority::new(identity.user, identity.teams);
            let result = registry
                .create_or_update_alert_definition(import, &authority)
                .await?;
            print_json(&result)
        }
        Command::Checks {
            status,
            ids,
            owning_teams,
        } => {
            let status = parse_status(status.as_deref())?;
            if !ids.is_empty() {
                print_json(&registry.get_check_definitions_by_ids(status, &ids).await?)
            } else if !owning_teams.is_empty() {
                print_json(
                    &registry
                        .get_check_definitions_by_owning_teams(status, &owning_teams)
                        .await?,
                )
            } else {
                print_json(&registry.get_check_definitions(status).await?)
            }
        }
        Command::Alerts {
            status,
            ids,
            owning_teams,
            check_id,
        } => {
            let status = parse_status(status.as_deref())?;
            if let Some(check_id) = check_id {
                print_json(&registry.get_alert_definitions_by_check(status, check_id).await?)
            } else if !ids.is_empty() {
                print_json(&registry.get_alert_definitions_by_ids(status, &ids).await?)
            } else if !owning_teams.is_empty() {
                print_json(
                    &registry
                        .get_alert_definitions_by_owning_teams(status, &owning_teams)
                        .await?,
                )
            } else {
                print_json(&registry.get_alert_definitions(status).await?)
            }
        }
        Command::DiffChecks { since } => {
            print_json(&registry.get_check_definitions_diff(since).await?)
        }
        Command::DiffAlerts { since } => {
            print_json(&registry.get_alert_definitions_diff(since).await?)
        }
        Command::DeleteCheck {
            name,
            owning_team,
            identity,
        } => {
            let authority = Authority::new(identity.user, identity.teams);
            let result = registry
                .delete_check_definition(&authority, &name, &owning_team)
                .await?;
            print_json(&result)
        }
        Command::DeleteAlert {
            name,
            owning_team,
            identity,
        } => {
            let authority = Authority::new(identity.user, identity.teams);
            let result = registry
                .delete_alert_definition(&authority, &name, &owning_team)
                .await?;
            print_json(&result)
        }
        Command::DeleteDetached => {
            let removed = registry.delete_detached_check_definitions().await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
        Command::Teams => print_json(&registry.get_all_teams().await?),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match RegistryConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load registry configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting definition registry.");

    let registry = RegistryService::connect(&config).await?;
    if let Err(e) = run(&registry, args.command).await {
        error!(error = %e, retryable = e.is_retryable(), "Registry command failed.");
        return Err(e.into());
    }
    Ok(())
}
