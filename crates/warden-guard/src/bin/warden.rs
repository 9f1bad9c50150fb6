use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use warden_guard::{WardenConfig, WardenStack};
use warden_permissions::Permission;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Inspect roles and evaluate permissions for the Warden RBAC engine")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML or YAML); `WARDEN_*` variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one permission for one user (exit 1 when denied)
    Check {
        /// Role document (JSON or YAML); overrides `roles_file`
        #[arg(short, long)]
        roles: Option<PathBuf>,

        #[arg(short, long)]
        user: String,

        /// Permission in resource:action:scope form
        #[arg(short, long)]
        permission: String,
    },
    /// Validate permission strings and print their canonical form
    Validate {
        #[arg(required = true)]
        permissions: Vec<String>,
    },
    /// Print a user's resolved permission set
    Roles {
        #[arg(short, long)]
        roles: Option<PathBuf>,

        #[arg(short, long)]
        user: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Check {
            roles,
            user,
            permission,
        } => run_check(config, roles, user, permission).await,
        Commands::Validate { permissions } => Ok(run_validate(&permissions)),
        Commands::Roles { roles, user } => run_roles(config, roles, user).await,
        Commands::Config => {
            let config = WardenConfig::load(config).context("failed to load configuration")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn open_stack(config: Option<&Path>, roles: Option<PathBuf>) -> anyhow::Result<WardenStack> {
    let mut config = WardenConfig::load(config).context("failed to load configuration")?;
    if roles.is_some() {
        config.roles_file = roles;
    }
    if config.roles_file.is_none() {
        bail!("no role document: pass --roles or set roles_file");
    }
    Ok(WardenStack::from_config(config).await?)
}

async fn run_check(
    config: Option<&Path>,
    roles: Option<PathBuf>,
    user: String,
    permission: String,
) -> anyhow::Result<ExitCode> {
    let stack = open_stack(config, roles).await?;
    let decision = stack.guard.check_permission(&user, &permission).await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "user_id": user,
            "permission": decision.required_permission.to_string(),
            "allowed": decision.allowed,
            "reason": decision.reason.to_string(),
        }))?
    );

    Ok(if decision.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_validate(permissions: &[String]) -> ExitCode {
    for input in permissions {
        match Permission::parse(input) {
            Ok(permission) => println!("{}", permission),
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::from(2);
            }
        }
    }
    ExitCode::SUCCESS
}

async fn run_roles(
    config: Option<&Path>,
    roles: Option<PathBuf>,
    user: String,
) -> anyhow::Result<ExitCode> {
    let stack = open_stack(config, roles).await?;
    let set = stack.guard.cache().get_user_permissions(&user).await?;

    println!("{}", serde_json::to_string_pretty(&*set)?);
    Ok(ExitCode::SUCCESS)
}
