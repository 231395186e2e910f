//! SlateHub command-line client
//!
//! Thin shell over `sh-db`: every subcommand connects, restores the persisted
//! session, runs one accessor and prints the result as JSON.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sh_core::config::ClientConfig;
use sh_db::Database;

mod commands;
mod image;

use commands::{DepartmentCommand, GroupCommand, ProfileCommand, RoleCommand};

#[derive(Debug, Parser)]
#[command(name = "slatehub", version, about = "SlateHub data client")]
struct Cli {
    /// Engine endpoint; overrides SURREAL_URL
    #[arg(long, global = true)]
    url: Option<String>,

    /// Session token file; overrides SLATEHUB_TOKEN_FILE
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and report the connection state
    Ping,
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Signin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    Signout,
    /// Print the signed-in user
    Whoami,
    /// Run raw SurrealQL and print every statement result
    Query {
        sql: String,
        /// Bound variables as a JSON object
        #[arg(long)]
        vars: Option<String>,
    },
    #[command(subcommand, name = "orgs")]
    Organizations(GroupCommand),
    #[command(subcommand)]
    Productions(GroupCommand),
    #[command(subcommand)]
    Roles(RoleCommand),
    #[command(subcommand)]
    Departments(DepartmentCommand),
    #[command(subcommand)]
    Profile(ProfileCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli)?;
    tracing::debug!(url = %config.engine.url, ns = %config.engine.namespace, "Loaded configuration");

    let db = Database::from_config(config)?;
    if !db.connect().await {
        let message = db
            .state()
            .error_message
            .get()
            .unwrap_or_else(|| "Failed to connect to database".to_string());
        anyhow::bail!(message);
    }

    let result = commands::run(&db, cli.command).await;
    db.close().await;
    result
}

/// Initialize tracing/logging; logs go to stderr so stdout stays JSON
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sh_db=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::from_env().context("Invalid environment configuration")?;
    if let Some(url) = &cli.url {
        config.engine.url = url.clone();
    }
    if let Some(path) = &cli.token_file {
        config.session.token_file = Some(path.clone());
    }
    if config.session.token_file.is_none() {
        config.session.token_file = default_token_file();
    }
    Ok(config)
}

fn default_token_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("slatehub").join("session.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_group_subcommand() {
        let cli = Cli::try_parse_from([
            "slatehub",
            "orgs",
            "add-member",
            "organization:acme",
            "bob",
            "--role",
            "editor",
        ])
        .unwrap();
        match cli.command {
            Command::Organizations(GroupCommand::AddMember { id, username, role }) => {
                assert_eq!(id, "organization:acme");
                assert_eq!(username, "bob");
                assert_eq!(role, "editor");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_token_file_flag_wins() {
        let cli = Cli::try_parse_from([
            "slatehub",
            "--token-file",
            "/tmp/slatehub-test.json",
            "whoami",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.session.token_file,
            Some(PathBuf::from("/tmp/slatehub-test.json"))
        );
    }
}
