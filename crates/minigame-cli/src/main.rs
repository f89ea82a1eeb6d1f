//! minigame - command-line admin session tool for the minigame platform.
//!
//! Logs an admin in against the backend, keeps the session on disk (or in
//! the OS keychain) and exposes it to scripts via `minigame token`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use minigame_core::{ApiClient, Config, PrincipalPatch, SessionStore};
use serde_json::Value;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the password for non-interactive login
const ENV_PASSWORD: &str = "MINIGAME_PASSWORD";

/// Environment variable naming a directory for a log file
const ENV_LOG_DIR: &str = "MINIGAME_LOG_DIR";

#[derive(Parser)]
#[command(name = "minigame", about = "Minigame platform admin session tool", version)]
struct Cli {
    /// Path to config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the session
    Login {
        /// Admin username (defaults to the last one used)
        username: Option<String>,
    },
    /// Show the current session
    Whoami,
    /// Print the bearer token for use in scripts
    Token,
    /// Change profile fields of the current session
    Update {
        #[arg(long, conflicts_with = "clear_name")]
        name: Option<String>,
        /// Set the display name to null
        #[arg(long)]
        clear_name: bool,
        #[arg(long)]
        role: Option<String>,
        /// Extra field as key=json, e.g. --set theme='"dark"'
        #[arg(long = "set", value_name = "KEY=JSON")]
        fields: Vec<String>,
    },
    /// Re-fetch the profile from the backend
    Refresh,
    /// Log out and forget the session
    Logout,
    /// Print the effective configuration
    Config,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "minigame.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config(path: Option<&PathBuf>) -> Result<(Config, PathBuf)> {
    let path = match path {
        Some(p) => p.clone(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    config.apply_env()?;
    Ok((config, path))
}

/// Parse `key=json`; bare words that are not JSON are taken as strings.
fn parse_field(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected KEY=JSON, got '{}'", raw))?;
    match key {
        "" => bail!("Empty field name in '{}'", raw),
        "id" => bail!("The admin id cannot be changed"),
        "name" => bail!("Use --name or --clear-name to change the display name"),
        "role" => bail!("Use --role to change the role"),
        _ => {}
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

fn print_session(store: &SessionStore) -> Result<()> {
    let state = store.state();
    match state.principal() {
        Some(principal) => {
            println!("Signed in as {}", principal.display_name());
            println!("{}", serde_json::to_string_pretty(principal)?);
        }
        None => println!("Not signed in"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();

    let (mut config, config_path) = load_config(cli.config.as_ref())?;
    debug!(path = %config_path.display(), storage = ?config.storage, "Config loaded");

    let store = Arc::new(config.open_session_store()?);

    match cli.command {
        Commands::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(u) if !u.is_empty() => u,
                _ => prompt_username()?,
            };
            let password = match std::env::var(ENV_PASSWORD) {
                Ok(p) if !p.is_empty() => p,
                _ => rpassword::prompt_password("Password: ")?,
            };

            let api = ApiClient::new(config.api_base_url.clone(), store.clone())?;
            let admin = api.login(&username, &password).await?;

            config.last_username = Some(username);
            if let Err(e) = config.save_to(&config_path) {
                tracing::warn!(error = %e, "Failed to save config");
            }
            println!("Logged in as {}", admin.display_name());
        }
        Commands::Whoami => print_session(&store)?,
        Commands::Token => match store.token() {
            Some(token) => println!("{}", token),
            None => {
                eprintln!("Not signed in");
                std::process::exit(1);
            }
        },
        Commands::Update {
            name,
            clear_name,
            role,
            fields,
        } => {
            if !store.is_authenticated() {
                bail!("Not signed in");
            }
            let mut patch = PrincipalPatch::new();
            if let Some(name) = name {
                patch = patch.name(name);
            }
            if clear_name {
                patch = patch.clear_name();
            }
            if let Some(role) = role {
                patch = patch.role(role);
            }
            for raw in &fields {
                let (key, value) = parse_field(raw)?;
                patch = patch.field(key, value);
            }
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            store.update_session(patch);
            print_session(&store)?;
        }
        Commands::Refresh => {
            let api = ApiClient::new(config.api_base_url.clone(), store.clone())?;
            let admin = api.refresh_profile().await?;
            println!("Profile refreshed for {}", admin.display_name());
        }
        Commands::Logout => {
            let api = ApiClient::new(config.api_base_url.clone(), store.clone())?;
            api.logout().await;
            info!("Logged out");
            println!("Logged out");
        }
        Commands::Config => {
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update_flags() {
        let cli = Cli::try_parse_from([
            "minigame", "update", "--name", "B", "--set", "level=3", "--set", "theme=dark",
        ])
        .unwrap();
        match cli.command {
            Commands::Update { name, fields, clear_name, .. } => {
                assert_eq!(name.as_deref(), Some("B"));
                assert!(!clear_name);
                assert_eq!(fields, vec!["level=3", "theme=dark"]);
            }
            _ => panic!("expected update"),
        }
    }

    #[test]
    fn test_name_and_clear_name_conflict() {
        assert!(Cli::try_parse_from(["minigame", "update", "--name", "B", "--clear-name"]).is_err());
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("level=3").unwrap(), ("level".to_string(), serde_json::json!(3)));
        assert_eq!(
            parse_field("theme=dark").unwrap(),
            ("theme".to_string(), Value::String("dark".into()))
        );
        assert_eq!(
            parse_field("tags=[\"a\"]").unwrap(),
            ("tags".to_string(), serde_json::json!(["a"]))
        );
        assert!(parse_field("novalue").is_err());
        assert!(parse_field("=1").is_err());
    }

    #[test]
    fn test_parse_field_points_reserved_keys_at_flags() {
        let err = parse_field("name=B").unwrap_err().to_string();
        assert!(err.contains("--name"), "{}", err);
        let err = parse_field("role=owner").unwrap_err().to_string();
        assert!(err.contains("--role"), "{}", err);
        let err = parse_field("id=3").unwrap_err().to_string();
        assert!(err.contains("cannot be changed"), "{}", err);
    }
}
