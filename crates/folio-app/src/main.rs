//! Folio - reading dashboard backend.
//!
//! Serves the page proxy and chapter extraction API. Also has two one-shot
//! maintenance modes: `--create-user` seeds an account and `--issue-token`
//! prints a signed credential for an existing one.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use folio_core::{JwtCodec, ProxySettings};
use folio_server::{AppState, Server, ServerConfig, DEFAULT_HOST, DEFAULT_PORT};
use folio_storage::{Database, NewUser};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Signing secret used when none is configured. Never use it in production.
const DEV_JWT_SECRET: &str = "folio-dev-secret-change-in-production";

/// Stored for seeded accounts; matches no password.
const SEEDED_PASSWORD_HASH: &str = "!";

#[derive(Parser, Debug)]
#[command(name = "folio", version, about)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port to bind to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// SQLite database file (default: platform data directory)
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Proxy settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Token signing secret
    #[arg(long, env = "FOLIO_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print a signed token for this user id and exit
    #[arg(long, value_name = "USER_ID")]
    issue_token: Option<i64>,

    /// Create a user with this username and exit
    #[arg(long, value_name = "USERNAME", requires = "email")]
    create_user: Option<String>,

    /// Email for --create-user
    #[arg(long)]
    email: Option<String>,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "folio", "folio").map(|dirs| dirs.data_dir().join("logs"))
}

fn filter_directives(args: &Args) -> String {
    let log_level = if args.debug { "debug" } else { &args.log_level };
    format!("folio={0},tower_http={0},warn", log_level)
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(args)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("folio")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<ProxySettings> {
    match path {
        Some(path) => ProxySettings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(ProxySettings::default()),
    }
}

fn jwt_secret(configured: Option<&str>) -> &str {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => secret,
        None => {
            tracing::warn!("No JWT secret configured, using the development default");
            DEV_JWT_SECRET
        }
    }
}

fn create_user(db: &Database, username: &str, email: &str) -> anyhow::Result<()> {
    let user = db
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: SEEDED_PASSWORD_HASH.to_string(),
        })
        .context("failed to create user")?;

    tracing::info!(user_id = user.id, "Created user {}", user.username);
    println!("{}", user.id);
    Ok(())
}

fn issue_token(db: &Database, codec: &JwtCodec, user_id: i64) -> anyhow::Result<()> {
    if db.find_user_by_id(user_id)?.is_none() {
        anyhow::bail!("no user with id {}", user_id);
    }

    let token = codec.issue(user_id).context("failed to sign token")?;
    println!("{}", token);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep the guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Folio...");

    let settings = load_settings(args.config.as_ref())?;
    let codec = JwtCodec::with_ttl_hours(
        jwt_secret(args.jwt_secret.as_deref()),
        settings.token_ttl_hours,
    );

    let db_path = match args.db_path.clone() {
        Some(path) => path,
        None => Database::default_db_path()?,
    };
    let db = Database::with_path(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::info!("Database opened at {:?}", db_path);

    if let (Some(username), Some(email)) = (args.create_user.as_deref(), args.email.as_deref()) {
        return create_user(&db, username, email);
    }

    if let Some(user_id) = args.issue_token {
        return issue_token(&db, &codec, user_id);
    }

    tracing::info!(
        "Proxying {} allowed domains (timeout {}s per attempt)",
        settings.allowed_domains.len(),
        settings.attempt_timeout_secs
    );

    let config = ServerConfig::with_db_path(&db_path)
        .with_host(args.host)
        .with_port(args.port);
    let state = AppState::new(db, &settings, codec)?;
    let server = Server::with_state(config, state)?;

    server.run().await?;

    tracing::info!("Folio shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::TokenVerifier;
    use std::io::Write;

    #[test]
    fn args_defaults() {
        let args = Args::try_parse_from(["folio"]).unwrap();
        assert_eq!(args.host, "127.0.0.1");
        assert_eq!(args.port, 3001);
        assert_eq!(args.log_level, "info");
        assert!(args.issue_token.is_none());
    }

    #[test]
    fn args_create_user_requires_email() {
        assert!(Args::try_parse_from(["folio", "--create-user", "reader"]).is_err());

        let args = Args::try_parse_from([
            "folio",
            "--create-user",
            "reader",
            "--email",
            "reader@example.com",
        ])
        .unwrap();
        assert_eq!(args.create_user.as_deref(), Some("reader"));
    }

    #[test]
    fn debug_forces_debug_level() {
        let args = Args::try_parse_from(["folio", "--debug", "--log-level", "warn"]).unwrap();
        assert_eq!(filter_directives(&args), "folio=debug,tower_http=debug,warn");

        let args = Args::try_parse_from(["folio", "--log-level", "trace"]).unwrap();
        assert_eq!(filter_directives(&args), "folio=trace,tower_http=trace,warn");
    }

    #[test]
    fn secret_falls_back_to_dev_default() {
        assert_eq!(jwt_secret(None), DEV_JWT_SECRET);
        assert_eq!(jwt_secret(Some("  ")), DEV_JWT_SECRET);
        assert_eq!(jwt_secret(Some("prod")), "prod");
    }

    #[test]
    fn settings_from_file_or_default() {
        assert_eq!(load_settings(None).unwrap(), ProxySettings::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"allowed_domains": ["example.org"]}}"#).unwrap();
        let settings = load_settings(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(settings.allowed_domains, vec!["example.org".to_string()]);

        assert!(load_settings(Some(&PathBuf::from("/nonexistent/folio.json"))).is_err());
    }

    #[test]
    fn issue_token_for_existing_user_only() {
        let db = Database::in_memory().unwrap();
        let codec = JwtCodec::new("test");

        assert!(issue_token(&db, &codec, 1).is_err());

        create_user(&db, "reader", "reader@example.com").unwrap();
        assert!(issue_token(&db, &codec, 1).is_ok());
        assert_eq!(
            codec.verify(&codec.issue(1).unwrap()).unwrap().subject_id,
            1
        );
    }
}
