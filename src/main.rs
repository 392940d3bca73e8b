pub mod models {
    pub mod snapshot;
}

pub mod client;
pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod filter;
pub mod schema;
pub mod server;
pub mod services {
    pub mod resolver;
    pub mod shaper;
    pub mod sync;
    pub mod watch;
}
pub mod viewport;

use crate::client::HttpTransport;
use crate::config::Config;
use crate::db::store::Store;
use crate::filter::DeviceFilter;
use crate::services::watch;
use diesel::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Debug, PartialEq)]
enum Command {
    Serve,
    Watch { filter: DeviceFilter, once: bool },
}

#[derive(Debug, PartialEq)]
struct Cli {
    env_file: Option<PathBuf>,
    command: Command,
}

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

fn serve(cfg: &Config) -> Result<(), String> {
    // 1) Pool
    let store = Store::connect(&cfg.database_url, cfg.db_pool_max, cfg.db_connect_timeout)?;
    info!("Connected to database");

    // 2) Schema
    if cfg.run_migrations {
        let mut conn = store.connection().map_err(|e| e.to_string())?;
        apply_database_migrations(&mut conn)?;
    } else {
        info!("Skipping migrations via RUN_MIGRATIONS={}", cfg.run_migrations);
    }

    // 3) HTTP until shutdown, then release the pool
    let result = server::run(Arc::new(store.clone()), &cfg.bind_addr);
    store.close();
    result
}

fn run(command: Command) -> Result<(), String> {
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (bind_addr={}, db_pool_max={}, db_connect_timeout={}s, run_migrations={}, snapshot_api_url={}, client_timeout={}, watch_interval={}s)",
        cfg.bind_addr,
        cfg.db_pool_max.get(),
        cfg.db_connect_timeout.as_secs(),
        cfg.run_migrations,
        cfg.snapshot_api_url,
        cfg.client_timeout
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "-".to_string()),
        cfg.watch_interval.as_secs()
    );

    match command {
        Command::Serve => serve(&cfg),
        Command::Watch { filter, once } => {
            let transport = HttpTransport::new(cfg.snapshot_api_url.clone(), cfg.client_timeout);
            watch::run_loop(transport, filter, cfg.watch_interval, once)
        }
    }
}

fn parse_cli<I: Iterator<Item = std::ffi::OsString>>(mut args: I) -> Result<Cli, String> {
    let mut env_file: Option<PathBuf> = None;
    let mut command: Option<&'static str> = None;
    let mut filter = DeviceFilter::all();
    let mut once = false;

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("--devices") => {
                let value = args
                    .next()
                    .ok_or_else(|| "`--devices` requires a comma-separated list".to_string())?;
                filter = DeviceFilter::parse(&value.to_string_lossy());
            }
            Some(s) if s.starts_with("--devices=") => {
                filter = DeviceFilter::parse(&s["--devices=".len()..]);
            }
            Some("--once") => once = true,
            Some(cmd @ ("serve" | "watch")) if command.is_none() => {
                command = Some(if cmd == "serve" { "serve" } else { "watch" });
            }
            Some("--") => break,
            Some(other) => return Err(format!("unrecognised argument: {}", other)),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    let command = match command {
        Some("watch") => Command::Watch { filter, once },
        _ => {
            if !filter.is_empty() || once {
                return Err("`--devices` and `--once` only apply to `watch`".to_string());
            }
            Command::Serve
        }
    };
    Ok(Cli { env_file, command })
}

fn load_env(env_file: Option<PathBuf>) -> Result<Option<LoadedEnvFile>, String> {
    // dotenv never overrides variables already present in the process environment.
    match env_file {
        Some(path) => {
            if !path.is_file() {
                return Err(format!("env file not found: {}", path.display()));
            }
            dotenv::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
            Ok(Some(LoadedEnvFile { path, explicit: true }))
        }
        None => match dotenv::dotenv() {
            Ok(path) => Ok(Some(LoadedEnvFile { path, explicit: false })),
            Err(dotenv::Error::Io(_)) => Ok(None),
            Err(e) => Err(format!("failed to load .env: {}", e)),
        },
    }
}

fn main() {
    let cli = match parse_cli(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            eprintln!("usage: sensor-snapshot [--env-file PATH] [serve | watch [--devices A,B] [--once]]");
            std::process::exit(2);
        }
    };
    let loaded_env = match load_env(cli.env_file) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "sensor-snapshot {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(cli.command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
