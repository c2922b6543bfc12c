use academy_storage::AcademyStore;
use anyhow::{Context, Result};
use clap::Parser;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{error, info};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

mod error;
mod handlers;

use handlers::AppState;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_PATH: &str = "academy.sqlite";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    db_path: PathBuf,
    seed: bool,
    debug: bool,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "academy-api")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    db_path: String,
    #[arg(long, default_value_t = false)]
    seed: bool,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    let _log_guard = init_logging(&config);
    if let Err(err) = run(config).await {
        error!(event = "server_error", error = ?err);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<()> {
    let addr: SocketAddr = config
        .addr
        .parse()
        .with_context(|| format!("invalid listen address {}", config.addr))?;

    let mut store = AcademyStore::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    if config.seed {
        store.seed_demo_data().context("failed to seed demo data")?;
    }

    let app = handlers::router(Arc::new(AppState::new(store)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        event = "server_start",
        addr = %config.addr,
        db_path = %config.db_path.display(),
        seed = config.seed
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "server_shutdown");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server failed")?;
    Ok(())
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve_addr(&args.addr),
        db_path: PathBuf::from(resolve_setting(
            &args.db_path,
            "ACADEMY_DB_PATH",
            DEFAULT_DB_PATH,
        )),
        seed: args.seed || env_true("ACADEMY_SEED"),
        debug: args.debug || env_true("ACADEMY_DEBUG"),
        log_dir: resolve_setting(&args.log_dir, "ACADEMY_LOG_DIR", ""),
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("ACADEMY_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

/// Tees formatted events to stdout and, when configured, the log file.
struct MultiWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: io::stdout(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stdout.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stdout.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("academy-api.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

/// Flag first, then the environment, then the built-in default.
fn resolve_setting(flag: &str, env_key: &str, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    default.to_string()
}

fn resolve_addr(addr_flag: &str) -> String {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    resolve_setting(addr_flag, "ACADEMY_ADDR", &format!("{DEFAULT_HOST}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_default() {
        assert_eq!(
            resolve_setting("/tmp/flag.sqlite", "ACADEMY_TEST_UNSET_KEY", DEFAULT_DB_PATH),
            "/tmp/flag.sqlite"
        );
        assert_eq!(
            resolve_setting("  ", "ACADEMY_TEST_UNSET_KEY", DEFAULT_DB_PATH),
            DEFAULT_DB_PATH
        );
    }

    #[test]
    fn unset_env_is_false() {
        assert!(!env_true("ACADEMY_TEST_UNSET_FLAG"));
    }

    #[test]
    fn log_file_is_created_under_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let log_dir = dir.path().join("logs");
        let guard = open_log_file(&log_dir.to_string_lossy()).expect("open log file");
        assert!(guard.file.is_some());
        assert!(log_dir.join("academy-api.log").exists());
        assert!(open_log_file("").expect("no log dir").file.is_none());
    }
}
