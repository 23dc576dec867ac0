//! ledgerdesk - terminal front end for the ERP client.
//!
//! Drives the session manager from the command line: log in, restore or
//! refresh a remembered session, log out, and list general-ledger
//! transactions with the signed-in user's token.

mod terminal;

use std::io::{self, BufRead};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ledgerdesk_core::auth::{FileStore, KeyringStore, MemoryStore};
use ledgerdesk_core::cache::CacheManager;
use ledgerdesk_core::ledger::{consolidate_vouchers, search, ExportRow, GlTransaction};
use ledgerdesk_core::{
    ActivityKind, ApiClient, Config, Credentials, RecordCodec, RouteHistory,
    SessionManager, SessionStore, StorageBackend,
};

use terminal::{print_state, print_transactions, print_user, StderrNotifier};

/// Activity events buffered between the terminal reader and the session
const ACTIVITY_CHANNEL_CAPACITY: usize = 32;

#[derive(Parser)]
#[command(name = "ledgerdesk", version, about = "ERP client session and ledger tools")]
struct Cli {
    /// Backend base URL (overrides config and LEDGERDESK_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and start a session
    Login {
        #[arg(short, long, env = "LEDGERDESK_USERNAME")]
        username: Option<String>,
        /// Keep the session across restarts
        #[arg(short, long)]
        remember: bool,
        /// Page to open after login
        #[arg(long)]
        return_url: Option<String>,
    },
    /// Restore the remembered session and renew its token
    Restore,
    /// Show the remembered session without contacting the server
    Status,
    /// End the session and forget it
    Logout,
    /// Keep the session alive while you type; each line is one key press
    Watch,
    /// List general-ledger vouchers
    Transactions {
        /// Only show vouchers matching this text
        #[arg(short, long)]
        search: Option<String>,
        /// Print rows as JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Use cached rows without contacting the server
        #[arg(long)]
        offline: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "ledgerdesk.log".to_string());
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

struct App {
    config: Config,
    session: SessionManager,
    api: Arc<ApiClient>,
    routes: Arc<RouteHistory>,
}

impl App {
    fn new(config: Config) -> Result<Self> {
        let timeout = Duration::from_millis(config.session.request_timeout_ms);
        let api = Arc::new(ApiClient::new(&config.base_url, timeout)?);

        let store: Arc<dyn SessionStore> = match config.storage {
            StorageBackend::File => Arc::new(FileStore::new(config.data_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new()),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        let codec = RecordCodec::new(config.storage_secret())
            .context("Failed to prepare session storage key")?;
        let routes = Arc::new(RouteHistory::default());

        let session = SessionManager::new(
            config.session.clone(),
            codec,
            api.clone(),
            store,
            Arc::new(StderrNotifier),
            routes.clone(),
        );

        Ok(Self {
            config,
            session,
            api,
            routes,
        })
    }

    async fn login(&mut self, username: Option<String>, remember: bool, return_url: Option<String>) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(username) => username,
            None => prompt("Username: ")?,
        };
        let password = match std::env::var("LEDGERDESK_PASSWORD") {
            Ok(password) if !password.is_empty() => password,
            _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
        };

        let credentials = Credentials {
            username: username.clone(),
            password,
            remember_me: remember,
            return_url,
        };

        let user = self.session.login(&credentials).await?;
        println!("Logged in as {}", user.display_name());
        println!("Opened {}", self.routes.current());

        self.config.last_username = Some(username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let outcome = self.session.init().await;
        println!("Restore: {:?}", outcome);
        print_state(&self.session.snapshot());
        Ok(())
    }

    fn status(&self) {
        match self.session.stored_user() {
            Some(user) => {
                println!("Remembered session:");
                print_user(&user);
            }
            None => println!("No remembered session"),
        }
    }

    fn logout(&self) {
        self.session.logout();
        println!("Logged out");
    }

    async fn watch(&self) -> Result<()> {
        self.session.init().await;
        print_state(&self.session.snapshot());

        let (tx, rx) = mpsc::channel(ACTIVITY_CHANNEL_CAPACITY);
        self.session.spawn_activity_listener(rx);

        let mut changes = self.session.subscribe();
        let printer = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = changes.borrow_and_update().clone();
                if !state.loading {
                    print_state(&state);
                }
            }
        });

        eprintln!("Watching activity; press Enter to record a key press, Ctrl-D to stop");
        // Stdin is blocking; feed it to the listener from its own thread
        let reader = std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                if line.is_err() || tx.blocking_send(ActivityKind::KeyPress).is_err() {
                    break;
                }
            }
        });
        tokio::task::spawn_blocking(move || reader.join())
            .await
            .context("Activity reader task failed")?
            .map_err(|_| anyhow::anyhow!("Activity reader panicked"))?;

        self.session.shutdown();
        printer.abort();
        Ok(())
    }

    async fn transactions(&self, text: Option<String>, json: bool, offline: bool) -> Result<()> {
        if !offline {
            self.session.init().await;
        }
        let user = self
            .session
            .user()
            .or_else(|| self.session.stored_user())
            .ok_or_else(|| anyhow::anyhow!("Not logged in. Run `ledgerdesk login` first."))?;
        let cache = CacheManager::new(self.config.cache_dir()?, &user.company_code)?;

        let rows: Vec<GlTransaction> = if offline {
            load_cached(&cache)?
        } else {
            match self.api.fetch_gl_transactions(&user.token).await {
                Ok(lines) => {
                    let rows = consolidate_vouchers(lines);
                    if let Err(e) = cache.save_gl_transactions(&rows) {
                        warn!(error = %e, "Failed to cache GL transactions");
                    }
                    rows
                }
                Err(e) => {
                    eprintln!("✗ {:#}", e);
                    eprintln!("Showing cached vouchers instead");
                    load_cached(&cache)?
                }
            }
        };

        let matching = search(&rows, text.as_deref().unwrap_or_default());
        if json {
            let export: Vec<ExportRow> = matching.iter().map(|row| ExportRow::from(*row)).collect();
            println!("{}", serde_json::to_string_pretty(&export)?);
        } else {
            print_transactions(&matching);
        }
        Ok(())
    }
}

fn load_cached(cache: &CacheManager) -> Result<Vec<GlTransaction>> {
    match cache.load_gl_transactions()? {
        Some(cached) => {
            eprintln!("Cached {}", cached.age_display());
            Ok(cached.data)
        }
        None => Err(anyhow::anyhow!("No cached GL transactions")),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).context("Failed to read input")?;
    Ok(line.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }

    let _log_guard = init_tracing(config.log_file.as_deref());
    info!(base_url = %config.base_url, storage = ?config.storage, "ledgerdesk starting");

    let mut app = App::new(config)?;
    match cli.command {
        Command::Login {
            username,
            remember,
            return_url,
        } => app.login(username, remember, return_url).await?,
        Command::Restore => app.restore().await?,
        Command::Status => app.status(),
        Command::Logout => app.logout(),
        Command::Watch => app.watch().await?,
        Command::Transactions {
            search,
            json,
            offline,
        } => app.transactions(search, json, offline).await?,
    }

    Ok(())
}
