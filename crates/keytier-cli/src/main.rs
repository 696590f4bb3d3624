//! keytier: root/master/user key hierarchy CLI
//!
//! Commands:
//!   encrypt [MESSAGE]          - seal a message (reads stdin when omitted)
//!   decrypt [ENVELOPE]         - open an envelope (reads stdin when omitted)
//!   export <master|user|both>  - print wrapped key records for backup
//!   import <FILE>              - install wrapped key records from a backup
//!   delete-master | delete-user | delete-both
//!   status                     - show per-tier key state
//!   config show                - display the effective configuration
//!
//! Every key command prints a JSON response on stdout and exits 1 when it
//! reports `"success": false`. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

use keytier_core::config::KeytierConfig;
use keytier_core::KeySelection;
use keytier_secrets::{Body, FileKeyStore, KeyService, Keyring, Response};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "keytier",
    version,
    about = "Root/master/user key hierarchy with AES-256-GCM message envelopes"
)]
struct Cli {
    /// Path to keytier.toml configuration file
    #[arg(long, short = 'c', env = "KEYTIER_CONFIG", default_value = "keytier.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "KEYTIER_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "KEYTIER_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a message under the user key
    Encrypt {
        /// Plaintext (stdin when omitted)
        message: Option<String>,
    },

    /// Decrypt an envelope produced by `encrypt`
    Decrypt {
        /// Envelope string (stdin when omitted)
        envelope: Option<String>,
    },

    /// Export wrapped key records
    Export {
        #[arg(value_enum)]
        selection: Selection,
        /// Also write the export document to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Import wrapped key records from an export document
    Import {
        file: PathBuf,
    },

    /// Delete the master key (the user key goes with it); both are regenerated
    DeleteMaster,

    /// Delete the user key; a new one is generated under the current master
    DeleteUser,

    /// Delete both keys; both are regenerated
    DeleteBoth,

    /// Show key hierarchy status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Selection {
    Master,
    User,
    Both,
}

impl From<Selection> for KeySelection {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::Master => KeySelection::Master,
            Selection::User => KeySelection::User,
            Selection::Both => KeySelection::Both,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let loaded = load_config(&cli.config).await?;
    let config = loaded.config;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format {
        Some(format) => format,
        None => parse_log_format(&config.log.format),
    };
    init_logging(&level, format);

    if !loaded.from_file {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        store = %config.store.dir.display(),
        "keytier starting"
    );

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        cmd_config_show(&config, &cli.config, loaded.from_file)?;
        return Ok(ExitCode::SUCCESS);
    }

    let service = open_service(&config)?;
    let response = run(&service, cli.command).await?;

    println!("{}", response.to_json());
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(service: &KeyService, command: Commands) -> Result<Response> {
    let response = match command {
        Commands::Encrypt { message } => {
            let message = arg_or_stdin(message).await?;
            service.encrypt(&message)
        }
        Commands::Decrypt { envelope } => {
            let envelope = arg_or_stdin(envelope).await?;
            service.decrypt(&envelope)
        }
        Commands::Export { selection, output } => {
            let response = service.export(selection.into());
            if let (Some(path), Body::Keys(document)) = (output, &response.body) {
                write_export(&path, document).await?;
            }
            response
        }
        Commands::Import { file } => {
            let document = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading export document: {}", file.display()))?;
            service.import(&document)
        }
        Commands::DeleteMaster => service.delete_master(),
        Commands::DeleteUser => service.delete_user(),
        Commands::DeleteBoth => service.delete_both(),
        Commands::Status => service.status(),
        Commands::Config { .. } => anyhow::bail!("config commands do not use the key store"),
    };
    Ok(response)
}

/// Build the keyring for this invocation and load it.
///
/// A load failure is not fatal: `status` reports it, `import` can repair it,
/// and the other commands return an error response naming the tier.
fn open_service(config: &KeytierConfig) -> Result<KeyService> {
    let store = FileKeyStore::open(&config.store)
        .with_context(|| format!("opening key store: {}", config.store.dir.display()))?;
    let keyring = Keyring::new(store);
    if let Err(e) = keyring.load() {
        tracing::warn!(error = %e, "key hierarchy not fully loaded");
    }
    Ok(KeyService::new(Arc::new(keyring)))
}

async fn arg_or_stdin(arg: Option<String>) -> Result<String> {
    if let Some(value) = arg {
        return Ok(value);
    }
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading stdin")?;
    Ok(strip_line_ending(input))
}

fn strip_line_ending(mut input: String) -> String {
    if input.ends_with('\n') {
        input.pop();
        if input.ends_with('\r') {
            input.pop();
        }
    }
    input
}

async fn write_export(path: &Path, document: &str) -> Result<()> {
    tokio::fs::write(path, format!("{document}\n"))
        .await
        .with_context(|| format!("writing export document: {}", path.display()))?;
    tracing::info!(path = %path.display(), "export document written");
    Ok(())
}

// ── Config loading ────────────────────────────────────────────────────────────

struct LoadedConfig {
    config: KeytierConfig,
    from_file: bool,
}

async fn load_config(path: &Path) -> Result<LoadedConfig> {
    if !path.exists() {
        return Ok(LoadedConfig {
            config: KeytierConfig::default(),
            from_file: false,
        });
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = KeytierConfig::from_toml(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(LoadedConfig {
        config,
        from_file: true,
    })
}

fn parse_log_format(value: &str) -> LogFormat {
    if value.eq_ignore_ascii_case("json") {
        LogFormat::Json
    } else {
        LogFormat::Text
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the response document
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── `keytier config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &KeytierConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
