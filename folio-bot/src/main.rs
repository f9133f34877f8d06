//! Folio CLI - images in, one PDF out.
//!
//! A command-line interface for running the Folio bot.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use clap::{Args, Parser, Subcommand};
use folio::config::{
    FolioConfig, IssueLevel, TOKEN_ENV, config_path as default_config_path, init_config,
    load_config_from, save_config,
};
use folio::error::{FolioError, Result};
use folio_bot::prelude::{CliChannelConfig, Conversation, GatewayBuilder, run_interactive};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Folio - collect images in a chat and get them back as one PDF
#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, env = "FOLIO_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration
    Init(InitArgs),

    /// Start the bot (Telegram, optionally the terminal)
    Run(RunArgs),

    /// Drive a conversation from the terminal
    Chat(ChatArgs),

    /// Show configuration and environment status
    Status,

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the init command
#[derive(Args)]
struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    force: bool,
}

/// Arguments for the run command
#[derive(Args)]
struct RunArgs {
    /// Telegram bot token (overrides config)
    #[arg(long, env = TOKEN_ENV, hide_env_values = true)]
    token: Option<String>,

    /// Directory for staged documents (overrides config)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Also attach the terminal as a channel
    #[arg(long)]
    cli: bool,

    /// Disable Telegram channel
    #[arg(long)]
    no_telegram: bool,
}

/// Arguments for the chat command
#[derive(Args)]
struct ChatArgs {
    /// Directory receiving finished documents
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Directory for staged documents (overrides config)
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Custom prompt prefix
    #[arg(short, long, default_value = "> ")]
    prompt: String,

    /// Identity of the local user
    #[arg(short, long, default_value = "cli")]
    identity: String,
}

/// Arguments for the config command
#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging with the given verbosity level.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "folio_bot={level},folio={level},{}",
            if verbosity >= 2 { "debug" } else { "warn" }
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init(args) => cmd_init(args, cli.config).await,
        Commands::Run(args) => cmd_run(args, cli.config).await,
        Commands::Chat(args) => cmd_chat(args, cli.config).await,
        Commands::Status => cmd_status(cli.config).await,
        Commands::Config(args) => cmd_config(args, cli.config).await,
    }
}

/// Load the configuration from `path` or the default location.
async fn load(path: Option<&Path>) -> Result<FolioConfig> {
    let path = path.map_or_else(default_config_path, Path::to_path_buf);
    load_config_from(&path)
        .await
        .map_err(|e| FolioError::config(format!("failed to load {}: {e}", path.display())))
}

/// Initialize configuration.
async fn cmd_init(args: InitArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_file = config_path.clone().unwrap_or_else(default_config_path);

    if config_file.exists() && !args.force {
        println!("Configuration already exists at: {}", config_file.display());
        println!("Use --force to overwrite.");
        return Ok(());
    }

    let created = if config_path.is_some() {
        save_config(&FolioConfig::default(), &config_file).await
    } else {
        init_config().await.map(drop)
    };
    created.map_err(|e| FolioError::config(format!("failed to initialize config: {e}")))?;

    println!("Configuration created: {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. export {TOKEN_ENV}=<token from @BotFather>");
    println!("  2. folio run");
    println!("  or try it locally: folio chat");

    Ok(())
}

/// Start the bot.
async fn cmd_run(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    tracing::info!("Starting Folio...");

    let mut builder = GatewayBuilder::new()
        .load_config(config_path.as_deref())
        .await?
        .enable_cli(args.cli);

    if let Some(token) = args.token {
        builder = builder.token(token);
    }
    if let Some(dir) = args.staging_dir {
        builder = builder.staging_dir(dir);
    }
    if args.no_telegram {
        builder = builder.enable_telegram(false);
    }

    let gateway = builder.build()?;

    println!("Folio running. Press Ctrl+C to stop.\n");
    gateway.run().await
}

/// Drive a local conversation.
async fn cmd_chat(args: ChatArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = load(config_path.as_deref()).await?;
    if let Some(dir) = args.staging_dir {
        config.staging.dir = Some(dir);
    }

    tokio::fs::create_dir_all(&args.out).await?;
    let engine = Conversation::from_config(&config)?;
    let sweeper = engine.spawn_sweeper(
        config.session.idle_timeout(),
        config.session.sweep_interval(),
    );

    let cli_config = CliChannelConfig::new()
        .prompt(args.prompt)
        .identity(args.identity)
        .out_dir(args.out);

    println!("Folio Chat | /start to begin, @<image path> to add a page, 'exit' to quit\n");

    let result = run_interactive(&engine, cli_config).await;

    sweeper.stop().await;
    engine.sessions().clear();
    result.map_err(FolioError::from)
}

/// Show status.
async fn cmd_status(config_path: Option<PathBuf>) -> Result<()> {
    let config_file = config_path.unwrap_or_else(default_config_path);

    println!("Folio Status\n");

    println!("Configuration:");
    println!("  Path:   {}", config_file.display());
    println!(
        "  Exists: {}",
        if config_file.exists() { "yes" } else { "no" }
    );

    match load(Some(&config_file)).await {
        Ok(config) => {
            println!(
                "  Valid:  {}",
                if config.is_valid() { "yes" } else { "no" }
            );
            println!();
            println!("Telegram:");
            println!(
                "  Enabled:    {}",
                if config.telegram.enabled { "yes" } else { "no" }
            );
            println!(
                "  Token:      {}",
                if config.telegram.resolve_token().is_some() {
                    "set"
                } else {
                    "-"
                }
            );
            println!(
                "  Allow list: {}",
                if config.telegram.allow_from.is_empty() {
                    "everyone".to_string()
                } else {
                    format!("{} user(s)", config.telegram.allow_from.len())
                }
            );
            println!();
            println!("Engine:");
            println!("  Staging dir:    {}", config.staging.resolve_dir().display());
            println!("  Max images:     {}", config.assembly.max_images);
            println!("  Fetch timeout:  {}s", config.fetch.timeout_secs);
            println!("  Idle timeout:   {}s", config.session.idle_timeout_secs);
            println!("  Default locale: {}", config.default_locale.label());
        }
        Err(e) => {
            println!("  Valid:  no ({e})");
        }
    }

    println!();
    println!("Environment:");
    print_env_status(TOKEN_ENV);
    print_env_status("FOLIO_CONFIG");
    print_env_status("RUST_LOG");

    Ok(())
}

/// Configuration management.
async fn cmd_config(args: ConfigArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config_file = config_path.unwrap_or_else(default_config_path);

    match args.command {
        ConfigCommands::Path => {
            println!("{}", config_file.display());
        }
        ConfigCommands::Show => {
            let mut config = load(Some(&config_file)).await?;
            if config.telegram.token.is_some() {
                config.telegram.token = Some("<redacted>".to_string());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
            if !config_file.exists() {
                println!("\n(defaults; run 'folio init' to create {})", config_file.display());
            }
        }
        ConfigCommands::Validate => {
            let config = load(Some(&config_file)).await?;
            let issues = config.validate();
            for issue in &issues {
                let level = match issue.level {
                    IssueLevel::Error => "error",
                    IssueLevel::Warning => "warning",
                };
                println!("{level}: {}", issue.message);
            }
            if !config.is_valid() {
                return Err(FolioError::config("configuration has errors"));
            }
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Print environment variable status.
fn print_env_status(name: &str) {
    let status = if std::env::var(name).is_ok() {
        "set"
    } else {
        "-"
    };
    println!("  {name}: {status}");
}
