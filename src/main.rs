use anyhow::Result;
use captrans::app::{WatchOptions, run_watch_command};
use captrans::cli::{Cli, Commands, parse_setting_value};
use captrans::config::Config;
use captrans::daemon::run_daemon;
use captrans::ipc::client::send_command;
use captrans::ipc::protocol::{Command, Response};
use captrans::ipc::server::IpcServer;
use captrans::pipeline::PipelineStatus;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            let options = WatchOptions {
                quiet: cli.quiet,
                ..WatchOptions::default()
            };
            run_watch_command(config, options).await?;
        }
        Some(Commands::Watch {
            transcript,
            ephemeral,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let options = WatchOptions {
                transcript,
                ephemeral,
                quiet: cli.quiet,
            };
            run_watch_command(config, options).await?;
        }
        Some(Commands::Daemon { socket }) => {
            let config = load_config(cli.config.as_deref())?;
            run_daemon(config, socket, cli.quiet).await?;
        }
        Some(Commands::Translate {
            text,
            context,
            socket,
        }) => {
            let socket = resolve_socket(socket, cli.config.as_deref())?;
            handle_ipc_command(socket, Command::Translate { text, context }).await?;
        }
        Some(Commands::ClearCache { socket }) => {
            let socket = resolve_socket(socket, cli.config.as_deref())?;
            handle_ipc_command(socket, Command::ClearCache).await?;
        }
        Some(Commands::Status { socket }) => {
            let socket = resolve_socket(socket, cli.config.as_deref())?;
            handle_ipc_command(socket, Command::Status).await?;
        }
        Some(Commands::Set { key, value, socket }) => {
            let socket = resolve_socket(socket, cli.config.as_deref())?;
            let value = parse_setting_value(&value);
            handle_ipc_command(socket, Command::Set { key, value }).await?;
        }
        Some(Commands::Shutdown { socket }) => {
            let socket = resolve_socket(socket, cli.config.as_deref())?;
            handle_ipc_command(socket, Command::Shutdown).await?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "captrans",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the flags.
fn init_logging(quiet: bool, verbosity: u8) {
    let level = match (quiet, verbosity) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("captrans={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/captrans/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

/// `--socket`, then `daemon.socket` from the config, then the default path.
fn resolve_socket(socket: Option<PathBuf>, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(socket) = socket {
        return Ok(socket);
    }
    let config = load_config(config_path)?;
    Ok(config
        .daemon
        .socket
        .unwrap_or_else(IpcServer::default_socket_path))
}

/// Send a command to the daemon and print the reply.
async fn handle_ipc_command(socket_path: PathBuf, command: Command) -> Result<()> {
    match send_command(&socket_path, command).await {
        Ok(response) if response.success => print_success(response),
        Ok(response) => {
            let code = response.error.as_deref().unwrap_or("UNKNOWN");
            match response.message {
                Some(message) => eprintln!("{}", format!("Error [{}]: {}", code, message).red()),
                None => eprintln!("{}", format!("Error [{}]", code).red()),
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!(
                "{}",
                format!("Failed to communicate with daemon: {}", e).red()
            );
            eprintln!("Is the daemon running? Start it with: captrans daemon");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_success(response: Response) {
    if let Some(text) = response.translated_text {
        println!("{}", text);
    } else if let Some(status) = response.status {
        print_status(&status);
    } else {
        println!("{}", "OK".green());
    }
}

fn print_status(status: &PipelineStatus) {
    println!("Status:");
    println!("  {}       {}", "Client:".dimmed(), captrans::version_string());
    println!("  {}     {}", "Language:".dimmed(), status.target_language);
    println!("  {}        {}", "Model:".dimmed(), status.model);
    println!("  {}     {}", "Endpoint:".dimmed(), status.endpoint);
    if status.has_api_key {
        println!("  {}      {}", "API key:".dimmed(), "set".green());
    } else {
        println!("  {}      {}", "API key:".dimmed(), "missing".yellow());
    }
    println!(
        "  {}  {} active, {} queued (limit {})",
        "Translations:".dimmed(),
        status.active,
        status.queued,
        status.concurrency_limit
    );
    println!(
        "  {}  {} active, {} queued{}",
        "Transcripts:".dimmed(),
        status.transcript_active,
        status.transcript_queued,
        if status.translate_transcript {
            ""
        } else {
            " (disabled)"
        }
    );
    println!(
        "  {}      {} ({} awaiting)",
        "Sources:".dimmed(),
        status.sources,
        status.awaiting
    );
    println!("  {}        {} entries", "Cache:".dimmed(), status.cache_entries);
}
