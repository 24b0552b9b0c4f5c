//! Command-line interface for captrans
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Live caption and transcript translation
#[derive(Parser, Debug)]
#[command(
    name = "captrans",
    version,
    about = "Live caption and transcript translation"
)]
pub struct Cli {
    /// Subcommand to execute (default: watch stdin)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the daemon (foreground process for systemd)
    Daemon {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Translate one line via the daemon
    Translate {
        /// Text to translate
        text: String,

        /// Preceding line sent as context (repeatable, oldest first)
        #[arg(long = "context", short = 'c', value_name = "LINE")]
        context: Vec<String>,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Clear the daemon's translation cache
    ClearCache {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Get daemon status via IPC
    Status {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Change a setting on the running daemon
    Set {
        /// Setting name (e.g. target_language, concurrency_limit)
        key: String,

        /// New value; parsed as JSON when possible, otherwise taken as a
        /// string. `null` removes the override.
        value: String,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Stop the daemon
    Shutdown {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/captrans.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Translate stdin line by line, printing each line as it settles
    Watch {
        /// Treat lines as entries of a named transcript instead of captions
        #[arg(long, value_name = "NAME")]
        transcript: Option<String>,

        /// Do not read or write the store (no cache persistence)
        #[arg(long)]
        ephemeral: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Interpret a `set` value typed on the command line.
///
/// `4`, `true` and `null` become JSON values; anything that is not valid
/// JSON is taken as a plain string, so `set target_language ja` works.
pub fn parse_setting_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_no_args_defaults_to_watch() {
        let cli = Cli::try_parse_from(["captrans"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_parse_daemon_with_socket() {
        let cli = Cli::try_parse_from(["captrans", "daemon", "--socket", "/tmp/test.sock"]).unwrap();
        match cli.command {
            Some(Commands::Daemon { socket }) => {
                assert_eq!(socket, Some(PathBuf::from("/tmp/test.sock")));
            }
            _ => panic!("Expected Daemon command"),
        }
    }

    #[test]
    fn test_parse_translate_with_context() {
        let cli = Cli::try_parse_from([
            "captrans",
            "translate",
            "How are you?",
            "--context",
            "Hello",
            "-c",
            "Nice to meet you",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Translate {
                text,
                context,
                socket,
            }) => {
                assert_eq!(text, "How are you?");
                assert_eq!(context, vec!["Hello", "Nice to meet you"]);
                assert!(socket.is_none());
            }
            _ => panic!("Expected Translate command"),
        }
    }

    #[test]
    fn test_translate_requires_text() {
        let err = Cli::try_parse_from(["captrans", "translate"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from(["captrans", "set", "concurrency_limit", "4"]).unwrap();
        match cli.command {
            Some(Commands::Set { key, value, .. }) => {
                assert_eq!(key, "concurrency_limit");
                assert_eq!(value, "4");
            }
            _ => panic!("Expected Set command"),
        }
    }

    #[test]
    fn test_parse_watch_flags() {
        let cli =
            Cli::try_parse_from(["captrans", "watch", "--transcript", "lecture", "--ephemeral"])
                .unwrap();
        match cli.command {
            Some(Commands::Watch {
                transcript,
                ephemeral,
            }) => {
                assert_eq!(transcript.as_deref(), Some("lecture"));
                assert!(ephemeral);
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "captrans",
            "status",
            "-vv",
            "--config",
            "/path/to/config.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
        assert!(matches!(cli.command, Some(Commands::Status { .. })));
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let err = Cli::try_parse_from(["captrans", "invalid"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["captrans", "completions", "bash"]).unwrap();
        match cli.command {
            Some(Commands::Completions { shell }) => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_parse_setting_value() {
        assert_eq!(parse_setting_value("4"), json!(4));
        assert_eq!(parse_setting_value("false"), json!(false));
        assert_eq!(parse_setting_value("null"), serde_json::Value::Null);
        assert_eq!(parse_setting_value("ja"), json!("ja"));
        assert_eq!(parse_setting_value("\"8\""), json!("8"));
        assert_eq!(parse_setting_value("#ffcc00"), json!("#ffcc00"));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
