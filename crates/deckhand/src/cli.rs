//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Deckhand - addon hook orchestration
///
/// Resolves addon dependencies, runs lifecycle hooks and streams
/// deployment logs.
#[derive(Parser, Debug)]
#[command(name = "deckhand")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Addon catalog, dependency order and installs
    Addons(AddonsCommand),

    /// Registered hooks and manual triggers
    Hooks(HooksCommand),

    /// Follow a deployment log file
    Logs(LogsCommand),

    /// Hook metrics recorded per addon
    Metrics(MetricsCommand),

    /// Classify an error message and list recovery actions
    Diagnose {
        /// Error text to classify
        error: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Configuration
    Config(ConfigCommand),

    /// Show version
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Addon Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AddonsCommand {
    #[command(subcommand)]
    pub action: AddonsAction,
}

#[derive(Subcommand, Debug)]
pub enum AddonsAction {
    /// List discovered addons
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the install order for an addon
    Order {
        /// Addon name
        name: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print an addon's dependency tree
    Tree {
        /// Addon name
        name: String,
    },

    /// Check the dependency graph for cycles and missing addons
    Validate {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Install an addon and its dependencies
    Install {
        /// Addon name
        name: String,
    },

    /// Uninstall an addon
    Uninstall {
        /// Addon name
        name: String,

        /// Addons to treat as installed when checking dependents
        #[arg(long, value_delimiter = ',')]
        installed: Vec<String>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct HooksCommand {
    #[command(subcommand)]
    pub action: HooksAction,
}

#[derive(Subcommand, Debug)]
pub enum HooksAction {
    /// List registered hooks in execution order
    List {
        /// Only this event
        event: Option<String>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Trigger an event
    Trigger {
        /// Event name (pre_deployment, post_deployment, ...)
        event: String,

        /// Deployment ID
        #[arg(long)]
        deployment: Option<String>,

        /// Project ID
        #[arg(long)]
        project: Option<String>,

        /// Target environment
        #[arg(long)]
        env: Option<String>,

        /// Metadata entry (key=value), repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,

        /// Abort on the first failed required hook
        #[arg(long)]
        fail_fast: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Log Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct LogsCommand {
    #[command(subcommand)]
    pub action: LogsAction,
}

#[derive(Subcommand, Debug)]
pub enum LogsAction {
    /// Stream a log file until Ctrl-C
    Tail {
        /// Log file to follow
        file: PathBuf,

        /// Deployment the log belongs to
        #[arg(short, long)]
        deployment: String,

        /// Read the file from its beginning
        #[arg(long)]
        from_start: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Metrics Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct MetricsCommand {
    #[command(subcommand)]
    pub action: MetricsAction,
}

#[derive(Subcommand, Debug)]
pub enum MetricsAction {
    /// Show aggregates and recent runs for an addon
    Show {
        /// Addon name
        addon: String,

        /// Number of recent runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Output as JSON instead of TOML
        #[arg(short, long)]
        json: bool,
    },

    /// Print the config file location
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_args() {
        let cli = Cli::parse_from([
            "deckhand",
            "hooks",
            "trigger",
            "pre_deployment",
            "--env",
            "production",
            "--meta",
            "branch=main",
            "--meta",
            "sha=abc123",
            "--fail-fast",
        ]);
        match cli.command {
            Commands::Hooks(HooksCommand {
                action:
                    HooksAction::Trigger {
                        event,
                        env,
                        meta,
                        fail_fast,
                        ..
                    },
            }) => {
                assert_eq!(event, "pre_deployment");
                assert_eq!(env.as_deref(), Some("production"));
                assert_eq!(meta, vec!["branch=main", "sha=abc123"]);
                assert!(fail_fast);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["deckhand", "addons", "list", "--json", "-v", "--log-json"]);
        assert!(cli.verbose);
        assert!(cli.log_json);
    }

    #[test]
    fn test_uninstall_installed_list() {
        let cli = Cli::parse_from(["deckhand", "addons", "uninstall", "db", "--installed", "api,web"]);
        let Commands::Addons(AddonsCommand {
            action: AddonsAction::Uninstall { installed, .. },
        }) = cli.command
        else {
            panic!("expected uninstall");
        };
        assert_eq!(installed, vec!["api", "web"]);
    }
}
