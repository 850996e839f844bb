//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Version string with git hash and build date, e.g. `0.3.0 (abc1234, 2026-01-29)`.
fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");
    const BUILD_DATE: &str = env!("BUILD_DATE");

    static VERSION_STRING: std::sync::OnceLock<String> = std::sync::OnceLock::new();
    VERSION_STRING.get_or_init(|| format!("{} ({}, {})", VERSION, GIT_HASH, BUILD_DATE))
}

/// WorkIron - chain AI agents into one answer
#[derive(Parser, Debug)]
#[command(name = "workiron")]
#[command(author, version = version_string(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to state directory
    #[arg(short, long, env = "WORKIRON_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Model for new agents and the complexity classifier
    #[arg(short, long, env = "WORKIRON_MODEL")]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the agent chain
    Agents {
        #[command(subcommand)]
        action: AgentCommand,
    },

    /// Show or change pipeline preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsCommand,
    },

    /// Run a query through the agent chain
    Run {
        /// Query text
        #[arg(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete all stored agents and preferences
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Start interactive chat (default)
    Chat,
}

#[derive(Subcommand, Debug)]
pub enum AgentCommand {
    /// List agents in pipeline order
    List {
        /// Output format (table, json, brief)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Append an agent to the chain
    Add {
        /// Role, e.g. "Drafter"
        role: String,

        /// System instructions
        instructions: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,

        /// Sampling temperature (0-2)
        #[arg(short, long)]
        temperature: Option<f32>,

        /// Response token budget (1-4000)
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Change one field of an agent
    Update {
        /// Agent id
        id: String,

        /// Field: name, role, instructions, model, temperature, max-tokens, order
        field: String,

        /// New value
        value: String,
    },

    /// Remove an agent
    Remove {
        /// Agent id
        id: String,
    },

    /// Copy an agent to the end of the chain
    Duplicate {
        /// Agent id
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum PrefsCommand {
    /// Show current preferences
    Show,

    /// Set a preference flag
    Set {
        /// show-all-responses, use-all-agents or complexity-routing
        name: String,

        /// on/off, true/false
        #[arg(value_parser = parse_switch, action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Add a classifier override pattern (case-insensitive regex)
    Force {
        /// Verdict the pattern forces
        #[arg(value_enum)]
        verdict: ForcedVerdict,

        /// Pattern to match against queries
        pattern: String,
    },

    /// Remove all classifier override patterns
    ClearOverrides,
}

/// Verdict forced by a classifier override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ForcedVerdict {
    Simple,
    Complex,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Brief,
}

/// Parses on/off style switches.
pub fn parse_switch(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("expected on/off, got '{}'", other)),
    }
}

impl Cli {
    /// Returns the state directory path, using default if not specified.
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(workiron_core::state_dir)
    }

    /// Key/value store directory.
    pub fn store_dir(&self) -> PathBuf {
        match &self.state_dir {
            Some(dir) => dir.join("store"),
            None => workiron_core::store_dir(),
        }
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_no_args() {
        // No args enters chat mode
        let cli = Cli::parse_from(["workiron"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::parse_from(["workiron", "run", "Summarize", "X"]);
        match cli.command {
            Some(Commands::Run { query, json }) => {
                assert_eq!(query.join(" "), "Summarize X");
                assert!(!json);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_agent_add() {
        let cli = Cli::parse_from([
            "workiron",
            "agents",
            "add",
            "Drafter",
            "Draft answers",
            "--temperature",
            "0.3",
            "--max-tokens",
            "500",
        ]);
        match cli.command {
            Some(Commands::Agents {
                action:
                    AgentCommand::Add {
                        role,
                        instructions,
                        temperature,
                        max_tokens,
                        ..
                    },
            }) => {
                assert_eq!(role, "Drafter");
                assert_eq!(instructions, "Draft answers");
                assert_eq!(temperature, Some(0.3));
                assert_eq!(max_tokens, Some(500));
            }
            _ => panic!("Expected Agents Add command"),
        }
    }

    #[test]
    fn test_cli_parse_prefs_set() {
        let cli = Cli::parse_from(["workiron", "prefs", "set", "show-all-responses", "on"]);
        match cli.command {
            Some(Commands::Prefs {
                action: PrefsCommand::Set { name, value },
            }) => {
                assert_eq!(name, "show-all-responses");
                assert!(value);
            }
            _ => panic!("Expected Prefs Set command"),
        }
        assert!(Cli::try_parse_from(["workiron", "prefs", "set", "x", "maybe"]).is_err());
    }

    #[test]
    fn test_parse_switch() {
        assert_eq!(parse_switch("ON"), Ok(true));
        assert_eq!(parse_switch("false"), Ok(false));
        assert!(parse_switch("sometimes").is_err());
    }

    #[test]
    fn test_cli_verbose() {
        let cli = Cli::parse_from(["workiron", "-vvv"]);
        assert_eq!(cli.verbose, 3);
        assert_eq!(cli.log_level(), tracing::Level::TRACE);
    }

    #[test]
    fn test_store_dir_follows_state_dir() {
        let cli = Cli::parse_from(["workiron", "--state-dir", "/tmp/wi", "chat"]);
        assert_eq!(cli.store_dir(), PathBuf::from("/tmp/wi/store"));
    }

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }
}
