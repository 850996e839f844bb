//! Interactive REPL (Read-Eval-Print Loop) for WorkIron.

use std::path::{Path, PathBuf};

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use tracing::debug;

use workiron_agent::{AgentConfig, AgentField};
use workiron_orchestrator::{PreferenceFlag, Session};

use crate::cli::{parse_switch, OutputFormat};
use crate::commands::{self, print_agents, print_preferences};

type ReplResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Help information for a command.
pub struct CommandHelp {
    /// Command name (e.g., "add").
    pub name: &'static str,
    /// Command aliases (e.g., ["a"]).
    pub aliases: &'static [&'static str],
    /// Brief one-line description.
    pub brief: &'static str,
    /// Usage syntax.
    pub usage: &'static str,
}

/// Static help entries for all commands.
static COMMAND_HELP: &[CommandHelp] = &[
    CommandHelp {
        name: "agents",
        aliases: &["ls"],
        brief: "List agents in pipeline order",
        usage: "/agents",
    },
    CommandHelp {
        name: "add",
        aliases: &[],
        brief: "Append an agent to the chain",
        usage: "/add <role> | <instructions>",
    },
    CommandHelp {
        name: "update",
        aliases: &["set-agent"],
        brief: "Change one field of an agent",
        usage: "/update <id> <field> <value>\nfields: name, role, instructions, model, temperature, max-tokens, order",
    },
    CommandHelp {
        name: "remove",
        aliases: &["rm"],
        brief: "Remove an agent",
        usage: "/remove <id>",
    },
    CommandHelp {
        name: "dup",
        aliases: &["duplicate"],
        brief: "Copy an agent to the end of the chain",
        usage: "/dup <id>",
    },
    CommandHelp {
        name: "prefs",
        aliases: &[],
        brief: "Show preferences",
        usage: "/prefs",
    },
    CommandHelp {
        name: "set",
        aliases: &[],
        brief: "Turn a preference on or off",
        usage: "/set <show-all-responses|use-all-agents|complexity-routing> <on|off>",
    },
    CommandHelp {
        name: "clear",
        aliases: &[],
        brief: "Start a fresh conversation thread",
        usage: "/clear",
    },
    CommandHelp {
        name: "reset",
        aliases: &[],
        brief: "Delete all stored agents and preferences",
        usage: "/reset yes",
    },
    CommandHelp {
        name: "help",
        aliases: &["h", "?"],
        brief: "Show help",
        usage: "/help [command]",
    },
    CommandHelp {
        name: "quit",
        aliases: &["q", "exit"],
        brief: "Exit the REPL",
        usage: "/quit",
    },
];

/// Tab completion for slash commands.
struct CommandCompleter;

impl CommandCompleter {
    const COMMANDS: &'static [&'static str] = &[
        "/add", "/agents", "/clear", "/dup", "/help", "/prefs", "/quit", "/remove", "/reset",
        "/set", "/update",
    ];
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        if !line.starts_with('/') {
            return Ok((0, vec![]));
        }

        let prefix = &line[..pos];
        let matches: Vec<Pair> = Self::COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Slash commands available in the REPL.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    /// List agents
    Agents,
    /// Append an agent
    Add { role: String, instructions: String },
    /// Change one agent field
    Update {
        id: String,
        field: String,
        value: String,
    },
    /// Remove an agent
    Remove(String),
    /// Duplicate an agent
    Duplicate(String),
    /// Show preferences
    Prefs,
    /// Set a preference flag
    Set { name: String, value: bool },
    /// Drop the conversation thread
    Clear,
    /// Delete stored agents and preferences
    Reset { confirmed: bool },
    /// Show help (optionally for a specific command)
    Help(Option<String>),
    /// Quit the REPL
    Quit,
    /// Unknown or malformed command
    Unknown(String),
    /// Plain text, run through the pipeline
    Text(String),
}

impl ReplCommand {
    /// Parses input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        let Some(stripped) = input.strip_prefix('/') else {
            return ReplCommand::Text(input.to_string());
        };

        let parts: Vec<&str> = stripped.splitn(2, ' ').collect();
        let cmd = parts[0].to_lowercase();
        let arg = parts
            .get(1)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match cmd.as_str() {
            "agents" | "ls" => ReplCommand::Agents,
            "add" => Self::parse_add(arg),
            "update" | "set-agent" => Self::parse_update(arg),
            "remove" | "rm" => arg
                .map(ReplCommand::Remove)
                .unwrap_or(ReplCommand::Unknown("remove requires an agent id".to_string())),
            "dup" | "duplicate" => arg
                .map(ReplCommand::Duplicate)
                .unwrap_or(ReplCommand::Unknown("dup requires an agent id".to_string())),
            "prefs" => ReplCommand::Prefs,
            "set" => Self::parse_set(arg),
            "clear" => ReplCommand::Clear,
            "reset" => ReplCommand::Reset {
                confirmed: arg.as_deref() == Some("yes"),
            },
            "help" | "h" | "?" => ReplCommand::Help(arg),
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(cmd),
        }
    }

    fn parse_add(arg: Option<String>) -> Self {
        let usage = || ReplCommand::Unknown("usage: /add <role> | <instructions>".to_string());
        let Some(arg) = arg else {
            return usage();
        };
        match arg.split_once('|') {
            Some((role, instructions)) if !role.trim().is_empty() => ReplCommand::Add {
                role: role.trim().to_string(),
                instructions: instructions.trim().to_string(),
            },
            _ => usage(),
        }
    }

    fn parse_update(arg: Option<String>) -> Self {
        let arg = arg.unwrap_or_default();
        let parts: Vec<&str> = arg.splitn(3, ' ').collect();
        match parts.as_slice() {
            [id, field, value] => ReplCommand::Update {
                id: id.to_string(),
                field: field.to_string(),
                value: value.trim().to_string(),
            },
            _ => ReplCommand::Unknown("usage: /update <id> <field> <value>".to_string()),
        }
    }

    fn parse_set(arg: Option<String>) -> Self {
        let arg = arg.unwrap_or_default();
        let parts: Vec<&str> = arg.split_whitespace().collect();
        match parts.as_slice() {
            [name, value] => match parse_switch(value) {
                Ok(value) => ReplCommand::Set {
                    name: name.to_string(),
                    value,
                },
                Err(e) => ReplCommand::Unknown(e),
            },
            _ => ReplCommand::Unknown("usage: /set <preference> <on|off>".to_string()),
        }
    }
}

/// REPL state
pub struct Repl {
    editor: Editor<CommandCompleter, DefaultHistory>,
    session: Session,
    history_path: Option<PathBuf>,
    runtime: tokio::runtime::Runtime,
}

impl Repl {
    /// Creates a new REPL instance over an open session.
    pub fn new(session: Session, state_dir: &Path) -> ReplResult<Self> {
        let config = rustyline::Config::builder()
            .completion_type(rustyline::CompletionType::List)
            .build();
        let mut editor = Editor::with_config(config)?;
        editor.set_helper(Some(CommandCompleter));

        let runtime = tokio::runtime::Runtime::new()?;

        let history_path = state_dir.join("repl_history.txt");
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            editor,
            session,
            history_path: Some(history_path),
            runtime,
        })
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> ReplResult<()> {
        println!("WorkIron REPL v{}", env!("CARGO_PKG_VERSION"));
        println!("Type a question to run the agent chain, /help for commands, /quit to exit");
        let configured = self
            .session
            .list_agents()
            .iter()
            .filter(|a| a.is_configured())
            .count();
        println!("{} configured agent(s)", configured);
        println!();

        loop {
            match self.editor.readline("workiron> ") {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.editor.add_history_entry(&line)?;

                    let cmd = ReplCommand::parse(&line);
                    debug!(?cmd, "Parsed command");

                    match self.handle_command(cmd) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {}", e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("^D");
                    break;
                }
                Err(err) => {
                    eprintln!("Error: {:?}", err);
                    break;
                }
            }
        }

        if let Some(path) = &self.history_path {
            let _ = self.editor.save_history(path);
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Handles a REPL command. Returns Ok(true) if should quit.
    fn handle_command(&mut self, cmd: ReplCommand) -> ReplResult<bool> {
        match cmd {
            ReplCommand::Agents => print_agents(&self.session.list_agents(), OutputFormat::Table)?,
            ReplCommand::Add { role, instructions } => {
                let agent = self
                    .session
                    .add_agent(AgentConfig::new(role, instructions))?;
                println!("Added agent '{}' ({})", agent.label(), agent.id);
            }
            ReplCommand::Update { id, field, value } => {
                let field = AgentField::parse(&field, &value)?;
                match self.session.update_agent(&id, field)? {
                    Some(agent) => println!("Updated agent '{}'", agent.label()),
                    None => println!("Agent not found: {}", id),
                }
            }
            ReplCommand::Remove(id) => {
                if self.session.remove_agent(&id)? {
                    println!("Removed agent {}", id);
                } else {
                    println!("Agent not found: {}", id);
                }
            }
            ReplCommand::Duplicate(id) => match self.session.duplicate_agent(&id)? {
                Some(copy) => println!("Duplicated agent '{}' as {}", copy.label(), copy.id),
                None => println!("Agent not found: {}", id),
            },
            ReplCommand::Prefs => print_preferences(&self.session.preferences()),
            ReplCommand::Set { name, value } => {
                let flag: PreferenceFlag = name.parse()?;
                self.session.set_preference(flag, value)?;
                println!("{} = {}", flag, if value { "on" } else { "off" });
            }
            ReplCommand::Clear => {
                self.runtime
                    .block_on(self.session.clear_all_conversation_state())?;
                println!("Conversation cleared.");
            }
            ReplCommand::Reset { confirmed } => {
                if confirmed {
                    self.session.reset_stored_state()?;
                    println!("Stored agents and preferences deleted.");
                } else {
                    println!("This deletes all agents and preferences. Type /reset yes to confirm.");
                }
            }
            ReplCommand::Help(topic) => print_help(topic.as_deref()),
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Unknown(msg) => {
                println!("{}. Type /help for available commands.", msg);
            }
            ReplCommand::Text(text) => {
                self.runtime
                    .block_on(commands::run_query(&self.session, &text))?;
            }
        }
        Ok(false)
    }
}

/// Finds help for a command by name or alias.
fn find_command_help(name: &str) -> Option<&'static CommandHelp> {
    let name_lower = name.trim_start_matches('/').to_lowercase();
    COMMAND_HELP
        .iter()
        .find(|h| h.name == name_lower || h.aliases.contains(&name_lower.as_str()))
}

/// Prints help information.
fn print_help(topic: Option<&str>) {
    match topic {
        Some(cmd) => match find_command_help(cmd) {
            Some(help) => {
                println!("/{} - {}", help.name, help.brief);
                if !help.aliases.is_empty() {
                    println!("Aliases: {}", help.aliases.join(", "));
                }
                println!();
                println!("Usage:");
                for line in help.usage.lines() {
                    println!("  {}", line);
                }
            }
            None => println!(
                "Unknown command: {}. Type /help for available commands.",
                cmd
            ),
        },
        None => {
            println!("WorkIron REPL - chain AI agents into one answer");
            println!();
            for help in COMMAND_HELP {
                println!("  {:<44} {}", help.usage.lines().next().unwrap_or(""), help.brief);
            }
            println!();
            println!("Anything not starting with / is sent to the agent chain.");
        }
    }
}
