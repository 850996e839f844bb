//! Command handlers for CLI subcommands.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use workiron_agent::{AgentConfig, AgentField, AssistantsClient, CompletionClient};
use workiron_core::Settings;
use workiron_orchestrator::{
    Agent, AgentOutcome, AgentOutput, EventSink, PipelineEvent, PipelineReport, PreferenceFlag,
    Preferences, Session, SessionConfig,
};
use workiron_persistence::FileStore;

use crate::cli::{AgentCommand, Cli, Commands, ForcedVerdict, OutputFormat, PrefsCommand};

/// Result type for command operations.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Resolved settings and storage location shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub store_dir: PathBuf,
    pub settings: Settings,
}

impl Context {
    /// Builds the context from the environment and CLI overrides.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut settings = Settings::from_env()?;
        if let Some(model) = &cli.model {
            settings = settings.with_model(model.clone());
        }
        Ok(Self {
            store_dir: cli.store_dir(),
            settings,
        })
    }

    /// Opens the session. With `online`, a missing API key is an error;
    /// otherwise the session can only edit configuration.
    pub fn open_session(&self, online: bool) -> Result<Session> {
        let client: Arc<dyn CompletionClient> = if online {
            Arc::new(AssistantsClient::from_settings(&self.settings)?)
        } else {
            Arc::new(AssistantsClient::new(
                self.settings.api_key.clone().unwrap_or_default(),
                self.settings.base_url.clone(),
            ))
        };
        let store = Arc::new(FileStore::new(&self.store_dir));
        Ok(Session::open(
            client,
            store,
            SessionConfig::from_settings(&self.settings),
        ))
    }
}

/// Execute a CLI command.
pub fn execute(command: Commands, ctx: &Context) -> Result<()> {
    match command {
        Commands::Agents { action } => cmd_agents(&ctx.open_session(false)?, action),
        Commands::Prefs { action } => cmd_prefs(&ctx.open_session(false)?, action),
        Commands::Run { query, json } => cmd_run(&ctx.open_session(true)?, &query.join(" "), json),
        Commands::Clear { yes } => cmd_clear(&ctx.open_session(false)?, yes),
        Commands::Chat => {
            // Chat is handled separately in main
            Ok(())
        }
    }
}

fn cmd_agents(session: &Session, action: AgentCommand) -> Result<()> {
    match action {
        AgentCommand::List { format } => print_agents(&session.list_agents(), format),
        AgentCommand::Add {
            role,
            instructions,
            name,
            model,
            temperature,
            max_tokens,
        } => {
            let mut config = AgentConfig::new(role, instructions);
            if let Some(name) = name {
                config = config.with_name(name);
            }
            if let Some(model) = model {
                config = config.with_model(model);
            }
            if let Some(temperature) = temperature {
                config = config.with_temperature(temperature);
            }
            if let Some(max_tokens) = max_tokens {
                config = config.with_max_tokens(max_tokens);
            }
            let agent = session.add_agent(config)?;
            info!(agent_id = %agent.id, "agent added");
            println!("Added agent '{}' ({})", agent.label(), agent.id);
            Ok(())
        }
        AgentCommand::Update { id, field, value } => {
            let field = AgentField::parse(&field, &value)?;
            let agent = session
                .update_agent(&id, field)?
                .ok_or_else(|| format!("Agent not found: {}", id))?;
            println!("Updated agent '{}' ({})", agent.label(), agent.id);
            Ok(())
        }
        AgentCommand::Remove { id } => {
            if !session.remove_agent(&id)? {
                return Err(format!("Agent not found: {}", id).into());
            }
            println!("Removed agent {}", id);
            Ok(())
        }
        AgentCommand::Duplicate { id } => {
            let copy = session
                .duplicate_agent(&id)?
                .ok_or_else(|| format!("Agent not found: {}", id))?;
            println!("Duplicated agent '{}' as {}", copy.label(), copy.id);
            Ok(())
        }
    }
}

/// Prints agents in the requested format.
pub fn print_agents(agents: &[Agent], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if agents.is_empty() {
                println!("No agents configured.");
                return Ok(());
            }
            println!(
                "{:<5}  {:<36}  {:<20}  {:<5}  {:<6}  MODEL",
                "ORDER", "ID", "AGENT", "TEMP", "TOKENS"
            );
            println!("{}", "-".repeat(92));
            for agent in agents {
                let label = if agent.is_configured() {
                    truncate(agent.label(), 20)
                } else {
                    "(unconfigured)".to_string()
                };
                println!(
                    "{:<5}  {:<36}  {:<20}  {:<5.2}  {:<6}  {}",
                    agent.order, agent.id, label, agent.temperature, agent.max_tokens, agent.model
                );
            }
            println!("\n{} agent(s)", agents.len());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(agents)?);
        }
        OutputFormat::Brief => {
            for agent in agents {
                println!("{}\t{}", agent.id, agent.label());
            }
        }
    }
    Ok(())
}

fn cmd_prefs(session: &Session, action: PrefsCommand) -> Result<()> {
    match action {
        PrefsCommand::Show => print_preferences(&session.preferences()),
        PrefsCommand::Set { name, value } => {
            let flag: PreferenceFlag = name.parse()?;
            session.set_preference(flag, value)?;
            println!("{} = {}", flag, on_off(value));
        }
        PrefsCommand::Force { verdict, pattern } => {
            let mut overrides = session.preferences().classifier_overrides;
            match verdict {
                ForcedVerdict::Simple => overrides.force_simple.push(pattern.clone()),
                ForcedVerdict::Complex => overrides.force_complex.push(pattern.clone()),
            }
            session.set_classifier_overrides(overrides)?;
            println!("Queries matching /{}/ are now {:?}", pattern, verdict);
        }
        PrefsCommand::ClearOverrides => {
            session.set_classifier_overrides(Default::default())?;
            println!("Classifier overrides cleared");
        }
    }
    Ok(())
}

/// Prints preferences.
pub fn print_preferences(preferences: &Preferences) {
    for flag in PreferenceFlag::ALL {
        println!("{:<20} {}", flag.to_string(), on_off(preferences.get(flag)));
    }
    let overrides = &preferences.classifier_overrides;
    if !overrides.is_empty() {
        println!();
        for pattern in &overrides.force_simple {
            println!("force simple:  /{}/", pattern);
        }
        for pattern in &overrides.force_complex {
            println!("force complex: /{}/", pattern);
        }
    }
}

fn cmd_run(session: &Session, query: &str, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    if json {
        let report = runtime.block_on(session.run_pipeline(query, &EventSink::discard()))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        runtime.block_on(run_query(session, query))?;
    }
    Ok(())
}

fn cmd_clear(session: &Session, confirmed: bool) -> Result<()> {
    if !confirmed {
        return Err("This deletes all agents and preferences; re-run with --yes".into());
    }
    session.reset_stored_state()?;
    println!("Stored agents and preferences deleted.");
    Ok(())
}

/// Runs a query, printing results as they arrive.
pub async fn run_query(session: &Session, query: &str) -> Result<PipelineReport> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let report = {
        let sink = EventSink::new(tx);
        session.run_pipeline(query, &sink).await
    };
    printer.await?;

    let report = report?;
    if report.agents.is_empty() {
        println!("No configured agents. Add one with `workiron agents add <role> <instructions>`.");
    }
    Ok(report)
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Thinking { .. } => {
            print!("Thinking...");
            let _ = io::stdout().flush();
        }
        PipelineEvent::Output {
            output,
            replaces_placeholder,
        } => {
            if *replaces_placeholder {
                // Clear "Thinking..." line
                print!("\r            \r");
            }
            println!("{}\n", render_output(output));
        }
    }
}

/// Formats one result entry for the terminal.
pub fn render_output(output: &AgentOutput) -> String {
    let mut text = match &output.outcome {
        AgentOutcome::Completed { content } => format!("[{}]\n{}", output.name, content.trim()),
        AgentOutcome::Failed { kind, message } => {
            format!("[{}] failed ({}): {}", output.name, kind, message)
        }
        AgentOutcome::ProcessingError { message } => format!("[{}] {}", output.name, message),
    };
    if let Some(elapsed) = output.elapsed {
        text.push_str(&format!("\n({:.1}s)", elapsed.as_secs_f64()));
    }
    text
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Truncates a string to the given length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
