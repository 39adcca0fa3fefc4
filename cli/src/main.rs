//! Headless CLI for the OpenReelio timeline engine.
//!
//! Drives a project database file directly through
//! `openreelio_core`'s `CommandEngine`, the way an AI agent or a test
//! harness would — there is no GUI here, only the primitives the engine
//! exposes: create clips, run any registered command by name with a
//! JSON parameter bag, undo/redo, and inspect a sequence's clips.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use openreelio_core::core::commands::{CommandEngineConfig, ExecutorRegistry, StackKey};
use openreelio_core::core::commands::bag::CommandEnvelope;
use openreelio_core::core::store::TimelineStore;
use openreelio_core::core::time_input::parse_time_input;
use openreelio_core::core::CoreResult;
use openreelio_core::OpenProject;

#[derive(Parser)]
#[command(name = "openreelio-cli", about = "Headless OpenReelio timeline engine CLI")]
struct Cli {
    /// Path to the project's SQLite database file.
    #[arg(long, global = true)]
    project: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a new project database and its root project row.
    Init {
        #[arg(long)]
        name: String,
    },
    /// Executes a named command against a sequence with a JSON parameter bag.
    Exec {
        /// Registered command type, e.g. `create_clip`, `ripple_edit`.
        command_type: String,
        /// JSON object of command parameters (must include `sequence_id`
        /// where the command requires one).
        params: String,
    },
    /// Undoes the most recent command on a sequence's stack.
    Undo {
        #[arg(long)]
        sequence_id: Option<String>,
    },
    /// Redoes the most recently undone command on a sequence's stack.
    Redo {
        #[arg(long)]
        sequence_id: Option<String>,
    },
    /// Lists the clips currently on a track, in timeline order.
    ListClips {
        #[arg(long)]
        track_id: String,
    },
    /// Jumps the active branch to an arbitrary sequence number, undoing
    /// or redoing through the lowest common ancestor as needed.
    JumpTo {
        #[arg(long)]
        sequence_id: Option<String>,
        target_sequence_number: i64,
    },
    /// Parses a free-form time string against a frame rate and prints
    /// the resulting frame count.
    ParseTime {
        input: String,
        #[arg(long, default_value_t = 30)]
        rate_num: u32,
        #[arg(long, default_value_t = 1)]
        rate_den: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init { name } => init(&cli.project, &name),
        Command::Exec { command_type, params } => exec(&cli.project, &command_type, &params),
        Command::Undo { sequence_id } => undo(&cli.project, sequence_id),
        Command::Redo { sequence_id } => redo(&cli.project, sequence_id),
        Command::ListClips { track_id } => list_clips(&cli.project, &track_id),
        Command::JumpTo { sequence_id, target_sequence_number } => {
            jump_to(&cli.project, sequence_id, target_sequence_number)
        }
        Command::ParseTime { input, rate_num, rate_den } => parse_time(&input, rate_num, rate_den),
    }
}

fn stack_key(sequence_id: Option<String>) -> StackKey {
    match sequence_id {
        Some(id) => StackKey::Sequence(id),
        None => StackKey::Global,
    }
}

fn init(project_path: &PathBuf, name: &str) -> Result<()> {
    let mut open = OpenProject::open(project_path).context("opening project database")?;
    let project = open.create_project(name)?;
    println!("{}", serde_json::to_string_pretty(&project)?);
    Ok(())
}

fn exec(project_path: &PathBuf, command_type: &str, params: &str) -> Result<()> {
    let mut open = OpenProject::open(project_path).context("opening project database")?;
    let parameters: serde_json::Value = serde_json::from_str(params).context("parsing --params as JSON")?;
    let project_id = parameters
        .get("project_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let env = CommandEnvelope::new(command_type.to_string(), project_id, parameters);
    let result = open.engine.execute(env)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn undo(project_path: &PathBuf, sequence_id: Option<String>) -> Result<()> {
    let mut open = OpenProject::open(project_path).context("opening project database")?;
    let row = open.engine.undo(&stack_key(sequence_id))?;
    println!("undid {} (command_type={})", row.sequence_number, row.command_type);
    Ok(())
}

fn redo(project_path: &PathBuf, sequence_id: Option<String>) -> Result<()> {
    let mut open = OpenProject::open(project_path).context("opening project database")?;
    let row = open.engine.redo(&stack_key(sequence_id))?;
    println!("redid {} (command_type={})", row.sequence_number, row.command_type);
    Ok(())
}

fn list_clips(project_path: &PathBuf, track_id: &str) -> Result<()> {
    let open = OpenProject::open(project_path).context("opening project database")?;
    let clips = TimelineStore::list_clips_for_track(open.engine.store().connection(), &track_id.to_string())?;
    println!("{}", serde_json::to_string_pretty(&clips)?);
    Ok(())
}

fn jump_to(project_path: &PathBuf, sequence_id: Option<String>, target_sequence_number: i64) -> Result<()> {
    let mut open = OpenProject::open(project_path).context("opening project database")?;
    open.engine.jump_to(&stack_key(sequence_id), target_sequence_number)?;
    println!("jumped to {target_sequence_number}");
    Ok(())
}

fn parse_time(input: &str, rate_num: u32, rate_den: u32) -> Result<()> {
    let time = parse_time_input(input, rate_num, rate_den, None)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    println!("{}", time.frames);
    Ok(())
}

#[allow(dead_code)]
fn ensure_registry_loaded() -> CoreResult<ExecutorRegistry> {
    // Exercised indirectly through `OpenProject::open`; kept as a direct
    // entry point for future subcommands that need a bare registry
    // (e.g. a `list-commands` introspection command) without opening a
    // project.
    let mut registry = ExecutorRegistry::new();
    openreelio_core::core::commands::register_standard_library(&mut registry);
    Ok(registry)
}
