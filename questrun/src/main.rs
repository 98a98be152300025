//! questrun: multi-phase team objective engine.
//!
//! Every command operates on a session root (`--root`, default `.`) holding
//! `config.toml`, the content directory and `state/run_state.json`.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;
use uuid::Uuid;

use questrun::core::types::{FIRST_PHASE, LAST_PHASE, Phase, TeamIndex};
use questrun::exit_codes;
use questrun::io::init::{InitOptions, init_session};
use questrun::io::render::{render_objectives, render_status};
use questrun::logging;
use questrun::session::{LifecycleError, Session};

#[derive(Parser)]
#[command(name = "questrun", version, about = "Multi-phase team objective engine")]
struct Cli {
    /// Session root directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `config.toml`, the state directory and empty content directories.
    Init {
        /// Overwrite an existing `config.toml`.
        #[arg(short, long)]
        force: bool,
    },
    /// Load and validate the content directory and the run state.
    Check,
    /// Generate objectives for a new run and start its first episode.
    Start {
        /// Fix the run id (and with it the generated objectives).
        #[arg(long)]
        run_id: Option<Uuid>,
    },
    /// Print the session summary.
    Status,
    /// List generated objectives (requires `debug = true`).
    Objectives {
        #[arg(long, value_parser = clap::value_parser!(u8).range(i64::from(FIRST_PHASE)..=i64::from(LAST_PHASE)))]
        phase: Option<Phase>,
    },
    /// Start or end an episode of the active run.
    Episode {
        #[command(subcommand)]
        action: EpisodeCommand,
    },
    /// Discard the run. Team configuration is kept.
    Reset {
        /// Required; reset cannot be undone.
        #[arg(long)]
        confirm: bool,
    },
    /// Configure teams and player assignments.
    Teams {
        #[command(subcommand)]
        action: TeamsCommand,
    },
}

#[derive(Subcommand)]
enum EpisodeCommand {
    /// Resume a paused run.
    Start,
    /// Pause the running run.
    End,
}

#[derive(Subcommand)]
enum TeamsCommand {
    /// Enable `count` teams and clear all assignments.
    Set { count: u8 },
    /// Put a player on a team.
    Assign { player: Uuid, team: TeamIndex },
    /// Remove a player's assignment.
    Unassign { player: Uuid },
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

/// Refused preconditions get their own code; everything else is invalid input.
fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<LifecycleError>().is_some() {
        exit_codes::REFUSED
    } else {
        exit_codes::INVALID
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = cli.root.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Check => cmd_check(root),
        Command::Start { run_id } => cmd_start(root, run_id),
        Command::Status => cmd_status(root),
        Command::Objectives { phase } => cmd_objectives(root, phase),
        Command::Episode { action } => cmd_episode(root, action),
        Command::Reset { confirm } => cmd_reset(root, confirm),
        Command::Teams { action } => cmd_teams(root, action),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<()> {
    let paths = init_session(root, &InitOptions { force })?;
    println!("initialized {}", paths.root.display());
    Ok(())
}

fn cmd_check(root: &Path) -> Result<()> {
    let mut session = Session::open(root)?;
    let summary = session.reload_content()?;
    println!(
        "content ok: {} item pools, {} constraints, {} templates, {} quantity rules, {} generator rules",
        summary.item_pools,
        summary.constraints,
        summary.objective_templates,
        summary.quantity_rules,
        summary.generator_rules
    );
    for violation in session.violations()? {
        println!("warning: [{}] {}", violation.rule_id, violation.message);
    }
    Ok(())
}

fn cmd_start(root: &Path, run_id: Option<Uuid>) -> Result<()> {
    let mut session = Session::open(root)?;
    let started = session.begin_run(run_id)?;
    println!(
        "run {} started: {} objectives",
        started.run_id, started.objectives
    );
    for violation in &started.violations {
        println!("warning: [{}] {}", violation.rule_id, violation.message);
    }
    Ok(())
}

fn cmd_status(root: &Path) -> Result<()> {
    let mut session = Session::open(root)?;
    let (summary, violations) = match session.violations() {
        Ok(violations) => (Some(session.content()?.summary()), violations),
        Err(err) => {
            warn!("content unavailable: {:#}", err);
            (None, Vec::new())
        }
    };
    print!(
        "{}",
        render_status(session.current_state(), summary, &violations)?
    );
    Ok(())
}

fn cmd_objectives(root: &Path, phase: Option<Phase>) -> Result<()> {
    let session = Session::open(root)?;
    let objectives = session.debug_objectives(phase)?;
    print!("{}", render_objectives(&objectives)?);
    Ok(())
}

fn cmd_episode(root: &Path, action: EpisodeCommand) -> Result<()> {
    let mut session = Session::open(root)?;
    match action {
        EpisodeCommand::Start => {
            let episode = session.start_episode()?;
            println!("episode {episode} started");
        }
        EpisodeCommand::End => {
            session.end_episode()?;
            println!("episode {} ended", session.current_state().episode_number);
        }
    }
    Ok(())
}

fn cmd_reset(root: &Path, confirm: bool) -> Result<()> {
    if !confirm {
        bail!("reset discards the current run; pass --confirm");
    }
    let mut session = Session::open(root)?;
    session.reset()?;
    println!("run reset");
    Ok(())
}

fn cmd_teams(root: &Path, action: TeamsCommand) -> Result<()> {
    let mut session = Session::open(root)?;
    match action {
        TeamsCommand::Set { count } => {
            session.configure_teams(count)?;
            println!("{count} teams configured");
        }
        TeamsCommand::Assign { player, team } => {
            session.assign_player(player, team)?;
            println!("{player} assigned to team {team}");
        }
        TeamsCommand::Unassign { player } => {
            session.unassign_player(player)?;
            println!("{player} unassigned");
        }
    }
    Ok(())
}
