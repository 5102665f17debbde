//! Headless Match Runner
//!
//! Loads a map and a directory of agent scripts, plays one match to the end
//! and prints the match record.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use skirmish::agent::DirectoryAgentSource;
use skirmish::battle::{CollisionGrid, FrameRecorder, MatchRequest, MatchSetup};
use skirmish::core::{ArenaError, MatchConfig, Result};

/// Headless Match Runner - pit scripted agents against each other
#[derive(Parser, Debug)]
#[command(name = "match_runner")]
#[command(about = "Run one arena match between scripted agents and print the record")]
struct Args {
    /// Map file (text layout, or a .json map document)
    #[arg(long, required_unless_present = "list")]
    map: Option<PathBuf>,

    /// Directory holding `<agent_id>.rhai` scripts
    #[arg(long, default_value = "data/agents")]
    agents_dir: PathBuf,

    /// Agent ids, one team each (at least two)
    #[arg(num_args = 0..)]
    agents: Vec<String>,

    /// List the agents found in the agents directory and exit
    #[arg(long)]
    list: bool,

    /// Units per team (1-10, anything else falls back to 5)
    #[arg(long)]
    units: Option<i64>,

    /// Seed for unit placement; overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Match config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format: json or text
    #[arg(long, default_value = "text")]
    format: String,

    /// Write a JSON replay of the recorded frames to this path
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Keep one replay frame every N ticks
    #[arg(long, default_value_t = 1)]
    replay_every: u64,

    /// Print every team's agent log after the record
    #[arg(long, short = 'v')]
    verbose: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("skirmish=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Match failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let source = DirectoryAgentSource::new(&args.agents_dir);
    if args.list {
        let agents = source
            .list_agents()
            .map_err(|e| ArenaError::InvalidRequest(e.to_string()))?;
        for agent in agents {
            println!("{}", agent);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => MatchConfig::load(path)?,
        None => MatchConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let map = args
        .map
        .as_ref()
        .ok_or_else(|| ArenaError::InvalidRequest("no map given".into()))?;
    let grid = CollisionGrid::load(map)?;
    tracing::info!(
        map = %grid.name,
        width = grid.width,
        height = grid.height,
        "Map loaded"
    );

    let request = MatchRequest::new(args.agents.clone(), args.units);
    let mut driver = MatchSetup::from_request(&request, grid, config)?.launch(&source)?;

    let mut recorder = FrameRecorder::every(args.replay_every);
    driver.run(&mut recorder)?;

    if let Some(path) = &args.replay {
        recorder.write_json(path)?;
        tracing::info!(path = %path.display(), frames = recorder.frames().len(), "Replay written");
    }

    let Some(record) = driver.record() else {
        return Ok(());
    };

    match args.format.as_str() {
        "json" => println!("{}", record.to_json_pretty()?),
        _ => print!("{}", record.summary()),
    }

    if args.verbose {
        for team in &record.teams {
            eprintln!("=== {} ({}) ===", team.name, team.agent_id);
            eprint!("{}", team.log.to_text());
        }
    }

    Ok(())
}
