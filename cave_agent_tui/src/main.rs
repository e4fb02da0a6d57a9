mod view;

use std::{
    fs::{self, OpenOptions},
    io::{BufReader, BufWriter},
    net::TcpStream,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use cave_agent_core::{
    agent::{Agent, PlanningAgent, RandomWalker},
    scenario::parse_scenario,
    session::{NoopObserver, SessionConfig, run_session},
};
use clap::{Parser, Subcommand, ValueEnum};
use rand::{SeedableRng, rngs::StdRng};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::view::{TerminalView, describe, map_lines, plain};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to a game server and play until it closes the connection
    Play(PlayArgs),
    /// Decide a single move for a map file and print it
    Plan(PlanArgs),
}

#[derive(clap::Args, Debug)]
struct PlayArgs {
    /// Game server host
    #[arg(long, env = "CAVE_AGENT_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Game server port
    #[arg(long, env = "CAVE_AGENT_PORT", default_value_t = 8080)]
    port: u16,
    /// Authorization token
    #[arg(long, env = "CAVE_AGENT_TOKEN")]
    token: String,
    /// Seed for the agent's random choices
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = Strategy::Planning)]
    strategy: Strategy,
    /// Show the cave in a live terminal view
    #[arg(long)]
    view: bool,
    /// Where logs go while the live view owns the terminal
    #[arg(long, value_name = "LOG_FILE", default_value = "cave-agent.log")]
    log_file: PathBuf,
}

#[derive(clap::Args, Debug)]
struct PlanArgs {
    /// Map file to load
    #[arg(short, long, value_name = "MAP_FILE", default_value = "maps/cave01.txt")]
    map: PathBuf,
    /// Seed for the agent's random choices
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = Strategy::Planning)]
    strategy: Strategy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Head for the nearest gold along the cheapest safe path
    Planning,
    /// Wander in a random safe direction
    Random,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Play(args) => play(args),
        Command::Plan(args) => plan(args),
    }
}

fn build_agent(strategy: Strategy, seed: Option<u64>) -> Box<dyn Agent> {
    let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    match strategy {
        Strategy::Planning => Box::new(PlanningAgent::new(rng)),
        Strategy::Random => Box::new(RandomWalker::new(rng)),
    }
}

fn play(args: PlayArgs) -> Result<()> {
    let _guard = init_tracing(args.view.then_some(args.log_file.as_path()))?;

    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .with_context(|| format!("connecting to {}:{}", args.host, args.port))?;
    info!(host = %args.host, port = args.port, "connected to server");
    let reader = BufReader::new(stream.try_clone().context("cloning the connection")?);
    let writer = BufWriter::new(stream);

    let config = SessionConfig { token: args.token };
    let mut agent = build_agent(args.strategy, args.seed);

    let summary = if args.view {
        let mut view = TerminalView::new().context("setting up the terminal")?;
        run_session(reader, writer, &config, agent.as_mut(), &mut view)?
    } else {
        run_session(reader, writer, &config, agent.as_mut(), &mut NoopObserver)?
    };

    info!(
        ticks = summary.state.ticks(),
        commands = summary.commands_sent,
        stopped = summary.stopped,
        "session finished"
    );
    Ok(())
}

fn plan(args: PlanArgs) -> Result<()> {
    let _guard = init_tracing(None)?;

    let text = fs::read_to_string(&args.map)
        .with_context(|| format!("reading map file {}", args.map.display()))?;
    let scenario = parse_scenario(&text)
        .with_context(|| format!("loading map file {}", args.map.display()))?;
    let world = scenario.view()?;

    let mut agent = build_agent(args.strategy, args.seed);
    let decision = agent.decide(&world);

    for line in map_lines(&world, &decision) {
        println!("{}", plain(&line));
    }
    println!("{}", describe(&decision));
    Ok(())
}

/// Logs go to stderr, or to `log_file` when the terminal is taken.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
        return Ok(None);
    };

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .compact()
        .init();
    Ok(Some(guard))
}
