use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use frontsim_core::{
    Game, JsonlEventSink, PlayerCommands, PlayerId, SimConfig, Simulation, Tick,
};
use rayon::prelude::*;

use frontsim::bot::GreedyBot;
use frontsim::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to an ASCII scenario map; omit for a generated map
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Generated map width
    #[arg(long, default_value_t = 64)]
    width: u32,

    /// Generated map height
    #[arg(long, default_value_t = 64)]
    height: u32,

    /// Players on a generated map
    #[arg(long, default_value_t = 4)]
    players: u32,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 1000)]
    ticks: u64,

    /// World seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Starting troop pool per player
    #[arg(long, default_value_t = 1000.0)]
    troops: f64,

    /// Troops regenerated per owned tile per tick
    #[arg(long, default_value_t = 0.05)]
    regen: f64,

    /// Write game events as JSON lines to this file
    #[arg(long)]
    events: Option<PathBuf>,

    /// Step two replicas of the same seed and compare checksums every tick
    #[arg(long)]
    verify: bool,

    /// Run this many consecutive seeds in parallel
    #[arg(long)]
    batch: Option<u64>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = std::str::FromStr::from_str(&args.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    log::info!("Starting frontsim...");

    let scenario = match &args.scenario {
        Some(path) => Scenario::from_file(path)?,
        None => Scenario::generated(args.width, args.height, args.players)?,
    };
    log::info!(
        "Map {}x{}, {} players",
        scenario.width(),
        scenario.height(),
        scenario.num_players()
    );

    if args.verify {
        run_verify(&args, &scenario)
    } else if let Some(seeds) = args.batch {
        run_batch(&args, &scenario, seeds)
    } else {
        run_once(&args, &scenario)
    }
}

fn run_once(args: &Args, scenario: &Scenario) -> Result<()> {
    let mut sim = scenario.spawn(SimConfig::default(), args.seed, args.troops);
    if let Some(path) = &args.events {
        let file = File::create(path)
            .with_context(|| format!("creating event log {}", path.display()))?;
        sim.events
            .register(Box::new(JsonlEventSink::new(BufWriter::new(file))));
    }

    let bots = bots_for(&sim);
    for _ in 0..args.ticks {
        let tick = step_with(&mut sim, &bots, args.regen);
        if tick % 100 == 0 {
            let alive = sim.game.players().filter(|p| p.is_alive()).count();
            log::info!(
                "Tick {} | {} alive | {} attacks | {:.2} ms/tick",
                tick,
                alive,
                sim.game.num_attacks(),
                sim.metrics.tick_avg_ms()
            );
        }
    }

    let summary = RunSummary::of(args.seed, &sim);
    log::info!(
        "Finished at tick {} with {} players alive",
        summary.ticks,
        summary.alive
    );
    println!("{}", summary.to_json());
    Ok(())
}

/// Step two replicas of the same seed side by side. Each replica runs its
/// own bots, so command generation is under test along with the engine.
fn run_verify(args: &Args, scenario: &Scenario) -> Result<()> {
    log::info!(
        "Verifying determinism: seed {}, {} ticks",
        args.seed,
        args.ticks
    );
    let mut left = scenario.spawn(SimConfig::default(), args.seed, args.troops);
    let mut right = scenario.spawn(SimConfig::default(), args.seed, args.troops);
    let left_bots = bots_for(&left);
    let right_bots = bots_for(&right);

    for _ in 0..args.ticks {
        let tick = step_with(&mut left, &left_bots, args.regen);
        step_with(&mut right, &right_bots, args.regen);
        let (a, b) = (left.checksum(), right.checksum());
        if a != b {
            bail!("replicas diverged at tick {tick}: {a:#018x} != {b:#018x}");
        }
    }

    log::info!("Replicas agreed for {} ticks", args.ticks);
    println!("{}", RunSummary::of(args.seed, &left).to_json());
    Ok(())
}

fn run_batch(args: &Args, scenario: &Scenario, seeds: u64) -> Result<()> {
    if args.events.is_some() {
        log::warn!("--events is ignored in batch mode");
    }
    log::info!(
        "Running {} seeds starting at {} across {} threads",
        seeds,
        args.seed,
        rayon::current_num_threads()
    );

    let summaries: Vec<RunSummary> = (0..seeds)
        .into_par_iter()
        .map(|offset| {
            let seed = args.seed + offset;
            let mut sim = scenario.spawn(SimConfig::default(), seed, args.troops);
            let bots = bots_for(&sim);
            for _ in 0..args.ticks {
                step_with(&mut sim, &bots, args.regen);
            }
            RunSummary::of(seed, &sim)
        })
        .collect();

    for summary in &summaries {
        println!("{}", summary.to_json());
    }
    Ok(())
}

fn bots_for(sim: &Simulation) -> Vec<GreedyBot> {
    sim.game
        .players()
        .map(|player| GreedyBot::new(player.id()))
        .collect()
}

/// One tick: collect bot commands, step, then apply per-tile regen.
fn step_with(sim: &mut Simulation, bots: &[GreedyBot], regen: f64) -> Tick {
    let inputs: Vec<PlayerCommands> = bots.iter().filter_map(|bot| bot.act(sim)).collect();
    let tick = sim.step(&inputs);
    regenerate(&mut sim.game, regen);
    tick
}

/// Troop growth lives outside the engine so the core stays a pure
/// function of commands.
fn regenerate(game: &mut Game, per_tile: f64) {
    if per_tile <= 0.0 {
        return;
    }
    let alive: Vec<PlayerId> = game
        .players()
        .filter(|p| p.is_alive())
        .map(|p| p.id())
        .collect();
    for id in alive {
        let gain = f64::from(game.player(id).num_tiles()) * per_tile;
        game.player_mut(id).add_troops(gain);
    }
}

struct RunSummary {
    seed: u64,
    ticks: Tick,
    checksum: u64,
    alive: usize,
    winner: Option<String>,
}

impl RunSummary {
    fn of(seed: u64, sim: &Simulation) -> Self {
        let alive: Vec<_> = sim.game.players().filter(|p| p.is_alive()).collect();
        let winner = match alive.as_slice() {
            [sole] => Some(sole.name().to_string()),
            _ => None,
        };
        Self {
            seed,
            ticks: sim.game.tick(),
            checksum: sim.checksum(),
            alive: alive.len(),
            winner,
        }
    }

    fn to_json(&self) -> String {
        serde_json::json!({
            "seed": self.seed,
            "ticks": self.ticks,
            "checksum": format!("{:#018x}", self.checksum),
            "alive": self.alive,
            "winner": self.winner,
        })
        .to_string()
    }
}
