//! # Frontline Simulation Core
//!
//! Deterministic territorial-conquest engine on a 2D tile grid.
//!
//! Players issue attack commands against each other or against unclaimed
//! land; the engine transfers ownership of border tiles tick by tick
//! according to troop strength, terrain, randomness and an optional
//! player-chosen direction. It is designed for lockstep multiplayer and
//! replay determinism.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │  Players /  │────▶│ PlayerCommands │────▶│ Simulation::step │
//! │  bots       │     │ (intents)      │     │ (one tick)       │
//! └─────────────┘     └────────────────┘     └────────┬─────────┘
//!                                                     │
//!                     ┌──────────────┐       ┌────────▼─────────┐
//!                     │  EventSinks  │◀──────│  TickScheduler   │
//!                     │  (side fx)   │       │  attacks, sweeps │
//!                     └──────────────┘       └────────┬─────────┘
//!                                                     │
//!                                            ┌────────▼─────────┐
//!                                            │  Game / TileGrid │
//!                                            │ (lockstep state) │
//!                                            └──────────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Game`] | Complete lockstep state (grid, players, attacks) |
//! | [`Command`] | Player actions (attack, retreat, alliance) |
//! | [`Simulation`] | Facade: commands in, one tick forward |
//! | [`ConquestRules`] | Trait for combat tuning, injectable in tests |
//! | [`EventSink`] | Trait for observing events (never affects state) |
//!
//! ## Determinism
//!
//! Two replicas fed the same seed and the same command stream must agree
//! on every tick. Everything that feeds state is ordered: executions run
//! in creation order, attacks live in a [`std::collections::BTreeMap`],
//! border scans sort before drawing randomness, and every random draw
//! comes from a per-execution [`rand::rngs::StdRng`] salted with the
//! execution id. [`Game::checksum`] digests the whole lockstep state so
//! replicas can compare notes cheaply.

pub mod config;
pub mod distance;
pub mod executions;
pub mod grid;
pub mod input;
pub mod metrics;
pub mod observer;
pub mod rules;
pub mod scheduler;
pub mod sim;
pub mod state;
pub mod testing;

#[cfg(test)]
mod conquest_tests;

pub use config::SimConfig;
pub use executions::{AttackExecution, AttackOrder, ClusterSweep, Execution, ExecutionId};
pub use grid::{Owner, PlayerId, Terrain, TileGrid, TileId};
pub use input::{Command, PlayerCommands};
pub use metrics::SimMetrics;
pub use observer::{EventRegistry, EventSink, GameEvent, JsonlEventSink, MemoryEventSink};
pub use rules::{AttackOutcome, ConquestRules, DefaultRules};
pub use sim::Simulation;
pub use state::{AttackId, AttackState, Game, Player, Tick};
