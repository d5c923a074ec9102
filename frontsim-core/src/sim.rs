//! The simulation facade: game state, scheduler, rules and observers
//! wired into a lockstep tick loop.

use std::time::Instant;

use tracing::instrument;

use crate::executions::{AttackExecution, AttackOrder, ClusterSweep, Execution, TickContext};
use crate::grid::PlayerId;
use crate::input::{Command, PlayerCommands};
use crate::metrics::SimMetrics;
use crate::observer::EventRegistry;
use crate::rules::ConquestRules;
use crate::scheduler::TickScheduler;
use crate::state::{AttackId, Game, Tick};

/// One running simulation. Feed it commands through [`Simulation::step`];
/// everything else advances on its own.
///
/// `game`, `events` and `metrics` are public on purpose: the state is the
/// product, observers are registered by the embedder, and timings are
/// read out for reporting. The scheduler and rules stay private so the
/// tick discipline cannot be bypassed.
pub struct Simulation {
    pub game: Game,
    scheduler: TickScheduler,
    rules: Box<dyn ConquestRules>,
    pub events: EventRegistry,
    pub metrics: SimMetrics,
}

impl Simulation {
    /// Wrap an already populated game. Every existing player gets their
    /// enclave sweep started.
    pub fn new(game: Game, rules: Box<dyn ConquestRules>) -> Self {
        let mut scheduler = TickScheduler::new();
        for player in game.players() {
            let id = player.id();
            scheduler.spawn(move |_| Execution::ClusterSweep(ClusterSweep::new(id)));
        }
        Self {
            game,
            scheduler,
            rules,
            events: EventRegistry::new(),
            metrics: SimMetrics::default(),
        }
    }

    /// Register a player mid-game and start their enclave sweep.
    pub fn add_player(&mut self, name: impl Into<String>, team: Option<u8>) -> PlayerId {
        let id = self.game.add_player(name, team);
        self.scheduler
            .spawn(move |_| Execution::ClusterSweep(ClusterSweep::new(id)));
        id
    }

    /// Queue one player's commands. Shape problems are logged and the
    /// command dropped; deeper validation happens when the spawned
    /// execution initializes on the next step.
    pub fn submit(&mut self, commands: &PlayerCommands) {
        let player = commands.player;
        if !self.game.contains_player(player) {
            log::warn!("commands from unregistered player {player} dropped");
            return;
        }
        for command in &commands.commands {
            match command {
                Command::LaunchAttack {
                    target,
                    troops,
                    source_tile,
                    click_tile,
                    troops_already_deducted,
                } => {
                    let order = AttackOrder {
                        attacker: player,
                        target: *target,
                        troops: *troops,
                        source_tile: *source_tile,
                        click_tile: *click_tile,
                        troops_already_deducted: *troops_already_deducted,
                    };
                    self.scheduler
                        .spawn(move |id| Execution::Attack(AttackExecution::new(id, order)));
                }
                Command::RetreatAttack { target } => {
                    let ids: Vec<AttackId> = self
                        .game
                        .attacks()
                        .filter(|a| a.attacker == player && a.target == *target && !a.retreating)
                        .map(|a| a.id)
                        .collect();
                    if ids.is_empty() {
                        log::warn!("player {player} has no attack on {target:?} to retreat");
                    }
                    for id in ids {
                        if let Some(attack) = self.game.attack_mut(id) {
                            attack.retreating = true;
                            log::debug!("attack {id} flagged to retreat");
                        }
                    }
                }
                Command::SetAlliance { other, allied } => {
                    if !self.game.contains_player(*other) || *other == player {
                        log::warn!("player {player} alliance change with invalid player {other}");
                        continue;
                    }
                    self.game.set_allied(player, *other, *allied);
                    log::info!(
                        "players {player} and {other} {}",
                        if *allied { "form an alliance" } else { "part ways" }
                    );
                }
            }
        }
    }

    /// Advance one tick: bump the clock, apply this tick's commands, run
    /// every execution, account the time. Returns the new tick number.
    #[instrument(skip_all, name = "sim_step")]
    pub fn step(&mut self, inputs: &[PlayerCommands]) -> Tick {
        let started = Instant::now();
        self.game.advance_tick();
        for commands in inputs {
            self.submit(commands);
        }
        let mut ctx = TickContext {
            game: &mut self.game,
            rules: self.rules.as_ref(),
            events: &self.events,
        };
        let timings = self.scheduler.tick(&mut ctx);

        self.metrics.total_ticks += 1;
        self.metrics.total_time += started.elapsed();
        self.metrics.attack_time += timings.attack;
        self.metrics.cluster_time += timings.cluster;

        let frequency = self.game.config().checksum_frequency;
        if frequency > 0 && self.game.tick() % frequency == 0 {
            log::debug!(
                "tick {} checksum {:#018x}",
                self.game.tick(),
                self.game.checksum()
            );
        }
        self.game.tick()
    }

    /// Digest of the lockstep state, for comparing replicas.
    pub fn checksum(&self) -> u64 {
        self.game.checksum()
    }

    /// Executions still live or staged, sweeps included.
    pub fn active_executions(&self) -> usize {
        self.scheduler.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::grid::Owner;
    use crate::testing::{FixedRules, GameBuilder};

    fn open_config() -> SimConfig {
        SimConfig {
            spawn_immunity_ticks: 0,
            full_conquest_threshold: 0,
            ..Default::default()
        }
    }

    #[test]
    fn every_player_gets_a_sweep() {
        let game = GameBuilder::new(8, 8)
            .with_player("a", 100.0)
            .with_player("b", 100.0)
            .with_rect(1, 0, 0, 4, 8)
            .with_rect(2, 4, 0, 4, 8)
            .build();
        let sim = Simulation::new(game, Box::new(FixedRules::default()));
        assert_eq!(sim.active_executions(), 2);
    }

    #[test]
    fn step_applies_commands_and_advances() {
        let game = GameBuilder::new(8, 1)
            .with_player("a", 100.0)
            .with_rect(1, 0, 0, 1, 1)
            .build();
        let mut sim = Simulation::new(game, Box::new(FixedRules::default()));
        let inputs = vec![PlayerCommands {
            player: 1,
            commands: vec![Command::attack(Owner::Unclaimed, 50.0)],
        }];
        let tick = sim.step(&inputs);
        assert_eq!(tick, 1);
        // Launched and already one tile in.
        assert_eq!(sim.game.player(1).num_tiles(), 2);
        assert_eq!(sim.game.num_attacks(), 1);

        for _ in 0..3 {
            sim.step(&[]);
        }
        assert_eq!(sim.game.player(1).num_tiles(), 5);
    }

    #[test]
    fn retreat_command_flags_every_matching_attack() {
        let game = GameBuilder::new(8, 8)
            .config(open_config())
            .with_player("a", 1000.0)
            .with_player("b", 1000.0)
            .with_rect(1, 0, 0, 4, 8)
            .with_rect(2, 4, 0, 4, 8)
            .build();
        let mut sim = Simulation::new(game, Box::new(FixedRules::default()));
        sim.step(&[PlayerCommands {
            player: 1,
            commands: vec![Command::attack(Owner::Player(2), 100.0)],
        }]);
        assert_eq!(sim.game.num_attacks(), 1);

        sim.submit(&PlayerCommands {
            player: 1,
            commands: vec![Command::RetreatAttack {
                target: Owner::Player(2),
            }],
        });
        assert!(sim.game.attacks().all(|a| a.retreating));
    }

    #[test]
    fn alliance_commands_change_relations() {
        let game = GameBuilder::new(8, 8)
            .with_player("a", 100.0)
            .with_player("b", 100.0)
            .with_rect(1, 0, 0, 4, 8)
            .with_rect(2, 4, 0, 4, 8)
            .build();
        let mut sim = Simulation::new(game, Box::new(FixedRules::default()));
        assert!(!sim.game.friendly(1, 2));
        sim.submit(&PlayerCommands {
            player: 1,
            commands: vec![Command::SetAlliance {
                other: 2,
                allied: true,
            }],
        });
        assert!(sim.game.friendly(1, 2));

        // Self-alliances and unknown ids are shape errors and ignored.
        sim.submit(&PlayerCommands {
            player: 1,
            commands: vec![Command::SetAlliance {
                other: 1,
                allied: true,
            }],
        });
        sim.submit(&PlayerCommands {
            player: 1,
            commands: vec![Command::SetAlliance {
                other: 99,
                allied: true,
            }],
        });
        assert!(sim.game.friendly(1, 2));
    }
}
