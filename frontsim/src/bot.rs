//! Scripted players for unattended runs.
//!
//! A [`GreedyBot`] expands into open ground while any is adjacent, then
//! turns on the weakest hostile neighbor. Decisions depend only on game
//! state, so two replicas stepping the same game produce the same
//! commands, which is what `--verify` relies on.

use std::collections::BTreeSet;

use frontsim_core::{Command, Game, Owner, PlayerCommands, PlayerId, Simulation};

pub struct GreedyBot {
    player: PlayerId,
    /// Decision cadence in ticks, phase-offset by player id so bots do
    /// not all launch on the same tick.
    cadence: u64,
    /// Share of the troop pool committed per launch.
    commit: f64,
}

impl GreedyBot {
    pub fn new(player: PlayerId) -> Self {
        Self::with_cadence(player, 25)
    }

    pub fn with_cadence(player: PlayerId, cadence: u64) -> Self {
        Self {
            player,
            cadence: cadence.max(1),
            commit: 0.4,
        }
    }

    /// Commands for the upcoming tick, or `None` when sitting this one out.
    pub fn act(&self, sim: &Simulation) -> Option<PlayerCommands> {
        let game = &sim.game;
        if (game.tick() + u64::from(self.player)) % self.cadence != 0 {
            return None;
        }
        let me = game.player(self.player);
        if !me.is_alive() {
            return None;
        }
        // One offensive at a time; the pool is already committed.
        if game
            .attacks()
            .any(|attack| attack.attacker == self.player && !attack.retreating)
        {
            return None;
        }
        let troops = (me.troops() * self.commit).floor();
        if troops < 1.0 {
            return None;
        }

        let target = pick_target(game, self.player)?;
        Some(PlayerCommands {
            player: self.player,
            commands: vec![Command::attack(target, troops)],
        })
    }
}

/// Open ground first; otherwise the weakest adjacent hostile, ties to the
/// lower id. Candidates come from a set, so border iteration order never
/// leaks into the choice.
fn pick_target(game: &Game, player: PlayerId) -> Option<Owner> {
    let mut open_ground = false;
    let mut hostiles: BTreeSet<PlayerId> = BTreeSet::new();

    for &tile in game.player(player).border_tiles() {
        let (neighbors, count) = game.grid().neighbors4(tile);
        for &nb in &neighbors[..count] {
            if !game.grid().is_land(nb) {
                continue;
            }
            match game.owner(nb) {
                Owner::Unclaimed => open_ground = true,
                Owner::Player(other) => {
                    if !game.friendly(player, other) && !game.in_spawn_immunity(other) {
                        hostiles.insert(other);
                    }
                }
            }
        }
    }

    if open_ground {
        return Some(Owner::Unclaimed);
    }
    hostiles
        .into_iter()
        .min_by(|a, b| {
            game.player(*a)
                .troops()
                .total_cmp(&game.player(*b).troops())
                .then(a.cmp(b))
        })
        .map(Owner::Player)
}
