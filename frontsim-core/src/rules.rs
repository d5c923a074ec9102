//! Combat tuning behind a trait, so balance can change and tests can pin
//! exact outcomes without touching the conquest loop.

use rand::rngs::StdRng;
use rand::Rng;

use crate::grid::{Owner, PlayerId, TileId};
use crate::state::Game;

/// Result of resolving combat over a single frontier tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackOutcome {
    /// Troops the attack loses taking the tile.
    pub attacker_loss: f64,
    /// Troops removed from the defender's pool.
    pub defender_loss: f64,
    /// Tile-budget units consumed. Must be positive or the conquest loop
    /// would never exhaust its per-tick budget.
    pub tiles_used: f64,
}

/// The tunable half of the conquest engine.
///
/// All randomness is drawn from the per-attack `StdRng` handed in, never
/// from ambient sources, so identical seeds replay identically.
pub trait ConquestRules {
    /// Troops committed when an attack command names no amount.
    fn attack_amount(&self, game: &Game, attacker: PlayerId, target: Owner) -> f64;

    /// Tile budget available to one attack for one tick.
    fn attack_tiles_per_tick(
        &self,
        game: &Game,
        attacker: PlayerId,
        target: Owner,
        troops: f64,
        frontier_len: usize,
        rng: &mut StdRng,
    ) -> f64;

    /// Resolve combat over `tile`.
    fn attack_logic(
        &self,
        game: &Game,
        attacker: PlayerId,
        target: Owner,
        troops: f64,
        tile: TileId,
        rng: &mut StdRng,
    ) -> AttackOutcome;

    /// Time constant, in ticks, of the fade applied to directional bias.
    fn attack_time_decay(&self) -> f64 {
        100.0
    }

    /// Weight of the click-direction term in candidate priorities.
    fn attack_direction_weight(&self) -> f64 {
        5.0
    }

    /// Weight of the click-proximity term. Zero disables it, and with it
    /// the coarse distance field.
    fn attack_magnitude_weight(&self) -> f64 {
        0.0
    }

    /// Length constant, in tiles, of the proximity falloff.
    fn attack_distance_decay(&self) -> f64 {
        10.0
    }

    /// Percentage of retreating troops lost on an ordered retreat.
    /// Forced retreats, where the attack ran out of ground, cost nothing.
    fn retreat_malus_percent(&self) -> f64 {
        25.0
    }
}

/// Production balance values.
pub struct DefaultRules;

impl ConquestRules for DefaultRules {
    fn attack_amount(&self, game: &Game, attacker: PlayerId, target: Owner) -> f64 {
        let own = game.player(attacker).troops();
        match target.player() {
            None => own / 5.0,
            Some(defender) => {
                let theirs = game.player(defender).troops();
                let scale = (own / (theirs + 1.0)).clamp(0.25, 4.0).sqrt();
                own / 5.0 * scale
            }
        }
    }

    fn attack_tiles_per_tick(
        &self,
        game: &Game,
        _attacker: PlayerId,
        target: Owner,
        troops: f64,
        frontier_len: usize,
        rng: &mut StdRng,
    ) -> f64 {
        let base = match target.player() {
            None => frontier_len as f64 / 2.0,
            Some(defender) => {
                let theirs = game.player(defender).troops();
                let ratio = (troops / (theirs + 1.0)).clamp(0.2, 1.5);
                frontier_len as f64 / 2.0 * ratio
            }
        };
        // Bounded jitter keeps front lines ragged without runaway variance.
        base.max(1.0) + rng.gen_range(0..2) as f64
    }

    fn attack_logic(
        &self,
        game: &Game,
        _attacker: PlayerId,
        target: Owner,
        troops: f64,
        tile: TileId,
        rng: &mut StdRng,
    ) -> AttackOutcome {
        let magnitude = game.grid().magnitude(tile);
        match target.player() {
            None => AttackOutcome {
                attacker_loss: magnitude,
                defender_loss: 0.0,
                tiles_used: 1.0,
            },
            Some(defender) => {
                let defender = game.player(defender);
                let strength = (defender.troops() / troops.max(1.0)).clamp(0.6, 2.0);
                let jitter = 0.8 + rng.gen_range(0..5) as f64 / 10.0;
                AttackOutcome {
                    attacker_loss: strength * magnitude * jitter,
                    defender_loss: defender.troops() / f64::from(defender.num_tiles().max(1)) * 0.5,
                    tiles_used: (0.5 + strength / 2.0) * magnitude,
                }
            }
        }
    }

    fn attack_magnitude_weight(&self) -> f64 {
        3.0
    }
}
