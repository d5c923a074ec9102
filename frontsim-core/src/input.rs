//! Player-issued commands, applied at tick boundaries.

use serde::{Deserialize, Serialize};

use crate::grid::{Owner, PlayerId, TileId};

/// Everything one player submits for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCommands {
    pub player: PlayerId,
    pub commands: Vec<Command>,
}

/// A single player action.
///
/// Commands are intents. They are validated when the engine processes
/// them, and rejected commands are logged and dropped so one bad input
/// never stalls the tick for everyone else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Open an attack on `target` ground along the shared border, or from
    /// a beachhead when `source_tile` is set.
    LaunchAttack {
        target: Owner,
        /// Troops to commit; `None` asks the rules for the standard
        /// allocation.
        troops: Option<f64>,
        /// Beachhead tile for amphibious landings.
        source_tile: Option<TileId>,
        /// Map position the player aimed at, for directional weighting.
        click_tile: Option<TileId>,
        /// Set when the troops already left the pool, as with boat
        /// landings that deduct on embark.
        troops_already_deducted: bool,
    },
    /// Flag every outgoing attack on `target` to retreat.
    RetreatAttack { target: Owner },
    /// Form or dissolve an alliance.
    SetAlliance { other: PlayerId, allied: bool },
}

impl Command {
    /// Plain attack along the shared border with an explicit troop count.
    pub fn attack(target: Owner, troops: f64) -> Self {
        Command::LaunchAttack {
            target,
            troops: Some(troops),
            source_tile: None,
            click_tile: None,
            troops_already_deducted: false,
        }
    }

    /// Attack aimed at a map position.
    pub fn attack_towards(target: Owner, troops: f64, click_tile: TileId) -> Self {
        Command::LaunchAttack {
            target,
            troops: Some(troops),
            source_tile: None,
            click_tile: Some(click_tile),
            troops_already_deducted: false,
        }
    }
}
