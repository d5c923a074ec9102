//! Test support: compact world construction, pinned combat rules and
//! whole-state invariant checks. Compiled into the crate so downstream
//! crates can drive scenario tests with the same helpers.

use rand::rngs::StdRng;

use crate::config::SimConfig;
use crate::grid::{Owner, PlayerId, Terrain, TileGrid, TileId};
use crate::rules::{AttackOutcome, ConquestRules};
use crate::state::Game;

/// Builds small worlds for tests without going through scenario files.
///
/// Players get ids in declaration order starting at 1. Rectangles are
/// claimed in declaration order, so later claims overwrite earlier ones,
/// which is the easy way to punch a pocket into someone's territory.
///
/// ```
/// use frontsim_core::grid::Owner;
/// use frontsim_core::testing::GameBuilder;
///
/// let game = GameBuilder::new(8, 8)
///     .with_player("red", 500.0)
///     .with_rect(1, 0, 0, 4, 8)
///     .build();
/// assert_eq!(game.owner(game.grid().tile_at(0, 0)), Owner::Player(1));
/// assert_eq!(game.player(1).num_tiles(), 32);
/// ```
pub struct GameBuilder {
    width: u32,
    height: u32,
    fill: Terrain,
    seed: u64,
    config: SimConfig,
    terrain: Vec<(u32, u32, Terrain)>,
    players: Vec<(String, f64)>,
    rects: Vec<(PlayerId, u32, u32, u32, u32)>,
}

impl GameBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            fill: Terrain::Plains,
            seed: 42,
            config: SimConfig::default(),
            terrain: Vec::new(),
            players: Vec::new(),
            rects: Vec::new(),
        }
    }

    pub fn fill(mut self, terrain: Terrain) -> Self {
        self.fill = terrain;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn terrain(mut self, x: u32, y: u32, terrain: Terrain) -> Self {
        self.terrain.push((x, y, terrain));
        self
    }

    pub fn with_player(mut self, name: &str, troops: f64) -> Self {
        self.players.push((name.to_string(), troops));
        self
    }

    pub fn with_rect(mut self, player: PlayerId, x: u32, y: u32, w: u32, h: u32) -> Self {
        self.rects.push((player, x, y, w, h));
        self
    }

    pub fn build(self) -> Game {
        let mut grid = TileGrid::new(self.width, self.height, self.fill);
        // Terrain before ownership; claiming water is a caller bug.
        for (x, y, terrain) in self.terrain {
            let tile = grid.tile_at(x, y);
            grid.set_terrain(tile, terrain);
        }
        let mut game = Game::new(grid, self.config, self.seed);
        for (name, troops) in self.players {
            let id = game.add_player(name, None);
            game.player_mut(id).add_troops(troops);
        }
        for (player, x, y, w, h) in self.rects {
            for dy in 0..h {
                for dx in 0..w {
                    let tile = game.grid().tile_at(x + dx, y + dy);
                    game.conquer(player, tile);
                }
            }
        }
        game
    }
}

/// Rules with every knob pinned, so tests can predict exact troop counts
/// and tile tallies.
pub struct FixedRules {
    /// Committed when a command names no amount.
    pub amount: f64,
    pub tiles_per_tick: f64,
    /// Attacker troops lost per tile.
    pub troop_cost: f64,
    pub defender_loss: f64,
    pub malus_percent: f64,
    pub direction_weight: f64,
    pub magnitude_weight: f64,
}

impl Default for FixedRules {
    fn default() -> Self {
        Self {
            amount: 50.0,
            tiles_per_tick: 1.0,
            troop_cost: 1.0,
            defender_loss: 0.0,
            malus_percent: 0.0,
            direction_weight: 0.0,
            magnitude_weight: 0.0,
        }
    }
}

impl ConquestRules for FixedRules {
    fn attack_amount(&self, _game: &Game, _attacker: PlayerId, _target: Owner) -> f64 {
        self.amount
    }

    fn attack_tiles_per_tick(
        &self,
        _game: &Game,
        _attacker: PlayerId,
        _target: Owner,
        _troops: f64,
        _frontier_len: usize,
        _rng: &mut StdRng,
    ) -> f64 {
        self.tiles_per_tick
    }

    fn attack_logic(
        &self,
        _game: &Game,
        _attacker: PlayerId,
        _target: Owner,
        _troops: f64,
        _tile: TileId,
        _rng: &mut StdRng,
    ) -> AttackOutcome {
        AttackOutcome {
            attacker_loss: self.troop_cost,
            defender_loss: self.defender_loss,
            tiles_used: 1.0,
        }
    }

    fn attack_direction_weight(&self) -> f64 {
        self.direction_weight
    }

    fn attack_magnitude_weight(&self) -> f64 {
        self.magnitude_weight
    }

    fn retreat_malus_percent(&self) -> f64 {
        self.malus_percent
    }
}

/// Cross-check every redundant piece of game state against the grid,
/// which is the single source of truth. Returns one line per violation.
pub fn check_invariants(game: &Game) -> Vec<String> {
    let mut violations = Vec::new();
    let grid = game.grid();

    let mut tile_counts = vec![0u32; game.num_players() + 1];
    for tile in 0..grid.num_tiles() {
        match grid.owner(tile) {
            Owner::Unclaimed => {}
            Owner::Player(p) => {
                if !grid.is_land(tile) {
                    violations.push(format!(
                        "water tile ({}, {}) owned by player {p}",
                        grid.x(tile),
                        grid.y(tile)
                    ));
                }
                if !game.contains_player(p) {
                    violations.push(format!("tile {tile} owned by unregistered player {p}"));
                    continue;
                }
                tile_counts[p as usize] += 1;
            }
        }
    }

    for player in game.players() {
        let id = player.id();
        let counted = tile_counts[id as usize];
        if counted != player.num_tiles() {
            violations.push(format!(
                "player {id} tile count {} disagrees with the grid ({counted})",
                player.num_tiles()
            ));
        }
        if player.troops() < 0.0 {
            violations.push(format!("player {id} has negative troops"));
        }
        if !player.is_alive() && counted > 0 {
            violations.push(format!("dead player {id} still owns {counted} tiles"));
        }
        if player.is_alive() && counted == 0 {
            violations.push(format!("living player {id} owns no tiles"));
        }

        let mut expected_border = Vec::new();
        for tile in 0..grid.num_tiles() {
            if grid.owner(tile) != Owner::Player(id) {
                continue;
            }
            let (ns, n) = grid.neighbors4(tile);
            if ns[..n].iter().any(|&nb| grid.owner(nb) != Owner::Player(id)) {
                expected_border.push(tile);
            }
        }
        let cached = player.border_tiles();
        if expected_border.len() != cached.len()
            || expected_border.iter().any(|t| !cached.contains(t))
        {
            violations.push(format!(
                "player {id} border cache has {} tiles, recompute found {}",
                cached.len(),
                expected_border.len()
            ));
        }
    }

    for attack in game.attacks() {
        if attack.troops < 0.0 {
            violations.push(format!("attack {} has negative troops", attack.id));
        }
        if !game.contains_player(attack.attacker) {
            violations.push(format!(
                "attack {} from unregistered player {}",
                attack.id, attack.attacker
            ));
        }
    }

    violations
}

/// Panic with every violation listed. Call between ticks in scenario
/// tests.
pub fn assert_invariants(game: &Game) {
    let violations = check_invariants(game);
    assert!(
        violations.is_empty(),
        "state invariants violated at tick {}:\n  {}",
        game.tick(),
        violations.join("\n  ")
    );
}
