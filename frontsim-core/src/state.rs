//! Authoritative simulation state: the grid, players, diplomacy and the
//! attack registry.
//!
//! Ownership has exactly one mutation path, [`Game::conquer`], which keeps
//! the per-player tile counts and border caches consistent with the grid.
//! Everything else reads.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, VecDeque};
use std::hash::{Hash, Hasher};

use grid_frontier::GenerationalVisited;
use rustc_hash::FxHashSet;

use crate::config::SimConfig;
use crate::grid::{Owner, PlayerId, TileGrid, TileId};

/// Simulation time in ticks since game start.
pub type Tick = u64;

/// Monotonic attack identifier, assigned at registration. Registry order
/// is creation order, which is the deterministic processing order.
pub type AttackId = u64;

// ============================================================================
// Player
// ============================================================================

/// One player's mutable state.
#[derive(Debug)]
pub struct Player {
    id: PlayerId,
    name: String,
    troops: f64,
    tiles_owned: u32,
    border_tiles: FxHashSet<TileId>,
    alive: bool,
    spawn_tick: Tick,
    team: Option<u8>,
    last_tile_change: Tick,
}

impl Player {
    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn troops(&self) -> f64 {
        self.troops
    }

    pub fn num_tiles(&self) -> u32 {
        self.tiles_owned
    }

    /// Owned tiles with at least one adjacent tile not owned by this
    /// player. Maintained incrementally by [`Game::conquer`].
    pub fn border_tiles(&self) -> &FxHashSet<TileId> {
        &self.border_tiles
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn spawn_tick(&self) -> Tick {
        self.spawn_tick
    }

    pub fn team(&self) -> Option<u8> {
        self.team
    }

    /// Tick of the most recent change to this player's territory, used by
    /// the enclave sweep to skip players whose map has not moved.
    pub fn last_tile_change(&self) -> Tick {
        self.last_tile_change
    }

    pub fn add_troops(&mut self, amount: f64) {
        debug_assert!(amount >= 0.0, "troop additions must be non-negative");
        self.troops += amount;
    }

    /// Remove up to `amount` troops and return how many actually left the
    /// pool. Never drives the pool negative.
    pub fn remove_troops(&mut self, amount: f64) -> f64 {
        let taken = amount.max(0.0).min(self.troops);
        self.troops -= taken;
        taken
    }
}

// ============================================================================
// Relations
// ============================================================================

/// Symmetric alliance table.
#[derive(Debug, Default)]
pub struct Relations {
    allied: FxHashSet<(PlayerId, PlayerId)>,
}

impl Relations {
    fn key(a: PlayerId, b: PlayerId) -> (PlayerId, PlayerId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn set_allied(&mut self, a: PlayerId, b: PlayerId, allied: bool) {
        if allied {
            self.allied.insert(Self::key(a, b));
        } else {
            self.allied.remove(&Self::key(a, b));
        }
    }

    pub fn are_allied(&self, a: PlayerId, b: PlayerId) -> bool {
        self.allied.contains(&Self::key(a, b))
    }
}

// ============================================================================
// Attack registry
// ============================================================================

/// Registry entry for one live attack.
///
/// The registry is shared state on purpose: opposing attacks net against
/// each other at launch and merges fold troops into an existing entry, so
/// executions read their own entry back every tick instead of caching a
/// troop count locally.
#[derive(Debug, Clone)]
pub struct AttackState {
    pub id: AttackId,
    pub attacker: PlayerId,
    pub target: Owner,
    pub troops: f64,
    /// Beachhead for amphibious assaults; `None` means the whole shared
    /// border fights.
    pub source_tile: Option<TileId>,
    /// Cooperative retreat flag; the owning execution acts on it on its
    /// next tick.
    pub retreating: bool,
}

/// Result of a single tile transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConquerOutcome {
    pub previous: Owner,
    /// True when this transfer removed the previous owner's last tile.
    pub defeated: bool,
}

// ============================================================================
// Game
// ============================================================================

/// The complete authoritative state of one game.
pub struct Game {
    grid: TileGrid,
    players: Vec<Player>,
    relations: Relations,
    config: SimConfig,
    seed: u64,
    tick: Tick,
    attacks: BTreeMap<AttackId, AttackState>,
    next_attack_id: AttackId,
    /// Scratch visited-set shared by flood fills; cleared per use.
    traversal: GenerationalVisited,
}

impl Game {
    pub fn new(grid: TileGrid, config: SimConfig, seed: u64) -> Self {
        let tiles = grid.num_tiles() as usize;
        Self {
            grid,
            players: Vec::new(),
            relations: Relations::default(),
            config,
            seed,
            tick: 0,
            attacks: BTreeMap::new(),
            next_attack_id: 0,
            traversal: GenerationalVisited::new(tiles),
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    pub fn add_player(&mut self, name: impl Into<String>, team: Option<u8>) -> PlayerId {
        assert!(
            self.players.len() < u16::MAX as usize,
            "player id space exhausted"
        );
        let id = self.players.len() as PlayerId + 1;
        self.players.push(Player {
            id,
            name: name.into(),
            troops: 0.0,
            tiles_owned: 0,
            border_tiles: FxHashSet::default(),
            alive: true,
            spawn_tick: self.tick,
            team,
            last_tile_change: self.tick,
        });
        id
    }

    pub fn contains_player(&self, id: PlayerId) -> bool {
        id >= 1 && (id as usize) <= self.players.len()
    }

    /// Panics on an unregistered id; validate at the boundary with
    /// [`Game::contains_player`] first.
    pub fn player(&self, id: PlayerId) -> &Player {
        &self.players[id as usize - 1]
    }

    pub fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        &mut self.players[id as usize - 1]
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn num_players(&self) -> usize {
        self.players.len()
    }

    pub fn owner(&self, tile: TileId) -> Owner {
        self.grid.owner(tile)
    }

    /// Same player, explicit allies, or teammates.
    pub fn friendly(&self, a: PlayerId, b: PlayerId) -> bool {
        if a == b {
            return true;
        }
        if self.relations.are_allied(a, b) {
            return true;
        }
        match (self.player(a).team, self.player(b).team) {
            (Some(ta), Some(tb)) => ta == tb,
            _ => false,
        }
    }

    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    pub fn set_allied(&mut self, a: PlayerId, b: PlayerId, allied: bool) {
        self.relations.set_allied(a, b, allied);
    }

    pub fn in_spawn_immunity(&self, id: PlayerId) -> bool {
        self.tick - self.player(id).spawn_tick < self.config.spawn_immunity_ticks
    }

    // ------------------------------------------------------------------
    // Ownership
    // ------------------------------------------------------------------

    /// Transfer `tile` to `capturer`, updating tile counts and the border
    /// caches of both sides. No-op if the capturer already owns it.
    pub fn conquer(&mut self, capturer: PlayerId, tile: TileId) -> ConquerOutcome {
        let previous = self.grid.owner(tile);
        if previous == Owner::Player(capturer) {
            return ConquerOutcome {
                previous,
                defeated: false,
            };
        }
        debug_assert!(self.grid.is_land(tile), "conquered tile must be land");
        self.grid.set_owner(tile, Owner::Player(capturer));
        let tick = self.tick;
        let (ns, n) = self.grid.neighbors4(tile);
        let neighbors = &ns[..n];

        let mut defeated = false;
        if let Owner::Player(loser) = previous {
            // Tiles the loser still holds next to the flipped tile now
            // face enemy ground.
            let mut exposed = [0; 4];
            let mut exposed_len = 0;
            for &nb in neighbors {
                if self.grid.owner(nb) == Owner::Player(loser) {
                    exposed[exposed_len] = nb;
                    exposed_len += 1;
                }
            }
            let loser_state = &mut self.players[loser as usize - 1];
            loser_state.tiles_owned -= 1;
            loser_state.border_tiles.remove(&tile);
            for &nb in &exposed[..exposed_len] {
                loser_state.border_tiles.insert(nb);
            }
            loser_state.last_tile_change = tick;
            if loser_state.tiles_owned == 0 {
                loser_state.alive = false;
                debug_assert!(loser_state.border_tiles.is_empty());
                defeated = true;
            }
        }

        let gained_border = neighbors
            .iter()
            .any(|&nb| self.grid.owner(nb) != Owner::Player(capturer));
        // Capturer-owned neighbors may have just lost their last foreign
        // contact and left the border.
        let mut interior = [0; 4];
        let mut interior_len = 0;
        for &nb in neighbors {
            if self.grid.owner(nb) == Owner::Player(capturer) && self.fully_enclosed(nb, capturer) {
                interior[interior_len] = nb;
                interior_len += 1;
            }
        }
        let winner_state = &mut self.players[capturer as usize - 1];
        winner_state.tiles_owned += 1;
        winner_state.last_tile_change = tick;
        if gained_border {
            winner_state.border_tiles.insert(tile);
        }
        for &nb in &interior[..interior_len] {
            winner_state.border_tiles.remove(&nb);
        }

        ConquerOutcome { previous, defeated }
    }

    fn fully_enclosed(&self, tile: TileId, owner: PlayerId) -> bool {
        let (ns, n) = self.grid.neighbors4(tile);
        ns[..n]
            .iter()
            .all(|&nb| self.grid.owner(nb) == Owner::Player(owner))
    }

    /// All tiles of `player`'s territory 4-connected to `seed`, in BFS
    /// order. Empty if the seed is not theirs.
    pub fn owned_region(&mut self, player: PlayerId, seed: TileId) -> Vec<TileId> {
        let mut region = Vec::new();
        if self.grid.owner(seed) != Owner::Player(player) {
            return region;
        }
        self.traversal.reset();
        self.traversal.visit(seed as usize);
        let mut queue = VecDeque::new();
        queue.push_back(seed);
        while let Some(tile) = queue.pop_front() {
            region.push(tile);
            let (ns, n) = self.grid.neighbors4(tile);
            for &nb in &ns[..n] {
                if self.grid.owner(nb) == Owner::Player(player) && self.traversal.visit(nb as usize)
                {
                    queue.push_back(nb);
                }
            }
        }
        region
    }

    /// Group `player`'s border tiles into 8-connected clusters, largest
    /// first. Seeds are scanned in ascending tile order so the result is
    /// identical on every replica.
    pub fn border_clusters(&mut self, player: PlayerId) -> Vec<Vec<TileId>> {
        let mut seeds: Vec<TileId> = self.players[player as usize - 1]
            .border_tiles
            .iter()
            .copied()
            .collect();
        seeds.sort_unstable();
        self.traversal.reset();
        let mut clusters = Vec::new();
        for seed in seeds {
            if !self.traversal.visit(seed as usize) {
                continue;
            }
            let mut cluster = Vec::new();
            let mut queue = VecDeque::new();
            queue.push_back(seed);
            while let Some(tile) = queue.pop_front() {
                cluster.push(tile);
                let (ns, n) = self.grid.neighbors8(tile);
                for &nb in &ns[..n] {
                    if self.players[player as usize - 1].border_tiles.contains(&nb)
                        && self.traversal.visit(nb as usize)
                    {
                        queue.push_back(nb);
                    }
                }
            }
            clusters.push(cluster);
        }
        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        clusters
    }

    // ------------------------------------------------------------------
    // Attack registry
    // ------------------------------------------------------------------

    pub(crate) fn register_attack(
        &mut self,
        attacker: PlayerId,
        target: Owner,
        troops: f64,
        source_tile: Option<TileId>,
    ) -> AttackId {
        let id = self.next_attack_id;
        self.next_attack_id += 1;
        self.attacks.insert(
            id,
            AttackState {
                id,
                attacker,
                target,
                troops,
                source_tile,
                retreating: false,
            },
        );
        id
    }

    pub fn attack(&self, id: AttackId) -> Option<&AttackState> {
        self.attacks.get(&id)
    }

    pub(crate) fn attack_mut(&mut self, id: AttackId) -> Option<&mut AttackState> {
        self.attacks.get_mut(&id)
    }

    pub(crate) fn end_attack(&mut self, id: AttackId) -> Option<AttackState> {
        self.attacks.remove(&id)
    }

    /// Live attacks in creation order.
    pub fn attacks(&self) -> impl Iterator<Item = &AttackState> {
        self.attacks.values()
    }

    pub fn num_attacks(&self) -> usize {
        self.attacks.len()
    }

    // ------------------------------------------------------------------
    // Desync detection
    // ------------------------------------------------------------------

    /// Checksum of all lockstep-relevant state, for desync detection.
    ///
    /// Players and attacks are hashed in id order and floats as raw bits,
    /// so two replicas that agree on state agree on the digest.
    pub fn checksum(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.seed.hash(&mut hasher);
        self.grid.hash_owners(&mut hasher);
        for player in &self.players {
            player.id.hash(&mut hasher);
            player.troops.to_bits().hash(&mut hasher);
            player.tiles_owned.hash(&mut hasher);
            player.alive.hash(&mut hasher);
        }
        for attack in self.attacks.values() {
            attack.id.hash(&mut hasher);
            attack.attacker.hash(&mut hasher);
            attack.target.to_raw().hash(&mut hasher);
            attack.troops.to_bits().hash(&mut hasher);
            attack.source_tile.hash(&mut hasher);
            attack.retreating.hash(&mut hasher);
        }
        hasher.finish()
    }
}
