//! Periodic enclave detection.
//!
//! Every player gets one sweep execution at spawn. On its cadence tick it
//! decomposes the player's border tiles into 8-connected clusters and
//! hands surrounded pockets over to the besieger. The geometry test is
//! deliberately coarse: a cluster counts as surrounded when no tile of it
//! touches the map edge or open ocean and the besiegers' bounding box
//! wraps the cluster's own. Exact encirclement is not required.

use rustc_hash::FxHashMap;
use tracing::instrument;

use crate::executions::TickContext;
use crate::grid::{Owner, PlayerId, TileGrid, TileId};
use crate::observer::{EventRegistry, GameEvent};
use crate::state::{Game, Tick};

/// Axis-aligned tile bounds. Used only for the inscribed surround test,
/// never for exact geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BoundingBox {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl BoundingBox {
    fn at(grid: &TileGrid, tile: TileId) -> Self {
        let x = grid.x(tile);
        let y = grid.y(tile);
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn grow(&mut self, grid: &TileGrid, tile: TileId) {
        let x = grid.x(tile);
        let y = grid.y(tile);
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn contains(&self, inner: &BoundingBox) -> bool {
        self.min_x <= inner.min_x
            && self.min_y <= inner.min_y
            && self.max_x >= inner.max_x
            && self.max_y >= inner.max_y
    }
}

fn bounds_of(grid: &TileGrid, tiles: &[TileId]) -> Option<BoundingBox> {
    let (&first, rest) = tiles.split_first()?;
    let mut bounds = BoundingBox::at(grid, first);
    for &tile in rest {
        bounds.grow(grid, tile);
    }
    Some(bounds)
}

pub struct ClusterSweep {
    player: PlayerId,
    last_sweep: Option<Tick>,
    initialized: bool,
    active: bool,
}

impl ClusterSweep {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            last_sweep: None,
            initialized: false,
            active: false,
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn init(&mut self, ctx: &mut TickContext<'_>) {
        assert!(!self.initialized, "cluster sweep initialized twice");
        self.initialized = true;
        let game = &*ctx.game;
        if !game.contains_player(self.player) || !game.player(self.player).is_alive() {
            log::warn!("cluster sweep for missing or dead player {} dropped", self.player);
            return;
        }
        self.active = true;
    }

    #[instrument(skip_all, name = "cluster_sweep")]
    pub(crate) fn tick(&mut self, ctx: &mut TickContext<'_>) {
        assert!(self.initialized, "cluster sweep ticked before init");
        if !self.active {
            return;
        }
        let game = &mut *ctx.game;
        let events = ctx.events;
        if !game.player(self.player).is_alive() {
            self.active = false;
            return;
        }
        let interval = game.config().cluster_check_interval.max(1);
        if (game.tick() + u64::from(self.player)) % interval != 0 {
            return;
        }
        // Attacks run after sweeps within a tick, so conquests from the
        // tick of the last pass land after it: the staleness comparison
        // has to be inclusive.
        let dirty = self
            .last_sweep
            .is_none_or(|t| game.player(self.player).last_tile_change() >= t);
        if !dirty {
            return;
        }
        self.last_sweep = Some(game.tick());
        self.sweep(game, events);
    }

    fn sweep(&mut self, game: &mut Game, events: &EventRegistry) {
        let clusters = game.border_clusters(self.player);
        for (index, cluster) in clusters.iter().enumerate() {
            // A capture below can flood away the rest of the territory.
            if !game.player(self.player).is_alive() {
                break;
            }
            let eligible = if index == 0 {
                // The largest cluster is the player's primary territory.
                // It only falls when a single enemy wraps it completely.
                surrounding_enemy(game, self.player, cluster).is_some()
            } else {
                cluster_surrounded(game, self.player, cluster)
            };
            if !eligible {
                continue;
            }
            let Some(captor) = capturing_player(game, self.player, cluster) else {
                continue;
            };
            self.capture_cluster(game, events, captor, cluster[0]);
        }
    }

    /// Flood the still-owned region around `seed` over to `captor`. The
    /// seed can already be lost when two clusters bordered one region;
    /// that is a silent no-op.
    fn capture_cluster(
        &mut self,
        game: &mut Game,
        events: &EventRegistry,
        captor: PlayerId,
        seed: TileId,
    ) {
        let region = game.owned_region(self.player, seed);
        if region.is_empty() {
            return;
        }
        let mut defeated = false;
        for &tile in &region {
            defeated = game.conquer(captor, tile).defeated;
        }
        events.emit(&GameEvent::TerritoryCaptured {
            tick: game.tick(),
            from: self.player,
            to: captor,
            tiles: region.len() as u32,
        });
        if defeated {
            events.emit(&GameEvent::PlayerDefeated {
                tick: game.tick(),
                player: self.player,
                conqueror: captor,
            });
            log::info!(
                "player {} fully conquered by {captor} after enclave collapse",
                self.player
            );
        } else {
            log::debug!(
                "{} surrounded tiles of player {} fall to {captor}",
                region.len(),
                self.player
            );
        }
    }
}

/// The single enemy wrapping this cluster, if any.
///
/// Fails when any tile touches the map edge or open ocean, when unclaimed
/// land or a friendly player borders the cluster, when two different
/// enemies do, or when the enemy's territory does not wrap the cluster's
/// bounding box.
fn surrounding_enemy(game: &Game, player: PlayerId, cluster: &[TileId]) -> Option<PlayerId> {
    let grid = game.grid();
    let mut enemy: Option<PlayerId> = None;
    for &tile in cluster {
        if grid.is_map_edge(tile) || grid.is_ocean_shore(tile) {
            return None;
        }
        let (ns, n) = grid.neighbors4(tile);
        for &nb in &ns[..n] {
            // Lakes neither protect nor expose; only land ownership counts.
            if !grid.is_land(nb) {
                continue;
            }
            match grid.owner(nb) {
                Owner::Unclaimed => return None,
                Owner::Player(p) if p == player => {}
                Owner::Player(p) => {
                    if game.friendly(player, p) {
                        return None;
                    }
                    match enemy {
                        None => enemy = Some(p),
                        Some(e) if e == p => {}
                        Some(_) => return None,
                    }
                }
            }
        }
    }
    let enemy = enemy?;
    let cluster_box = bounds_of(grid, cluster)?;
    let enemy_box = border_bounds(game, enemy)?;
    if enemy_box.contains(&cluster_box) {
        Some(enemy)
    } else {
        None
    }
}

/// Secondary-cluster surround test: off the edge, off the shoreline, and
/// the bounding box of all hostile tiles touching the cluster wraps the
/// cluster's own. Unclaimed neighbors are ignored here.
fn cluster_surrounded(game: &Game, player: PlayerId, cluster: &[TileId]) -> bool {
    let grid = game.grid();
    let mut enemy_box: Option<BoundingBox> = None;
    for &tile in cluster {
        if grid.is_map_edge(tile) || grid.is_ocean_shore(tile) {
            return false;
        }
        let (ns, n) = grid.neighbors4(tile);
        for &nb in &ns[..n] {
            if let Owner::Player(p) = grid.owner(nb) {
                if p != player && !game.friendly(player, p) {
                    match &mut enemy_box {
                        None => enemy_box = Some(BoundingBox::at(grid, nb)),
                        Some(bounds) => bounds.grow(grid, nb),
                    }
                }
            }
        }
    }
    match (enemy_box, bounds_of(grid, cluster)) {
        (Some(enemies), Some(cluster)) => enemies.contains(&cluster),
        _ => false,
    }
}

/// Who takes a surrendered cluster: the adjacent enemy pressing with the
/// largest attack against this player, else the one holding the longest
/// stretch of the siege line. Ties go to the earlier attack and to the
/// smaller player id, so every replica resolves identically.
fn capturing_player(game: &Game, player: PlayerId, cluster: &[TileId]) -> Option<PlayerId> {
    let grid = game.grid();
    let mut contact: FxHashMap<PlayerId, u32> = FxHashMap::default();
    for &tile in cluster {
        let (ns, n) = grid.neighbors4(tile);
        for &nb in &ns[..n] {
            if let Owner::Player(p) = grid.owner(nb) {
                if p != player && game.player(p).is_alive() && !game.friendly(player, p) {
                    *contact.entry(p).or_insert(0) += 1;
                }
            }
        }
    }
    if contact.is_empty() {
        return None;
    }

    let mut best_attack: Option<(PlayerId, f64)> = None;
    for attack in game.attacks() {
        if attack.target != Owner::Player(player) || !contact.contains_key(&attack.attacker) {
            continue;
        }
        let better = match best_attack {
            None => true,
            Some((_, troops)) => attack.troops > troops,
        };
        if better {
            best_attack = Some((attack.attacker, attack.troops));
        }
    }
    if let Some((attacker, _)) = best_attack {
        return Some(attacker);
    }

    let mut best: Option<(PlayerId, u32)> = None;
    for candidate in game.players() {
        let Some(&count) = contact.get(&candidate.id()) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((_, c)) => count > c,
        };
        if better {
            best = Some((candidate.id(), count));
        }
    }
    best.map(|(p, _)| p)
}

/// Bounding box of a player's border tiles. The extremes of a territory
/// that has any border at all are themselves border tiles, so this wraps
/// everything the surround test cares about.
fn border_bounds(game: &Game, player: PlayerId) -> Option<BoundingBox> {
    let grid = game.grid();
    let mut bounds: Option<BoundingBox> = None;
    for &tile in game.player(player).border_tiles() {
        match &mut bounds {
            None => bounds = Some(BoundingBox::at(grid, tile)),
            Some(b) => b.grow(grid, tile),
        }
    }
    bounds
}
