//! The conquest engine: one execution per live attack.
//!
//! Expansion is frontier-driven. Conquerable tiles sit in a min-priority
//! queue; each tick the attack pops the cheapest tiles within a tile
//! budget, resolves combat for them and pushes newly exposed neighbors.
//! Queue entries are never updated in place. A tile that changed hands or
//! lost its friendly contact while queued is simply discarded when popped,
//! which keeps the queue append-only and the loop free of bookkeeping.

use grid_frontier::MinFrontier;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::instrument;

use crate::distance::CoarseDistanceField;
use crate::executions::{ExecutionId, TickContext};
use crate::grid::{Owner, PlayerId, TileGrid, TileId};
use crate::observer::{EventRegistry, GameEvent};
use crate::rules::ConquestRules;
use crate::state::{AttackId, Game, Tick};

/// Unvalidated parameters of an attack command.
#[derive(Debug, Clone)]
pub struct AttackOrder {
    pub attacker: PlayerId,
    pub target: Owner,
    pub troops: Option<f64>,
    pub source_tile: Option<TileId>,
    pub click_tile: Option<TileId>,
    pub troops_already_deducted: bool,
}

/// A frontier entry: a conquerable tile and the friendly tile it was
/// reached from. The source anchors the directional bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    tile: TileId,
    source: TileId,
}

pub struct AttackExecution {
    id: ExecutionId,
    attacker: PlayerId,
    target: Owner,
    requested_troops: Option<f64>,
    source_tile: Option<TileId>,
    click_tile: Option<TileId>,
    troops_already_deducted: bool,
    attack_id: Option<AttackId>,
    start_tick: Tick,
    frontier: MinFrontier<Candidate>,
    rng: StdRng,
    distance_field: Option<CoarseDistanceField>,
    initialized: bool,
    active: bool,
}

impl AttackExecution {
    pub fn new(id: ExecutionId, order: AttackOrder) -> Self {
        Self {
            id,
            attacker: order.attacker,
            target: order.target,
            requested_troops: order.troops,
            source_tile: order.source_tile,
            click_tile: order.click_tile,
            troops_already_deducted: order.troops_already_deducted,
            attack_id: None,
            start_tick: 0,
            frontier: MinFrontier::new(),
            rng: StdRng::seed_from_u64(0),
            distance_field: None,
            initialized: false,
            active: false,
        }
    }

    pub fn attacker(&self) -> PlayerId {
        self.attacker
    }

    pub fn target(&self) -> Owner {
        self.target
    }

    pub fn attack_id(&self) -> Option<AttackId> {
        self.attack_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Validate the order, move the troops, register the attack and seed
    /// the frontier. A rejected order logs a warning and leaves the
    /// execution inactive; it is never an error that fails the tick.
    pub(crate) fn init(&mut self, ctx: &mut TickContext<'_>) {
        assert!(!self.initialized, "attack execution initialized twice");
        self.initialized = true;
        let game = &mut *ctx.game;
        let rules = ctx.rules;
        let events = ctx.events;
        self.start_tick = game.tick();
        self.rng = StdRng::seed_from_u64(mix_seed(game.seed(), self.id));

        if !self.validate(game) {
            return;
        }

        let mut troops = match self.requested_troops {
            Some(requested) => requested,
            None => rules.attack_amount(game, self.attacker, self.target),
        };
        if !self.troops_already_deducted {
            troops = game.player_mut(self.attacker).remove_troops(troops);
        }
        if troops < 1.0 {
            log::warn!(
                "player {} attack on {:?} dropped: only {troops:.1} troops available",
                self.attacker,
                self.target
            );
            game.player_mut(self.attacker).add_troops(troops);
            return;
        }

        let attack_id = game.register_attack(self.attacker, self.target, troops, self.source_tile);
        self.attack_id = Some(attack_id);
        events.emit(&GameEvent::AttackLaunched {
            tick: game.tick(),
            attacker: self.attacker,
            target: self.target,
            troops,
        });
        log::debug!(
            "player {} attacks {:?} with {troops:.0} troops",
            self.attacker,
            self.target
        );

        if self.net_opposing(game, attack_id) {
            return;
        }
        if self.merge_into_existing(game, attack_id) {
            return;
        }

        if let Some(click) = self.click_tile {
            if rules.attack_magnitude_weight() > 0.0 {
                self.distance_field = Some(CoarseDistanceField::build(
                    game.grid(),
                    click,
                    game.config().coarse_stride,
                ));
            }
        }

        self.rebuild_frontier(game, rules);
        self.active = true;
    }

    fn validate(&self, game: &Game) -> bool {
        if !game.contains_player(self.attacker) || !game.player(self.attacker).is_alive() {
            log::warn!("attack from missing or dead player {} dropped", self.attacker);
            return false;
        }
        if let Owner::Player(target) = self.target {
            if !game.contains_player(target) || !game.player(target).is_alive() {
                log::warn!(
                    "player {} attack dropped: target {target} is gone",
                    self.attacker
                );
                return false;
            }
            if target == self.attacker {
                log::warn!("player {} tried to attack themselves", self.attacker);
                return false;
            }
            if game.friendly(self.attacker, target) {
                log::warn!(
                    "player {} attack dropped: {target} is friendly",
                    self.attacker
                );
                return false;
            }
            if game.in_spawn_immunity(target) {
                log::warn!(
                    "player {} attack dropped: {target} is spawn-protected",
                    self.attacker
                );
                return false;
            }
        }
        if let Some(source) = self.source_tile {
            if game.owner(source) != Owner::Player(self.attacker) {
                log::warn!(
                    "player {} amphibious attack dropped: beachhead not held",
                    self.attacker
                );
                return false;
            }
        }
        true
    }

    /// Troops of opposing attacks cancel one for one at launch: the
    /// smaller side is deleted and the larger reduced. Returns true when
    /// this attack was consumed.
    fn net_opposing(&mut self, game: &mut Game, my_id: AttackId) -> bool {
        let Owner::Player(target) = self.target else {
            return false;
        };
        let opposing: Vec<AttackId> = game
            .attacks()
            .filter(|a| a.attacker == target && a.target == Owner::Player(self.attacker))
            .map(|a| a.id)
            .collect();
        for other_id in opposing {
            let Some(other_troops) = game.attack(other_id).map(|a| a.troops) else {
                continue;
            };
            let my_troops = match game.attack(my_id) {
                Some(a) => a.troops,
                None => return true,
            };
            if other_troops > my_troops {
                if let Some(other) = game.attack_mut(other_id) {
                    other.troops -= my_troops;
                }
                game.end_attack(my_id);
                log::debug!("attack {my_id} netted away by opposing attack {other_id}");
                return true;
            }
            game.end_attack(other_id);
            if let Some(me) = game.attack_mut(my_id) {
                me.troops -= other_troops;
            }
            log::debug!("attack {my_id} consumed opposing attack {other_id}");
        }
        // Equal-strength netting leaves an empty shell behind.
        match game.attack(my_id) {
            Some(a) if a.troops >= 1.0 => false,
            Some(_) => {
                game.end_attack(my_id);
                true
            }
            None => true,
        }
    }

    /// Fold this attack into an existing one from the same player at the
    /// same target. Amphibious assaults never merge; they fight from
    /// their own beachhead.
    fn merge_into_existing(&mut self, game: &mut Game, my_id: AttackId) -> bool {
        if self.source_tile.is_some() {
            return false;
        }
        let existing = game
            .attacks()
            .find(|a| {
                a.id != my_id
                    && a.attacker == self.attacker
                    && a.target == self.target
                    && a.source_tile.is_none()
                    && !a.retreating
            })
            .map(|a| a.id);
        let Some(existing_id) = existing else {
            return false;
        };
        let Some(mine) = game.end_attack(my_id) else {
            return true;
        };
        if let Some(existing) = game.attack_mut(existing_id) {
            existing.troops += mine.troops;
            log::debug!("attack {my_id} merged into {existing_id}");
        }
        true
    }

    /// Advance the attack by one tick: spend the tile budget on the
    /// cheapest frontier entries.
    #[instrument(skip_all, name = "attack_tick")]
    pub(crate) fn tick(&mut self, ctx: &mut TickContext<'_>) {
        assert!(self.initialized, "attack execution ticked before init");
        if !self.active {
            return;
        }
        let game = &mut *ctx.game;
        let rules = ctx.rules;
        let events = ctx.events;
        let Some(attack_id) = self.attack_id else {
            self.active = false;
            return;
        };
        if !game.player(self.attacker).is_alive() {
            game.end_attack(attack_id);
            log::debug!("attack {attack_id} dissolved with its defeated owner");
            self.active = false;
            return;
        }
        // The registry entry can vanish under us when an opposing launch
        // nets it away; there is nothing left to do then.
        let (retreating, troops) = match game.attack(attack_id) {
            Some(a) => (a.retreating, a.troops),
            None => {
                self.active = false;
                return;
            }
        };
        if retreating {
            self.finish_retreat(game, events, attack_id, rules.retreat_malus_percent());
            return;
        }

        let mut budget = rules.attack_tiles_per_tick(
            game,
            self.attacker,
            self.target,
            troops,
            self.frontier.len(),
            &mut self.rng,
        );

        while budget > 0.0 {
            let troops = match game.attack(attack_id) {
                Some(a) => a.troops,
                None => {
                    self.active = false;
                    return;
                }
            };
            if troops < 1.0 {
                self.disband(game, attack_id);
                return;
            }
            let Some((candidate, _)) = self.frontier.pop() else {
                // Out of conquerable ground: refresh the border view, then
                // pull back. The forced retreat costs no malus.
                self.rebuild_frontier(game, rules);
                self.finish_retreat(game, events, attack_id, 0.0);
                return;
            };
            if game.owner(candidate.tile) != self.target {
                continue;
            }
            if !self.has_friendly_neighbor(game, candidate.tile) {
                continue;
            }

            let combat = rules.attack_logic(
                game,
                self.attacker,
                self.target,
                troops,
                candidate.tile,
                &mut self.rng,
            );
            debug_assert!(combat.tiles_used > 0.0, "attack_logic must consume budget");
            if let Some(attack) = game.attack_mut(attack_id) {
                attack.troops = (attack.troops - combat.attacker_loss).max(0.0);
            }
            if let Owner::Player(defender) = self.target {
                if combat.defender_loss > 0.0 {
                    game.player_mut(defender).remove_troops(combat.defender_loss);
                }
            }
            budget -= combat.tiles_used;

            let transfer = game.conquer(self.attacker, candidate.tile);
            debug_assert_eq!(transfer.previous, self.target);
            self.enqueue_from(game, rules, candidate.tile);

            if let Owner::Player(defender) = self.target {
                if transfer.defeated {
                    events.emit(&GameEvent::PlayerDefeated {
                        tick: game.tick(),
                        player: defender,
                        conqueror: self.attacker,
                    });
                    log::info!("player {defender} defeated by {}", self.attacker);
                } else if game.player(defender).num_tiles() < game.config().full_conquest_threshold
                {
                    self.capture_remnant(game, events, defender);
                }
            }
        }
    }

    /// Rebuild the frontier from scratch: the beachhead's neighbors for
    /// amphibious assaults, otherwise the whole shared border.
    fn rebuild_frontier(&mut self, game: &Game, rules: &dyn ConquestRules) {
        self.frontier.clear();
        match self.source_tile {
            Some(beachhead) => self.enqueue_from(game, rules, beachhead),
            None => {
                let mut border: Vec<TileId> = game
                    .player(self.attacker)
                    .border_tiles()
                    .iter()
                    .copied()
                    .collect();
                // Fixed scan order: the RNG draws below must not depend on
                // hash-set iteration history.
                border.sort_unstable();
                for tile in border {
                    self.enqueue_from(game, rules, tile);
                }
            }
        }
    }

    /// Queue every conquerable neighbor of `from`.
    fn enqueue_from(&mut self, game: &Game, rules: &dyn ConquestRules, from: TileId) {
        let (ns, n) = game.grid().neighbors4(from);
        for &tile in &ns[..n] {
            if game.owner(tile) == self.target && game.grid().is_land(tile) {
                let priority = self.tile_priority(game, rules, from, tile);
                self.frontier.push(Candidate { tile, source: from }, priority);
            }
        }
    }

    /// Priority of taking `tile` next; lower pops first.
    ///
    /// Defensibility grows with terrain magnitude and shrinks with the
    /// number of friendly neighbors, scaled by a small random roll. Age
    /// since launch adds a constant drift so old entries lose out to
    /// fresh ones. A click adds a direction term, and a proximity term
    /// when the rules weight it, both fading exponentially with age.
    fn tile_priority(
        &mut self,
        game: &Game,
        rules: &dyn ConquestRules,
        source: TileId,
        tile: TileId,
    ) -> f64 {
        let grid = game.grid();
        let (ns, n) = grid.neighbors4(tile);
        let mut owned = 0u32;
        for &nb in &ns[..n] {
            if grid.owner(nb) == Owner::Player(self.attacker) {
                owned += 1;
            }
        }
        let magnitude = grid.magnitude(tile);
        let roll = self.rng.gen_range(0..7) as f64;
        let defensibility = (roll + 10.0) * (1.0 - 0.5 * f64::from(owned) + magnitude / 2.0);
        let age = (game.tick() - self.start_tick) as f64;
        let mut priority = defensibility + 0.2 * age;

        if let Some(click) = self.click_tile {
            let fade = (-age / rules.attack_time_decay()).exp();
            let alignment = direction_alignment(grid, source, click, tile);
            priority += (1.0 - alignment) * rules.attack_direction_weight() * fade;
            if let Some(field) = &self.distance_field {
                let distance = field.distance_to(grid, tile);
                priority -= (-distance / rules.attack_distance_decay()).exp()
                    * rules.attack_magnitude_weight()
                    * fade;
            }
        }
        priority
    }

    fn has_friendly_neighbor(&self, game: &Game, tile: TileId) -> bool {
        let (ns, n) = game.grid().neighbors4(tile);
        ns[..n]
            .iter()
            .any(|&nb| game.owner(nb) == Owner::Player(self.attacker))
    }

    /// Below the survival threshold the defender collapses outright:
    /// every remaining tile flips to an adjacent player, or to the
    /// attacker where none borders it.
    fn capture_remnant(&mut self, game: &mut Game, events: &EventRegistry, defender: PlayerId) {
        let mut flipped = 0u32;
        for tile in 0..game.grid().num_tiles() {
            if game.owner(tile) != Owner::Player(defender) {
                continue;
            }
            let (ns, n) = game.grid().neighbors4(tile);
            let mut captor = self.attacker;
            for &nb in &ns[..n] {
                if let Owner::Player(p) = game.owner(nb) {
                    if p != defender && game.player(p).is_alive() {
                        captor = p;
                        break;
                    }
                }
            }
            game.conquer(captor, tile);
            flipped += 1;
        }
        if flipped > 0 {
            events.emit(&GameEvent::PlayerDefeated {
                tick: game.tick(),
                player: defender,
                conqueror: self.attacker,
            });
            log::info!(
                "player {defender} fell below the survival threshold; {flipped} tiles redistributed"
            );
        }
    }

    /// Return surviving troops to the pool and end the attack. `malus` is
    /// the percentage lost in transit; forced retreats pass zero.
    fn finish_retreat(
        &mut self,
        game: &mut Game,
        events: &EventRegistry,
        attack_id: AttackId,
        malus_percent: f64,
    ) {
        self.active = false;
        let Some(state) = game.end_attack(attack_id) else {
            return;
        };
        let losses = state.troops * malus_percent / 100.0;
        let survivors = state.troops - losses;
        game.player_mut(self.attacker).add_troops(survivors);
        if losses > 0.0 {
            events.emit(&GameEvent::Message {
                tick: game.tick(),
                player: self.attacker,
                text: format!("{losses:.0} troops lost covering the retreat"),
            });
        }
        events.emit(&GameEvent::AttackCancelled {
            tick: game.tick(),
            attacker: self.attacker,
            target: self.target,
            survivors,
        });
        log::debug!(
            "player {} retreats from {:?}, {survivors:.0} troops return",
            self.attacker,
            self.target
        );
    }

    /// The attack spent itself; nothing returns to the pool.
    fn disband(&mut self, game: &mut Game, attack_id: AttackId) {
        game.end_attack(attack_id);
        log::debug!(
            "player {} attack on {:?} is spent",
            self.attacker,
            self.target
        );
        self.active = false;
    }
}

/// Cosine of the angle between source-to-aim and source-to-candidate.
/// Degenerate zero-length vectors count as aligned and take no penalty.
fn direction_alignment(grid: &TileGrid, source: TileId, aim: TileId, candidate: TileId) -> f64 {
    let sx = grid.x(source) as f64;
    let sy = grid.y(source) as f64;
    let ax = grid.x(aim) as f64 - sx;
    let ay = grid.y(aim) as f64 - sy;
    let cx = grid.x(candidate) as f64 - sx;
    let cy = grid.y(candidate) as f64 - sy;
    let alen = (ax * ax + ay * ay).sqrt();
    let clen = (cx * cx + cy * cy).sqrt();
    if alen == 0.0 || clen == 0.0 {
        return 1.0;
    }
    (ax * cx + ay * cy) / (alen * clen)
}

/// Mix the game seed with an execution id so sibling attacks draw
/// independent random streams.
fn mix_seed(seed: u64, id: ExecutionId) -> u64 {
    seed ^ (id.wrapping_add(1)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
