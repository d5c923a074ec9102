//! The tile grid: terrain, ownership and adjacency.
//!
//! Tiles are addressed by a dense row-major [`TileId`], which keeps all
//! per-tile storage in flat vectors and turns neighbor lookups into index
//! arithmetic.

use serde::{Deserialize, Serialize};

/// Dense row-major tile index.
pub type TileId = u32;

/// Player identifier. Ids start at 1; 0 is reserved for unclaimed ground
/// in the packed ownership array.
pub type PlayerId = u16;

/// Terrain class of a tile.
///
/// Land classes carry a magnitude that feeds conquest cost and priority;
/// water is impassable to ground combat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Plains,
    Highland,
    Mountain,
    Lake,
    Ocean,
}

impl Terrain {
    pub fn is_land(self) -> bool {
        matches!(self, Terrain::Plains | Terrain::Highland | Terrain::Mountain)
    }

    pub fn is_water(self) -> bool {
        !self.is_land()
    }

    /// Elevation-derived weight: higher ground is harder to take.
    pub fn magnitude(self) -> f64 {
        match self {
            Terrain::Plains => 1.0,
            Terrain::Highland => 1.5,
            Terrain::Mountain => 2.0,
            Terrain::Lake | Terrain::Ocean => 0.0,
        }
    }
}

/// Tile ownership. Unclaimed land is an ordinary, attackable state rather
/// than a null owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Owner {
    Unclaimed,
    Player(PlayerId),
}

impl Owner {
    pub fn player(self) -> Option<PlayerId> {
        match self {
            Owner::Unclaimed => None,
            Owner::Player(id) => Some(id),
        }
    }

    pub fn is_player(self) -> bool {
        matches!(self, Owner::Player(_))
    }

    pub(crate) fn from_raw(raw: u16) -> Self {
        if raw == 0 {
            Owner::Unclaimed
        } else {
            Owner::Player(raw)
        }
    }

    pub(crate) fn to_raw(self) -> u16 {
        match self {
            Owner::Unclaimed => 0,
            Owner::Player(id) => id,
        }
    }
}

/// The static map plus the packed per-tile owner array.
///
/// Terrain is fixed once play starts; ownership changes only through
/// [`crate::state::Game::conquer`], which keeps the incremental border
/// caches in sync.
pub struct TileGrid {
    width: u32,
    height: u32,
    terrain: Vec<Terrain>,
    owners: Vec<u16>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, fill: Terrain) -> Self {
        assert!(width > 0 && height > 0, "grid must be non-empty");
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            terrain: vec![fill; len],
            owners: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_tiles(&self) -> u32 {
        self.width * self.height
    }

    pub fn num_land_tiles(&self) -> u32 {
        self.terrain.iter().filter(|t| t.is_land()).count() as u32
    }

    pub fn tile_at(&self, x: u32, y: u32) -> TileId {
        debug_assert!(x < self.width && y < self.height, "({x}, {y}) out of bounds");
        y * self.width + x
    }

    pub fn x(&self, tile: TileId) -> u32 {
        tile % self.width
    }

    pub fn y(&self, tile: TileId) -> u32 {
        tile / self.width
    }

    pub fn terrain(&self, tile: TileId) -> Terrain {
        self.terrain[tile as usize]
    }

    /// Repaint a tile. Setup-time only: terrain under owned tiles must not
    /// change once conquest is running.
    pub fn set_terrain(&mut self, tile: TileId, terrain: Terrain) {
        debug_assert_eq!(self.owners[tile as usize], 0, "terrain changed under an owned tile");
        self.terrain[tile as usize] = terrain;
    }

    pub fn magnitude(&self, tile: TileId) -> f64 {
        self.terrain(tile).magnitude()
    }

    pub fn is_land(&self, tile: TileId) -> bool {
        self.terrain(tile).is_land()
    }

    pub fn owner(&self, tile: TileId) -> Owner {
        Owner::from_raw(self.owners[tile as usize])
    }

    pub(crate) fn set_owner(&mut self, tile: TileId, owner: Owner) {
        self.owners[tile as usize] = owner.to_raw();
    }

    pub(crate) fn hash_owners<H: std::hash::Hasher>(&self, hasher: &mut H) {
        use std::hash::Hash;
        self.owners.hash(hasher);
    }

    /// The 4-neighborhood of `tile`: `buf[..len]` holds the valid
    /// neighbors in up, down, left, right order.
    pub fn neighbors4(&self, tile: TileId) -> ([TileId; 4], usize) {
        let x = self.x(tile);
        let y = self.y(tile);
        let mut buf = [0; 4];
        let mut len = 0;
        if y > 0 {
            buf[len] = tile - self.width;
            len += 1;
        }
        if y + 1 < self.height {
            buf[len] = tile + self.width;
            len += 1;
        }
        if x > 0 {
            buf[len] = tile - 1;
            len += 1;
        }
        if x + 1 < self.width {
            buf[len] = tile + 1;
            len += 1;
        }
        (buf, len)
    }

    /// The 8-neighborhood: the 4-neighborhood followed by the diagonals in
    /// up-left, up-right, down-left, down-right order.
    pub fn neighbors8(&self, tile: TileId) -> ([TileId; 8], usize) {
        let x = self.x(tile);
        let y = self.y(tile);
        let (four, four_len) = self.neighbors4(tile);
        let mut buf = [0; 8];
        buf[..four_len].copy_from_slice(&four[..four_len]);
        let mut len = four_len;
        if y > 0 && x > 0 {
            buf[len] = tile - self.width - 1;
            len += 1;
        }
        if y > 0 && x + 1 < self.width {
            buf[len] = tile - self.width + 1;
            len += 1;
        }
        if y + 1 < self.height && x > 0 {
            buf[len] = tile + self.width - 1;
            len += 1;
        }
        if y + 1 < self.height && x + 1 < self.width {
            buf[len] = tile + self.width + 1;
            len += 1;
        }
        (buf, len)
    }

    pub fn is_map_edge(&self, tile: TileId) -> bool {
        let x = self.x(tile);
        let y = self.y(tile);
        x == 0 || y == 0 || x + 1 == self.width || y + 1 == self.height
    }

    /// Land tile with open ocean on a cardinal side. Lakes do not count:
    /// a lake shore offers no escape from an encirclement.
    pub fn is_ocean_shore(&self, tile: TileId) -> bool {
        if !self.is_land(tile) {
            return false;
        }
        let (ns, n) = self.neighbors4(tile);
        ns[..n].iter().any(|&nb| self.terrain(nb) == Terrain::Ocean)
    }

    /// Straight-line distance in tile units.
    pub fn euclidean(&self, a: TileId, b: TileId) -> f64 {
        let dx = self.x(a) as f64 - self.x(b) as f64;
        let dy = self.y(a) as f64 - self.y(b) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Four-directional walking distance, ignoring terrain.
    pub fn manhattan(&self, a: TileId, b: TileId) -> u32 {
        self.x(a).abs_diff(self.x(b)) + self.y(a).abs_diff(self.y(b))
    }
}
