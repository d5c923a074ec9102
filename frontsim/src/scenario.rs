//! ASCII scenario maps.
//!
//! A scenario is a plain-text tile grid, one character per tile:
//!
//! | Char       | Tile                             |
//! |------------|----------------------------------|
//! | `.`        | plains                           |
//! | `^`        | highland                         |
//! | `M`        | mountain                         |
//! | `-`        | lake                             |
//! | `~`        | ocean                            |
//! | `A`..=`H`  | plains claimed by that player    |
//!
//! Blank lines and lines starting with `#` are skipped. Players are
//! registered in letter order, so `A` always gets the lowest id.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use frontsim_core::{DefaultRules, Game, SimConfig, Simulation, Terrain, TileGrid};

/// A parsed map plus the spawn claims painted onto it.
#[derive(Debug, Clone)]
pub struct Scenario {
    width: u32,
    height: u32,
    /// Row-major, `y * width + x`.
    terrain: Vec<Terrain>,
    /// Claimed coordinates per player letter, in letter order.
    claims: Vec<(char, Vec<(u32, u32)>)>,
}

impl Scenario {
    pub fn parse(text: &str) -> Result<Self> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        if rows.is_empty() {
            bail!("scenario has no map rows");
        }

        let width = rows[0].chars().count();
        let mut terrain = Vec::with_capacity(width * rows.len());
        let mut claims: BTreeMap<char, Vec<(u32, u32)>> = BTreeMap::new();

        for (y, row) in rows.iter().enumerate() {
            let cells: Vec<char> = row.chars().collect();
            if cells.len() != width {
                bail!("row {} is {} tiles wide, expected {}", y, cells.len(), width);
            }
            for (x, &ch) in cells.iter().enumerate() {
                let tile = match ch {
                    '.' => Terrain::Plains,
                    '^' => Terrain::Highland,
                    'M' => Terrain::Mountain,
                    '-' => Terrain::Lake,
                    '~' => Terrain::Ocean,
                    'A'..='H' => {
                        claims.entry(ch).or_default().push((x as u32, y as u32));
                        Terrain::Plains
                    }
                    other => bail!("unknown tile {:?} at ({}, {})", other, x, y),
                };
                terrain.push(tile);
            }
        }

        Ok(Self {
            width: width as u32,
            height: rows.len() as u32,
            terrain,
            claims: claims.into_iter().collect(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }

    /// All-plains map with `players` spawn squares laid out on a grid.
    ///
    /// The stand-in for runs without a scenario file. Placement is
    /// deterministic, so two runs of the same dimensions produce the same
    /// map.
    pub fn generated(width: u32, height: u32, players: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("map must be at least 1x1, got {width}x{height}");
        }
        if players > 8 {
            bail!("generated maps support at most 8 players, got {players}");
        }

        let terrain = vec![Terrain::Plains; (width * height) as usize];
        let mut claims = Vec::new();

        if players > 0 {
            let cols = (f64::from(players)).sqrt().ceil() as u32;
            let rows = players.div_ceil(cols);
            let cell_w = width / cols;
            let cell_h = height / rows;
            if cell_w < 2 || cell_h < 2 {
                bail!("{width}x{height} map is too small for {players} players");
            }
            let side = (cell_w.min(cell_h) / 2).max(1);

            for i in 0..players {
                let x0 = (i % cols) * cell_w + (cell_w - side) / 2;
                let y0 = (i / cols) * cell_h + (cell_h - side) / 2;
                let mut tiles = Vec::with_capacity((side * side) as usize);
                for y in y0..y0 + side {
                    for x in x0..x0 + side {
                        tiles.push((x, y));
                    }
                }
                claims.push((char::from(b'A' + i as u8), tiles));
            }
        }

        Ok(Self {
            width,
            height,
            terrain,
            claims,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn num_players(&self) -> usize {
        self.claims.len()
    }

    /// Build a running simulation from this map.
    ///
    /// Each claimed letter becomes a player named after it, holding its
    /// claimed tiles and `troops` in the pool.
    pub fn spawn(&self, config: SimConfig, seed: u64, troops: f64) -> Simulation {
        let mut grid = TileGrid::new(self.width, self.height, Terrain::Plains);
        for y in 0..self.height {
            for x in 0..self.width {
                let terrain = self.terrain[(y * self.width + x) as usize];
                if terrain != Terrain::Plains {
                    let tile = grid.tile_at(x, y);
                    grid.set_terrain(tile, terrain);
                }
            }
        }

        let mut game = Game::new(grid, config, seed);
        for (letter, tiles) in &self.claims {
            let id = game.add_player(letter.to_string(), None);
            game.player_mut(id).add_troops(troops);
            for &(x, y) in tiles {
                let tile = game.grid().tile_at(x, y);
                game.conquer(id, tile);
            }
        }

        Simulation::new(game, Box::new(DefaultRules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontsim_core::Owner;

    const POND: &str = "\
# two banks, lake between
AA..--..BB
AA..--..BB
..^....M..
";

    #[test]
    fn parse_reads_terrain_and_claims() {
        let scenario = Scenario::parse(POND).unwrap();
        assert_eq!(scenario.width(), 10);
        assert_eq!(scenario.height(), 3);
        assert_eq!(scenario.num_players(), 2);

        let sim = scenario.spawn(SimConfig::default(), 1, 100.0);
        let grid = sim.game.grid();
        assert_eq!(grid.terrain(grid.tile_at(4, 0)), Terrain::Lake);
        assert_eq!(grid.terrain(grid.tile_at(2, 2)), Terrain::Highland);
        assert_eq!(grid.terrain(grid.tile_at(7, 2)), Terrain::Mountain);
        assert_eq!(grid.terrain(grid.tile_at(0, 0)), Terrain::Plains);
    }

    #[test]
    fn letters_become_players_in_order() {
        let scenario = Scenario::parse(POND).unwrap();
        let sim = scenario.spawn(SimConfig::default(), 1, 250.0);

        let a = sim.game.player(1);
        let b = sim.game.player(2);
        assert_eq!(a.name(), "A");
        assert_eq!(b.name(), "B");
        assert_eq!(a.num_tiles(), 4);
        assert_eq!(b.num_tiles(), 4);
        assert_eq!(a.troops(), 250.0);
        assert_eq!(sim.game.owner(sim.game.grid().tile_at(0, 0)), Owner::Player(1));
        assert_eq!(sim.game.owner(sim.game.grid().tile_at(9, 1)), Owner::Player(2));
        assert_eq!(sim.game.owner(sim.game.grid().tile_at(2, 0)), Owner::Unclaimed);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Scenario::parse("AAA\nAA\n").unwrap_err();
        assert!(err.to_string().contains("row 1"), "{err}");
    }

    #[test]
    fn unknown_tiles_are_rejected() {
        let err = Scenario::parse("A?B\n").unwrap_err();
        assert!(err.to_string().contains("unknown tile"), "{err}");
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(Scenario::parse("# only comments\n\n").is_err());
    }

    #[test]
    fn generated_map_spreads_the_players() {
        let scenario = Scenario::generated(32, 32, 4).unwrap();
        assert_eq!(scenario.num_players(), 4);

        let sim = scenario.spawn(SimConfig::default(), 9, 100.0);
        let first = sim.game.player(1).num_tiles();
        assert!(first > 0);
        for player in sim.game.players() {
            assert!(player.is_alive());
            assert_eq!(player.num_tiles(), first);
        }
    }

    #[test]
    fn generated_map_rejects_cramped_layouts() {
        assert!(Scenario::generated(3, 3, 8).is_err());
        assert!(Scenario::generated(0, 10, 1).is_err());
        assert!(Scenario::generated(64, 64, 9).is_err());
    }
}
