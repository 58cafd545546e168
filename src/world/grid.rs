use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{HarborId, TileId};
use crate::error::InvariantError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    Land,
    Shore,
    ShallowOcean,
    DeepOcean,
}

impl TileKind {
    pub fn is_passable(self) -> bool {
        !matches!(self, TileKind::Land)
    }

    pub fn is_ocean(self) -> bool {
        matches!(self, TileKind::ShallowOcean | TileKind::DeepOcean)
    }
}

/// Offset coordinate on a hex grid where odd rows are shifted half a tile east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
}

impl Coord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn step(self, direction: Direction) -> Coord {
        let odd = self.y & 1 == 1;
        let (dx, dy) = match (direction, odd) {
            (Direction::East, _) => (1, 0),
            (Direction::West, _) => (-1, 0),
            (Direction::NorthEast, false) => (0, -1),
            (Direction::NorthEast, true) => (1, -1),
            (Direction::NorthWest, false) => (-1, -1),
            (Direction::NorthWest, true) => (0, -1),
            (Direction::SouthEast, false) => (0, 1),
            (Direction::SouthEast, true) => (1, 1),
            (Direction::SouthWest, false) => (-1, 1),
            (Direction::SouthWest, true) => (0, 1),
        };
        Coord::new(self.x + dx, self.y + dy)
    }

    /// Number of hex steps between two coordinates.
    pub fn distance(self, other: Coord) -> u32 {
        let (q1, r1) = self.axial();
        let (q2, r2) = other.axial();
        let dq = q1 - q2;
        let dr = r1 - r2;
        ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2) as u32
    }

    fn axial(self) -> (i32, i32) {
        (self.x - (self.y - (self.y & 1)) / 2, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    East,
    SouthEast,
    SouthWest,
    West,
    NorthWest,
    NorthEast,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
        Direction::NorthEast,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OceanCurrent {
    pub speed: u32,
    pub direction: Direction,
    /// How many garbage piles the current carries off the tile per tick.
    pub intensity: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tile {
    pub id: TileId,
    pub kind: TileKind,
    pub coord: Coord,
    pub restricted: bool,
    pub harbor: Option<HarborId>,
    pub current: Option<OceanCurrent>,
}

impl Tile {
    pub fn new(id: TileId, kind: TileKind, coord: Coord) -> Self {
        Self {
            id,
            kind,
            coord,
            restricted: false,
            harbor: None,
            current: None,
        }
    }

    pub fn is_passable(&self) -> bool {
        self.kind.is_passable() && !self.restricted
    }
}

pub struct Grid {
    tiles: BTreeMap<TileId, Tile>,
    by_coord: HashMap<Coord, TileId>,
    neighbors: BTreeMap<TileId, Vec<TileId>>,
}

impl Grid {
    pub fn new(tiles: Vec<Tile>) -> Result<Self, InvariantError> {
        let mut by_coord = HashMap::with_capacity(tiles.len());
        let mut map = BTreeMap::new();
        for tile in tiles {
            if by_coord.insert(tile.coord, tile.id).is_some() {
                return Err(InvariantError::DuplicateCoord {
                    x: tile.coord.x,
                    y: tile.coord.y,
                });
            }
            if map.contains_key(&tile.id) {
                return Err(InvariantError::DuplicateTile(tile.id));
            }
            map.insert(tile.id, tile);
        }

        let mut neighbors = BTreeMap::new();
        for tile in map.values() {
            let mut adjacent: Vec<TileId> = Direction::ALL
                .iter()
                .filter_map(|dir| by_coord.get(&tile.coord.step(*dir)).copied())
                .collect();
            adjacent.sort();
            neighbors.insert(tile.id, adjacent);
        }

        Ok(Self {
            tiles: map,
            by_coord,
            neighbors,
        })
    }

    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(&id)
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(&id)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn at(&self, coord: Coord) -> Option<TileId> {
        self.by_coord.get(&coord).copied()
    }

    /// Adjacent tiles in ascending id order.
    pub fn neighbors(&self, id: TileId) -> &[TileId] {
        self.neighbors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn neighbor_in(&self, id: TileId, direction: Direction) -> Option<TileId> {
        let tile = self.tiles.get(&id)?;
        self.at(tile.coord.step(direction))
    }

    pub fn distance(&self, a: TileId, b: TileId) -> Option<u32> {
        let a = self.tiles.get(&a)?;
        let b = self.tiles.get(&b)?;
        Some(a.coord.distance(b.coord))
    }

    /// Tiles whose hex distance to `center` is at most `radius`, ascending by id.
    pub fn within(&self, center: TileId, radius: u32) -> Vec<TileId> {
        let Some(origin) = self.tiles.get(&center) else {
            return Vec::new();
        };
        self.tiles
            .values()
            .filter(|tile| tile.coord.distance(origin.coord) <= radius)
            .map(|tile| tile.id)
            .collect()
    }
}
