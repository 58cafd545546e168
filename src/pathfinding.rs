//! Breadth-first route search over the hex grid.
//!
//! Every edge costs one step. Frontiers are expanded in ascending tile id so
//! that ties always resolve the same way: the lowest-id destination of the
//! nearest layer wins, and each tile keeps the lowest-id parent that reached it.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use crate::world::{Grid, Tile, TileId};

pub struct Pathfinder<'a> {
    grid: &'a Grid,
}

impl<'a> Pathfinder<'a> {
    pub fn new(grid: &'a Grid) -> Self {
        Self { grid }
    }

    /// Shortest route from `start` to the nearest of `destinations`, both ends
    /// included. Restricted and land tiles are impassable; the start is always
    /// usable.
    pub fn shortest_path(
        &self,
        start: TileId,
        destinations: &BTreeSet<TileId>,
    ) -> Option<Vec<TileId>> {
        if destinations.is_empty() {
            return None;
        }
        self.search(start, |id| destinations.contains(&id), Tile::is_passable, None)
    }

    /// Route to the nearest unrestricted tile. Restriction is waived only at
    /// the start; when the zone is wider than that, a second pass lets the
    /// route cross restricted water so the ship can still get out.
    pub fn escape_path(&self, start: TileId) -> Option<Vec<TileId>> {
        let free = |id: TileId| {
            id != start
                && self
                    .grid
                    .tile(id)
                    .is_some_and(|tile| tile.is_passable())
        };
        self.search(start, free, Tile::is_passable, None)
            .or_else(|| self.search(start, free, |tile| tile.kind.is_passable(), None))
    }

    pub fn is_reachable(&self, start: TileId, destinations: &BTreeSet<TileId>) -> bool {
        self.shortest_path(start, destinations).is_some()
    }

    pub fn is_reachable_within_distance(
        &self,
        start: TileId,
        destinations: &BTreeSet<TileId>,
        max_steps: u32,
    ) -> bool {
        if destinations.is_empty() {
            return false;
        }
        self.search(
            start,
            |id| destinations.contains(&id),
            Tile::is_passable,
            Some(max_steps),
        )
        .is_some()
    }

    /// Wandering route for a ship without an objective: one of the farthest
    /// tiles reachable within `max_steps`, drawn from `rng`. Returns `[start]`
    /// when boxed in.
    pub fn explore(&self, start: TileId, max_steps: u32, rng: &mut impl Rng) -> Vec<TileId> {
        let (parents, frontier) = self.flood(start, max_steps);
        if frontier.is_empty() {
            return vec![start];
        }
        let pick = frontier[rng.gen_range(0..frontier.len())];
        reconstruct(&parents, start, pick)
    }

    fn search(
        &self,
        start: TileId,
        is_goal: impl Fn(TileId) -> bool,
        passable: impl Fn(&Tile) -> bool,
        max_steps: Option<u32>,
    ) -> Option<Vec<TileId>> {
        self.grid.tile(start)?;
        let mut parents: BTreeMap<TileId, TileId> = BTreeMap::new();
        let mut visited: BTreeSet<TileId> = BTreeSet::from([start]);
        let mut frontier = vec![start];
        let mut depth = 0;

        loop {
            if let Some(goal) = frontier.iter().copied().filter(|id| is_goal(*id)).min() {
                return Some(reconstruct(&parents, start, goal));
            }
            if frontier.is_empty() || max_steps.is_some_and(|max| depth >= max) {
                return None;
            }
            let mut next = Vec::new();
            for current in &frontier {
                for neighbor in self.grid.neighbors(*current) {
                    if visited.contains(neighbor) {
                        continue;
                    }
                    let Some(tile) = self.grid.tile(*neighbor) else {
                        continue;
                    };
                    if !passable(tile) {
                        continue;
                    }
                    visited.insert(*neighbor);
                    parents.insert(*neighbor, *current);
                    next.push(*neighbor);
                }
            }
            next.sort();
            frontier = next;
            depth += 1;
        }
    }

    /// Parents of every tile within `max_steps`, plus the tiles of the
    /// outermost non-empty layer in ascending order.
    fn flood(&self, start: TileId, max_steps: u32) -> (BTreeMap<TileId, TileId>, Vec<TileId>) {
        let mut parents = BTreeMap::new();
        let mut visited = BTreeSet::from([start]);
        let mut frontier = vec![start];
        let mut outermost = Vec::new();
        for _ in 0..max_steps {
            let mut next = Vec::new();
            for current in &frontier {
                for neighbor in self.grid.neighbors(*current) {
                    if visited.contains(neighbor) {
                        continue;
                    }
                    if !self.grid.tile(*neighbor).is_some_and(Tile::is_passable) {
                        continue;
                    }
                    visited.insert(*neighbor);
                    parents.insert(*neighbor, *current);
                    next.push(*neighbor);
                }
            }
            if next.is_empty() {
                break;
            }
            next.sort();
            outermost = next.clone();
            frontier = next;
        }
        (parents, outermost)
    }
}

fn reconstruct(parents: &BTreeMap<TileId, TileId>, start: TileId, goal: TileId) -> Vec<TileId> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        match parents.get(&current) {
            Some(parent) => {
                path.push(*parent);
                current = *parent;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::world::{Coord, TileKind};

    /// Builds a grid from rows of `.` (ocean) and `#` (land), ids row-major.
    fn ocean(rows: &[&str]) -> Grid {
        let width = rows[0].len() as i32;
        let mut tiles = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, cell) in row.chars().enumerate() {
                let kind = if cell == '#' {
                    TileKind::Land
                } else {
                    TileKind::DeepOcean
                };
                let id = TileId::new((y as i32 * width + x as i32) as u32);
                tiles.push(Tile::new(id, kind, Coord::new(x as i32, y as i32)));
            }
        }
        Grid::new(tiles).unwrap()
    }

    fn ids(raw: &[u32]) -> Vec<TileId> {
        raw.iter().copied().map(TileId::new).collect()
    }

    fn set(raw: &[u32]) -> BTreeSet<TileId> {
        raw.iter().copied().map(TileId::new).collect()
    }

    #[test]
    fn straight_line_path_includes_both_ends() {
        let grid = ocean(&["....."]);
        let finder = Pathfinder::new(&grid);
        let path = finder.shortest_path(TileId::new(0), &set(&[4])).unwrap();
        assert_eq!(path, ids(&[0, 1, 2, 3, 4]));
    }

    #[test]
    fn start_inside_destinations_is_a_single_tile_path() {
        let grid = ocean(&["..."]);
        let finder = Pathfinder::new(&grid);
        let path = finder.shortest_path(TileId::new(1), &set(&[1, 2])).unwrap();
        assert_eq!(path, ids(&[1]));
    }

    #[test]
    fn equal_distance_prefers_lowest_destination_id() {
        let grid = ocean(&[".....", ".....", "....."]);
        let finder = Pathfinder::new(&grid);
        // 7 is the middle of row one; 5 and 9 are both two steps away.
        let path = finder.shortest_path(TileId::new(7), &set(&[9, 5])).unwrap();
        assert_eq!(*path.last().unwrap(), TileId::new(5));
    }

    #[test]
    fn land_blocks_the_way() {
        let grid = ocean(&["..#..", "..#..", "..#.."]);
        let finder = Pathfinder::new(&grid);
        assert!(!finder.is_reachable(TileId::new(0), &set(&[4])));
    }

    #[test]
    fn restricted_tiles_are_impassable_but_start_is_not() {
        let mut grid = ocean(&["....."]);
        grid.tile_mut(TileId::new(2)).unwrap().restricted = true;
        let finder = Pathfinder::new(&grid);
        assert!(!finder.is_reachable(TileId::new(0), &set(&[4])));

        let mut grid = ocean(&["....."]);
        grid.tile_mut(TileId::new(0)).unwrap().restricted = true;
        let finder = Pathfinder::new(&grid);
        assert!(finder.is_reachable(TileId::new(0), &set(&[4])));
    }

    #[test]
    fn bounded_reachability_respects_step_limit() {
        let grid = ocean(&["......"]);
        let finder = Pathfinder::new(&grid);
        assert!(finder.is_reachable_within_distance(TileId::new(0), &set(&[3]), 3));
        assert!(!finder.is_reachable_within_distance(TileId::new(0), &set(&[3]), 2));
        assert!(finder.is_reachable_within_distance(TileId::new(3), &set(&[3]), 0));
    }

    #[test]
    fn escape_finds_nearest_free_tile() {
        let mut grid = ocean(&["....."]);
        for id in [1, 2] {
            grid.tile_mut(TileId::new(id)).unwrap().restricted = true;
        }
        let finder = Pathfinder::new(&grid);
        let path = finder.escape_path(TileId::new(1)).unwrap();
        assert_eq!(path, ids(&[1, 0]));
    }

    #[test]
    fn escape_crosses_a_wide_zone() {
        let mut grid = ocean(&["......."]);
        for id in 0..5 {
            grid.tile_mut(TileId::new(id)).unwrap().restricted = true;
        }
        let finder = Pathfinder::new(&grid);
        let path = finder.escape_path(TileId::new(2)).unwrap();
        assert_eq!(*path.last().unwrap(), TileId::new(5));
    }

    #[test]
    fn explore_is_deterministic_for_a_seed() {
        let grid = ocean(&["......", "......", "......", "......"]);
        let finder = Pathfinder::new(&grid);
        let a = finder.explore(TileId::new(7), 2, &mut ChaCha8Rng::seed_from_u64(9));
        let b = finder.explore(TileId::new(7), 2, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a[0], TileId::new(7));
    }

    #[test]
    fn explore_stays_put_when_boxed_in() {
        let grid = ocean(&["#.#"]);
        let finder = Pathfinder::new(&grid);
        let path = finder.explore(TileId::new(1), 3, &mut ChaCha8Rng::seed_from_u64(1));
        assert_eq!(path, ids(&[1]));
    }
}
