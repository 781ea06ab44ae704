//! Sparse hash grid for neighbor queries
//!
//! Cells are only materialized where actors stand. Neighbor queries
//! return ids in ascending order so downstream prompt construction is
//! deterministic.

use crate::core::types::{ActorId, Vec2};
use ahash::AHashMap;

pub struct SpatialGrid {
    cell_size: f32,
    width: f32,
    height: f32,
    cells: AHashMap<(i32, i32), Vec<ActorId>>,
    positions: AHashMap<ActorId, Vec2>,
}

impl SpatialGrid {
    pub fn new(width: f32, height: f32, cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(0.001),
            width,
            height,
            cells: AHashMap::new(),
            positions: AHashMap::new(),
        }
    }

    #[inline]
    fn cell_coord(&self, pos: Vec2) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
        )
    }

    pub fn is_in_bounds(&self, pos: Vec2) -> bool {
        pos.x >= 0.0 && pos.y >= 0.0 && pos.x < self.width && pos.y < self.height
    }

    pub fn insert(&mut self, actor: ActorId, pos: Vec2) {
        self.remove(actor);
        let coord = self.cell_coord(pos);
        self.cells.entry(coord).or_default().push(actor);
        self.positions.insert(actor, pos);
    }

    pub fn remove(&mut self, actor: ActorId) {
        if let Some(pos) = self.positions.remove(&actor) {
            let coord = self.cell_coord(pos);
            if let Some(cell) = self.cells.get_mut(&coord) {
                cell.retain(|&a| a != actor);
                if cell.is_empty() {
                    self.cells.remove(&coord);
                }
            }
        }
    }

    pub fn position(&self, actor: ActorId) -> Option<Vec2> {
        self.positions.get(&actor).copied()
    }

    /// Move an actor to a new cell. Out-of-bounds targets are a caller
    /// bug at this layer; validation happens in the state machine.
    pub fn apply_move(&mut self, actor: ActorId, target: Vec2) {
        self.insert(actor, target);
    }

    /// All other actors within `radius`, ascending by id
    pub fn neighbors_within(&self, actor: ActorId, radius: f32) -> Vec<ActorId> {
        let Some(center) = self.position(actor) else {
            return Vec::new();
        };

        let reach = (radius / self.cell_size).ceil() as i32;
        let (cx, cy) = self.cell_coord(center);

        let mut found = Vec::new();
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                if let Some(cell) = self.cells.get(&(cx + dx, cy + dy)) {
                    for &other in cell {
                        if other == actor {
                            continue;
                        }
                        if let Some(pos) = self.positions.get(&other) {
                            if center.distance(pos) <= radius {
                                found.push(other);
                            }
                        }
                    }
                }
            }
        }
        found.sort();
        found
    }

    /// Rebuild from authoritative actor positions (snapshot restore)
    pub fn rebuild(&mut self, actors: impl Iterator<Item = (ActorId, Vec2)>) {
        self.cells.clear();
        self.positions.clear();
        for (actor, pos) in actors {
            self.insert(actor, pos);
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGrid {
        SpatialGrid::new(100.0, 100.0, 10.0)
    }

    #[test]
    fn test_bounds() {
        let g = grid();
        assert!(g.is_in_bounds(Vec2::new(0.0, 0.0)));
        assert!(g.is_in_bounds(Vec2::new(99.9, 99.9)));
        assert!(!g.is_in_bounds(Vec2::new(100.0, 50.0)));
        assert!(!g.is_in_bounds(Vec2::new(-0.1, 50.0)));
    }

    #[test]
    fn test_neighbors_within_radius() {
        let mut g = grid();
        g.insert(ActorId(1), Vec2::new(50.0, 50.0));
        g.insert(ActorId(2), Vec2::new(53.0, 50.0));
        g.insert(ActorId(3), Vec2::new(80.0, 80.0));

        let neighbors = g.neighbors_within(ActorId(1), 5.0);
        assert_eq!(neighbors, vec![ActorId(2)]);
    }

    #[test]
    fn test_neighbors_sorted_ascending() {
        let mut g = grid();
        g.insert(ActorId(5), Vec2::new(50.0, 50.0));
        g.insert(ActorId(9), Vec2::new(51.0, 50.0));
        g.insert(ActorId(2), Vec2::new(49.0, 50.0));
        g.insert(ActorId(7), Vec2::new(50.0, 51.0));

        let neighbors = g.neighbors_within(ActorId(5), 5.0);
        assert_eq!(neighbors, vec![ActorId(2), ActorId(7), ActorId(9)]);
    }

    #[test]
    fn test_move_updates_queries() {
        let mut g = grid();
        g.insert(ActorId(1), Vec2::new(10.0, 10.0));
        g.insert(ActorId(2), Vec2::new(12.0, 10.0));

        g.apply_move(ActorId(2), Vec2::new(90.0, 90.0));
        assert!(g.neighbors_within(ActorId(1), 5.0).is_empty());
        assert_eq!(g.position(ActorId(2)), Some(Vec2::new(90.0, 90.0)));
    }

    #[test]
    fn test_remove() {
        let mut g = grid();
        g.insert(ActorId(1), Vec2::new(10.0, 10.0));
        g.remove(ActorId(1));
        assert!(g.is_empty());
        assert_eq!(g.position(ActorId(1)), None);
    }

    #[test]
    fn test_radius_spanning_cells() {
        let mut g = grid();
        g.insert(ActorId(1), Vec2::new(5.0, 5.0));
        g.insert(ActorId(2), Vec2::new(35.0, 5.0));

        assert!(g.neighbors_within(ActorId(1), 20.0).is_empty());
        assert_eq!(g.neighbors_within(ActorId(1), 30.0), vec![ActorId(2)]);
    }
}
