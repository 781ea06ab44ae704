//! Actors and the actor registry

pub mod action;
pub mod memory;
pub mod state;

use crate::actor::memory::MemoryBuffer;
use crate::actor::state::ActorState;
use crate::core::types::{ActorId, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A simulated actor
///
/// Owned exclusively by the step engine's registry; mutated only during
/// effect commit, never concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    /// Prompt flavor describing who this actor is
    pub persona: String,
    pub position: Vec2,
    pub state: ActorState,
    /// Remaining ticks of a multi-tick action; the actor does not
    /// request decisions while this is nonzero
    pub busy_ticks: u32,
    /// True while a decision request for this actor is unresolved
    pub decision_in_flight: bool,
    /// Physiological energy in [0, 1]
    pub energy: f32,
    pub health: f32,
    pub age: f32,
    pub employed: bool,
    pub memory: MemoryBuffer,
}

impl Actor {
    pub fn new(
        id: ActorId,
        name: String,
        persona: String,
        position: Vec2,
        memory_capacity: usize,
    ) -> Self {
        Self {
            id,
            name,
            persona,
            position,
            state: ActorState::Idle,
            busy_ticks: 0,
            decision_in_flight: false,
            energy: 1.0,
            health: 1.0,
            age: 30.0,
            employed: false,
            memory: MemoryBuffer::new(memory_capacity),
        }
    }
}

/// Registry of all live actors, ordered by id
///
/// The ordered map makes ascending-id iteration (the effect commit
/// order) free. Ids are never reused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorRegistry {
    actors: BTreeMap<ActorId, Actor>,
    next_id: u64,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(
        &mut self,
        name: String,
        persona: String,
        position: Vec2,
        memory_capacity: usize,
    ) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        self.actors
            .insert(id, Actor::new(id, name, persona, position, memory_capacity));
        id
    }

    /// Reinsert an existing actor (snapshot restore)
    pub fn insert(&mut self, actor: Actor) {
        self.next_id = self.next_id.max(actor.id.0 + 1);
        self.actors.insert(actor.id, actor);
    }

    /// Explicit removal; actors are never removed implicitly mid-tick
    pub fn remove(&mut self, id: ActorId) -> Option<Actor> {
        self.actors.remove(&id)
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// All actor ids in ascending order
    pub fn ids(&self) -> Vec<ActorId> {
        self.actors.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Actor> {
        self.actors.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_assigns_ascending_ids() {
        let mut registry = ActorRegistry::new();
        let a = registry.spawn("A".into(), "".into(), Vec2::default(), 20);
        let b = registry.spawn("B".into(), "".into(), Vec2::default(), 20);
        assert!(a < b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let mut registry = ActorRegistry::new();
        let a = registry.spawn("A".into(), "".into(), Vec2::default(), 20);
        registry.remove(a);
        let b = registry.spawn("B".into(), "".into(), Vec2::default(), 20);
        assert!(b > a);
    }

    #[test]
    fn test_iteration_is_ascending() {
        let mut registry = ActorRegistry::new();
        for i in 0..5 {
            registry.spawn(format!("A{}", i), "".into(), Vec2::default(), 20);
        }
        let ids = registry.ids();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_insert_advances_next_id() {
        let mut registry = ActorRegistry::new();
        registry.insert(Actor::new(
            ActorId(10),
            "X".into(),
            "".into(),
            Vec2::default(),
            20,
        ));
        let next = registry.spawn("Y".into(), "".into(), Vec2::default(), 20);
        assert_eq!(next, ActorId(11));
    }
}
