//! Shared world state and external collaborators
//!
//! The world is mutated only by the step engine's effect-commit phase.
//! Everything else reads it through `WorldQuery` or the summary helpers.

pub mod market;
pub mod metrics;
pub mod persistence;
pub mod spatial;

use crate::actor::state::WorldQuery;
use crate::actor::ActorRegistry;
use crate::core::config::{ActorConfig, Config};
use crate::core::types::{ActorId, ResourceKind, Tick, Vec2};
use crate::decision::context::NeighborSummary;
use crate::world::market::MarketLedger;
use crate::world::spatial::SpatialGrid;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const NAMES: [&str; 10] = [
    "Marcus", "Elena", "Thomas", "Sarah", "William", "Ingrid", "Dmitri", "Aiko", "Rosa", "Kofi",
];

const PERSONAS: [&str; 5] = [
    "a pragmatic farmer who values steady work",
    "a curious trader always looking for a bargain",
    "a sociable artisan who crafts when inspired",
    "a cautious laborer saving for hard times",
    "a restless wanderer drawn to new places",
];

pub struct World {
    pub tick: Tick,
    pub registry: ActorRegistry,
    pub grid: SpatialGrid,
    pub market: MarketLedger,
}

impl World {
    pub fn new(config: &Config) -> Self {
        // Cell size roughly half the social radius keeps neighbor
        // queries to a few cells.
        let cell_size = (config.actors.social_radius / 2.0).max(1.0);
        Self {
            tick: 0,
            registry: ActorRegistry::new(),
            grid: SpatialGrid::new(config.step.world_width, config.step.world_height, cell_size),
            market: MarketLedger::new(),
        }
    }

    pub fn spawn_actor(
        &mut self,
        name: String,
        persona: String,
        position: Vec2,
        config: &ActorConfig,
    ) -> ActorId {
        let id = self
            .registry
            .spawn(name, persona, position, config.memory_capacity);
        self.grid.insert(id, position);
        self.market.open_account(id, config.initial_money);
        id
    }

    /// Explicit removal; never happens implicitly mid-tick.
    pub fn remove_actor(&mut self, id: ActorId) {
        self.registry.remove(id);
        self.grid.remove(id);
        self.market.close_account(id);
    }

    /// Spawn the initial population with seeded positions and cycled
    /// personas, so equal seeds give equal worlds.
    pub fn populate(&mut self, config: &Config, rng: &mut ChaCha8Rng) {
        for i in 0..config.actors.count {
            let name = format!("{}-{}", NAMES[i % NAMES.len()], i);
            let persona = PERSONAS[i % PERSONAS.len()].to_string();
            let position = Vec2::new(
                rng.gen_range(0.0..config.step.world_width),
                rng.gen_range(0.0..config.step.world_height),
            );
            self.spawn_actor(name, persona, position, &config.actors);
        }
        tracing::info!(count = config.actors.count, "population spawned");
    }

    pub fn apply_move(&mut self, id: ActorId, target: Vec2) {
        if let Some(actor) = self.registry.get_mut(id) {
            actor.position = target;
            self.grid.apply_move(id, target);
        }
    }

    /// Neighbor lines for a decision prompt, ascending by id
    pub fn neighbor_summaries(&self, actor: ActorId, radius: f32) -> Vec<NeighborSummary> {
        let Some(origin) = self.registry.get(actor) else {
            return Vec::new();
        };
        self.grid
            .neighbors_within(actor, radius)
            .into_iter()
            .filter_map(|id| {
                let other = self.registry.get(id)?;
                Some(NeighborSummary {
                    id,
                    name: other.name.clone(),
                    state: other.state.as_str(),
                    distance: origin.position.distance(&other.position),
                })
            })
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.registry.len()
    }
}

impl WorldQuery for World {
    fn is_in_bounds(&self, position: Vec2) -> bool {
        self.grid.is_in_bounds(position)
    }

    fn actor_position(&self, actor: ActorId) -> Option<Vec2> {
        self.registry.get(actor).map(|a| a.position)
    }

    fn balance(&self, actor: ActorId) -> f64 {
        self.market.balance(actor)
    }

    fn holding(&self, actor: ActorId, resource: ResourceKind) -> f32 {
        self.market.holding(actor, resource)
    }

    fn price(&self, resource: ResourceKind) -> f64 {
        self.market.price(resource)
    }
}
