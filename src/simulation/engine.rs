//! Step engine - orchestrates simulation ticks
//!
//! Each tick: gather eligible actors, fan decision requests out through
//! the coordinator bounded by an in-flight cap, join with a soft
//! deadline, then commit the resulting effects in ascending actor-id
//! order. Requests resolve in whatever order the service answers;
//! commit order never depends on it. The engine is the single authority
//! over world mutation; nothing outside its commit phase writes world
//! state.

use crate::actor::action::Action;
use crate::actor::memory::{Memory, MemoryTag};
use crate::actor::state::{self, ActorState};
use crate::core::config::Config;
use crate::core::error::{AgoraError, Result};
use crate::core::types::{ActorId, Provenance, ResourceKind, Tick};
use crate::decision::context::build_request;
use crate::decision::coordinator::DecisionCoordinator;
use crate::decision::{DecisionRequest, DecisionResponse, GenerationParams};
use crate::simulation::effects::{EffectQueue, PendingEffect};
use crate::world::market::{TradeOutcome, TradeSide};
use crate::world::metrics::MetricsCollector;
use crate::world::persistence::{autosave_path, Snapshot};
use crate::world::World;
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

/// Lifecycle of a simulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Running,
    Paused,
    Completed,
    Aborted,
}

/// What happened during one tick
#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub tick: Tick,
    pub eligible: usize,
    pub cache_hits: usize,
    pub live: usize,
    pub fallback: usize,
    /// Actors whose decision missed the tick deadline and idled
    pub deadline_defaulted: usize,
    pub effects_applied: usize,
}

pub struct StepEngine {
    config: Config,
    world: World,
    coordinator: Arc<DecisionCoordinator>,
    metrics: Arc<MetricsCollector>,
    /// Bounds concurrent submissions (backpressure valve)
    in_flight_limit: Arc<Semaphore>,
    /// Actors with an unresolved decision request, across ticks.
    /// Guarantees at most one request in flight per actor even when a
    /// late response outlives its tick.
    in_flight_actors: Arc<Mutex<AHashSet<ActorId>>>,
    run_state: RunState,
    run_id: Uuid,
}

impl StepEngine {
    pub fn new(
        config: Config,
        world: World,
        coordinator: Arc<DecisionCoordinator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let in_flight_limit = Arc::new(Semaphore::new(config.step.max_in_flight));
        Self {
            config,
            world,
            coordinator,
            metrics,
            in_flight_limit,
            in_flight_actors: Arc::new(Mutex::new(AHashSet::new())),
            run_state: RunState::Initialized,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn pause(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.run_state == RunState::Paused {
            self.run_state = RunState::Running;
        }
    }

    pub fn abort(&mut self) {
        self.run_state = RunState::Aborted;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.world, self.run_id, self.config.step.seed)
    }

    /// Run until max_steps, pause, or abort.
    pub async fn run(&mut self) -> Result<()> {
        if self.run_state == RunState::Initialized {
            self.run_state = RunState::Running;
        }

        while self.run_state == RunState::Running && self.world.tick < self.config.step.max_steps {
            let summary = self.step().await?;

            let interval = self.config.step.metrics_interval;
            if interval > 0 && summary.tick % interval == 0 {
                let snapshot = self.metrics.snapshot();
                tracing::info!(
                    tick = summary.tick,
                    eligible = summary.eligible,
                    cache_hits = summary.cache_hits,
                    live = summary.live,
                    fallback = summary.fallback,
                    deadline_defaulted = summary.deadline_defaulted,
                    fallback_rate = format!("{:.2}", snapshot.fallback_rate()),
                    "tick complete"
                );
            }

            let autosave = self.config.step.autosave_interval;
            if autosave > 0 && self.world.tick % autosave == 0 {
                let path = autosave_path(Path::new(&self.config.output.directory), self.world.tick);
                self.snapshot().save(&path)?;
                tracing::debug!(path = %path.display(), "autosave written");
            }
        }

        if self.run_state == RunState::Running {
            self.run_state = RunState::Completed;
        }
        Ok(())
    }

    /// Advance the simulation by one tick.
    pub async fn step(&mut self) -> Result<TickSummary> {
        match self.run_state {
            RunState::Initialized => self.run_state = RunState::Running,
            RunState::Running => {}
            other => {
                return Err(AgoraError::InvalidAction(format!(
                    "cannot step while {:?}",
                    other
                )))
            }
        }

        let tick = self.world.tick;
        let deadline = Instant::now() + Duration::from_millis(self.config.step.tick_deadline_ms);

        let eligible = self.gather_eligible();
        let requests = self.build_requests(&eligible, tick);

        for request in &requests {
            self.in_flight_actors
                .lock()
                .expect("in-flight lock poisoned")
                .insert(request.actor);
            if let Some(actor) = self.world.registry.get_mut(request.actor) {
                actor.state = ActorState::Thinking;
                actor.decision_in_flight = true;
            }
        }

        let (mut responses, deadline_hit) = self.fan_out(requests, deadline).await;

        let mut queue = EffectQueue::new();
        let mut cache_hits = 0;
        let mut live = 0;
        let mut fallback = 0;
        let mut deadline_defaulted = 0;

        for &id in &eligible {
            let Some(actor) = self.world.registry.get(id) else {
                continue;
            };
            let response = match responses.remove(&id) {
                Some(response) => {
                    match response.provenance {
                        Provenance::CacheHit => cache_hits += 1,
                        Provenance::Live => live += 1,
                        Provenance::Fallback => fallback += 1,
                    }
                    response
                }
                None => {
                    deadline_defaulted += 1;
                    DecisionResponse {
                        text: "idle".into(),
                        provenance: Provenance::Fallback,
                        latency: Duration::ZERO,
                    }
                }
            };
            queue.push(state::decide(
                actor,
                &response,
                &self.world,
                &self.config.actors,
                tick,
            ));
        }

        if deadline_hit {
            tracing::warn!(
                tick,
                defaulted = deadline_defaulted,
                "tick deadline exceeded; unresolved actors idle this tick"
            );
        }

        let mut effects_applied = 0;
        for effect in queue.drain_ordered() {
            self.apply_effect(effect);
            effects_applied += 1;
        }

        self.world.tick += 1;
        self.metrics.set_live_actors(self.world.live_count());
        self.metrics.set_cache_entries(self.coordinator.cache_len());

        Ok(TickSummary {
            tick,
            eligible: eligible.len(),
            cache_hits,
            live,
            fallback,
            deadline_defaulted,
            effects_applied,
        })
    }

    /// Actors that will request a decision this tick. Actors mid
    /// multi-tick action burn a duration tick instead; actors whose
    /// previous request is still unresolved are skipped entirely.
    fn gather_eligible(&mut self) -> Vec<ActorId> {
        let in_flight = self
            .in_flight_actors
            .lock()
            .expect("in-flight lock poisoned")
            .clone();

        let mut eligible = Vec::new();
        for actor in self.world.registry.iter_mut() {
            actor.decision_in_flight = in_flight.contains(&actor.id);

            if actor.busy_ticks > 0 {
                actor.busy_ticks -= 1;
                if actor.busy_ticks == 0 {
                    actor.state = ActorState::Idle;
                }
                continue;
            }
            if actor.decision_in_flight {
                continue;
            }
            eligible.push(actor.id);
        }
        eligible
    }

    /// Serialize decision contexts, in parallel above the configured
    /// threshold.
    fn build_requests(&self, eligible: &[ActorId], tick: Tick) -> Vec<DecisionRequest> {
        let params = GenerationParams {
            max_tokens: self.config.decision.max_tokens,
            temperature: self.config.decision.temperature,
        };
        let radius = self.config.actors.social_radius;
        let world = &self.world;

        let build = |id: &ActorId| -> Option<DecisionRequest> {
            let actor = world.registry.get(*id)?;
            let neighbors = world.neighbor_summaries(*id, radius);
            Some(build_request(actor, &neighbors, tick, params.clone()))
        };

        if eligible.len() >= self.config.step.parallel_threshold {
            eligible.par_iter().filter_map(build).collect()
        } else {
            eligible.iter().filter_map(build).collect()
        }
    }

    /// Submit all requests concurrently and collect responses until the
    /// deadline. Late tasks are not cancelled; they resolve in the
    /// background, clear their in-flight mark and still warm the cache.
    async fn fan_out(
        &self,
        requests: Vec<DecisionRequest>,
        deadline: Instant,
    ) -> (AHashMap<ActorId, DecisionResponse>, bool) {
        let total = requests.len();
        let (tx, mut rx) = mpsc::channel::<(ActorId, DecisionResponse)>(total.max(1));

        let mut submitted = 0;
        for request in &requests {
            let permit = match timeout_at(deadline, self.in_flight_limit.clone().acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                // Semaphore closed cannot happen; deadline while waiting
                // for capacity leaves the rest of the tick to defaults.
                _ => break,
            };

            let request = request.clone();
            let coordinator = self.coordinator.clone();
            let in_flight = self.in_flight_actors.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let id = request.actor;
                let response = coordinator.submit(request).await;
                in_flight
                    .lock()
                    .expect("in-flight lock poisoned")
                    .remove(&id);
                let _ = tx.send((id, response)).await;
                drop(permit);
            });
            submitted += 1;
        }
        drop(tx);

        // Requests that never got a permit are no longer in flight.
        for request in &requests[submitted..] {
            self.in_flight_actors
                .lock()
                .expect("in-flight lock poisoned")
                .remove(&request.actor);
        }

        let mut responses = AHashMap::with_capacity(submitted);
        let mut deadline_hit = submitted < total;
        loop {
            match timeout_at(deadline, rx.recv()).await {
                Ok(Some((id, response))) => {
                    responses.insert(id, response);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }
        (responses, deadline_hit)
    }

    /// Apply one validated effect to the world. This is the only place
    /// world state changes.
    fn apply_effect(&mut self, effect: PendingEffect) {
        let PendingEffect { actor: id, action, tick } = effect;
        self.metrics.record_action(action.kind());

        let cfg = self.config.actors.clone();
        let still_in_flight = self
            .in_flight_actors
            .lock()
            .expect("in-flight lock poisoned")
            .contains(&id);

        match action {
            Action::Idle => {
                if let Some(actor) = self.world.registry.get_mut(id) {
                    actor.state = ActorState::Idle;
                }
            }
            Action::Rest => {
                if let Some(actor) = self.world.registry.get_mut(id) {
                    actor.state = ActorState::Idle;
                    actor.energy = (actor.energy + cfg.rest_recovery).min(1.0);
                    actor.memory.record(Memory::new(
                        "rested and recovered",
                        tick,
                        0.1,
                        MemoryTag::Observation,
                    ));
                }
            }
            Action::Move { target } => {
                let distance = self
                    .world
                    .registry
                    .get(id)
                    .map(|a| a.position.distance(&target))
                    .unwrap_or(0.0);
                self.world.apply_move(id, target);
                if let Some(actor) = self.world.registry.get_mut(id) {
                    actor.state = ActorState::Moving;
                    actor.busy_ticks = (distance / cfg.move_speed).ceil() as u32;
                    actor.memory.record(Memory::new(
                        format!("traveled to ({:.1}, {:.1})", target.x, target.y),
                        tick,
                        0.3,
                        MemoryTag::Movement,
                    ));
                }
            }
            Action::Talk { target } => {
                let names = match (self.world.registry.get(id), self.world.registry.get(target)) {
                    (Some(a), Some(b)) => Some((a.name.clone(), b.name.clone())),
                    _ => None,
                };
                if let Some((own_name, target_name)) = names {
                    if let Some(actor) = self.world.registry.get_mut(id) {
                        actor.state = ActorState::Socializing;
                        actor.busy_ticks = 1;
                        actor.memory.record(Memory::new(
                            format!("talked with {}", target_name),
                            tick,
                            0.6,
                            MemoryTag::Social,
                        ));
                    }
                    if let Some(other) = self.world.registry.get_mut(target) {
                        other.memory.record(Memory::new(
                            format!("{} stopped by to talk", own_name),
                            tick,
                            0.5,
                            MemoryTag::Social,
                        ));
                    }
                } else if let Some(actor) = self.world.registry.get_mut(id) {
                    // Target vanished between validation and commit.
                    actor.state = ActorState::Idle;
                }
            }
            Action::Work => {
                self.world.market.pay_wage(id, cfg.wage);
                if let Some(actor) = self.world.registry.get_mut(id) {
                    actor.state = ActorState::Working;
                    actor.busy_ticks = 1;
                    actor.employed = true;
                    actor.energy = (actor.energy - cfg.work_cost).max(0.0);
                    actor.memory.record(Memory::new(
                        format!("worked a shift for {:.0}", cfg.wage),
                        tick,
                        0.4,
                        MemoryTag::Work,
                    ));
                }
            }
            Action::Create { item } => {
                self.world
                    .market
                    .deposit_goods(id, ResourceKind::Luxury, 1.0);
                if let Some(actor) = self.world.registry.get_mut(id) {
                    actor.state = ActorState::Creating;
                    actor.busy_ticks = 2;
                    actor.energy = (actor.energy - cfg.create_cost).max(0.0);
                    actor.memory.record(Memory::new(
                        format!("created {}", item),
                        tick,
                        0.7,
                        MemoryTag::Work,
                    ));
                }
            }
            Action::Buy { resource, quantity } => {
                self.apply_trade(id, TradeSide::Buy, resource, quantity, tick);
            }
            Action::Sell { resource, quantity } => {
                self.apply_trade(id, TradeSide::Sell, resource, quantity, tick);
            }
        }

        if let Some(actor) = self.world.registry.get_mut(id) {
            actor.decision_in_flight = still_in_flight;
        }
    }

    fn apply_trade(
        &mut self,
        id: ActorId,
        side: TradeSide,
        resource: ResourceKind,
        quantity: f32,
        tick: Tick,
    ) {
        let outcome = self.world.market.apply_trade(id, side, resource, quantity);
        let verb = match side {
            TradeSide::Buy => "bought",
            TradeSide::Sell => "sold",
        };
        if let Some(actor) = self.world.registry.get_mut(id) {
            actor.state = ActorState::Idle;
            let (text, importance) = match &outcome {
                TradeOutcome::Applied { total_price, .. } => (
                    format!(
                        "{} {:.1} {} for {:.1}",
                        verb,
                        quantity,
                        resource.as_str(),
                        total_price
                    ),
                    0.5,
                ),
                TradeOutcome::Rejected(reason) => (
                    format!(
                        "failed to {} {}: {}",
                        match side {
                            TradeSide::Buy => "buy",
                            TradeSide::Sell => "sell",
                        },
                        resource.as_str(),
                        reason.as_str()
                    ),
                    0.4,
                ),
            };
            actor
                .memory
                .record(Memory::new(text, tick, importance, MemoryTag::Trade));
        }
    }
}
