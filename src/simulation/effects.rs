//! Tick-scoped pending effects
//!
//! Effects produced by the decision state machine are queued here and
//! applied by the step engine only after every decision for the tick has
//! resolved or timed out. Draining sorts by actor id, so tick outcomes
//! are reproducible given identical decision responses and no actor's
//! effect is visible to another actor's decision context within a tick.

use crate::actor::action::Action;
use crate::core::types::{ActorId, Tick};

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEffect {
    pub actor: ActorId,
    pub action: Action,
    pub tick: Tick,
}

#[derive(Debug, Default)]
pub struct EffectQueue {
    effects: Vec<PendingEffect>,
}

impl EffectQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: PendingEffect) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Drain all effects in ascending actor-id order
    pub fn drain_ordered(&mut self) -> Vec<PendingEffect> {
        let mut effects = std::mem::take(&mut self.effects);
        effects.sort_by_key(|e| e.actor);
        effects
    }
}
