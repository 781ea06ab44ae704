//! Actor decision state machine
//!
//! Turns a raw decision response into a validated action and exactly one
//! pending effect. A malformed response becomes an Idle no-op and an
//! invalid-but-parseable action becomes a safe `rest`; neither ever
//! surfaces an error. A single bad model response must not stall a run
//! of thousands of actors.

use crate::actor::action::{parse_decision, Action};
use crate::actor::Actor;
use crate::core::config::ActorConfig;
use crate::core::types::{ActorId, ResourceKind, Tick, Vec2};
use crate::decision::DecisionResponse;
use crate::simulation::effects::PendingEffect;
use serde::{Deserialize, Serialize};

/// Behavioral state of an actor
///
/// `Thinking` is entered the instant a decision request is submitted and
/// is the only state exited by an external response rather than by
/// simulation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorState {
    Idle,
    Moving,
    Socializing,
    Working,
    Creating,
    Thinking,
}

impl ActorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorState::Idle => "idle",
            ActorState::Moving => "moving",
            ActorState::Socializing => "socializing",
            ActorState::Working => "working",
            ActorState::Creating => "creating",
            ActorState::Thinking => "thinking",
        }
    }
}

/// Read-only world queries the state machine validates against
pub trait WorldQuery {
    fn is_in_bounds(&self, position: Vec2) -> bool;
    fn actor_position(&self, actor: ActorId) -> Option<Vec2>;
    fn balance(&self, actor: ActorId) -> f64;
    fn holding(&self, actor: ActorId, resource: ResourceKind) -> f32;
    fn price(&self, resource: ResourceKind) -> f64;
}

/// Consume a decision response for one actor, producing exactly one
/// pending effect.
pub fn decide(
    actor: &Actor,
    response: &DecisionResponse,
    view: &impl WorldQuery,
    config: &ActorConfig,
    tick: Tick,
) -> PendingEffect {
    let action = match parse_decision(&response.text) {
        Ok(action) => action,
        Err(e) => {
            tracing::debug!(actor = %actor.id, error = %e, "malformed decision, idling");
            Action::Idle
        }
    };

    let action = match validate(actor, action, view, config) {
        Ok(action) => action,
        Err(reason) => {
            tracing::debug!(actor = %actor.id, reason, "invalid action, resting instead");
            Action::Rest
        }
    };

    PendingEffect {
        actor: actor.id,
        action,
        tick,
    }
}

/// Validate an action against world constraints. Returns the reason on
/// failure so the caller can log it before substituting the default.
fn validate(
    actor: &Actor,
    action: Action,
    view: &impl WorldQuery,
    config: &ActorConfig,
) -> std::result::Result<Action, &'static str> {
    match &action {
        Action::Idle | Action::Rest => {}
        Action::Move { target } => {
            if !target.x.is_finite() || !target.y.is_finite() {
                return Err("move target not finite");
            }
            if !view.is_in_bounds(*target) {
                return Err("move target out of bounds");
            }
        }
        Action::Talk { target } => {
            if *target == actor.id {
                return Err("talk target is self");
            }
            match view.actor_position(*target) {
                Some(pos) if actor.position.distance(&pos) <= config.social_radius => {}
                Some(_) => return Err("talk target outside social radius"),
                None => return Err("talk target does not exist"),
            }
        }
        Action::Work => {
            if actor.energy < config.work_cost {
                return Err("too exhausted to work");
            }
        }
        Action::Create { item } => {
            if item.trim().is_empty() {
                return Err("create target empty");
            }
            if actor.energy < config.create_cost {
                return Err("too exhausted to create");
            }
        }
        Action::Buy { resource, quantity } => {
            if !quantity.is_finite() || *quantity <= 0.0 {
                return Err("buy quantity not positive");
            }
            let cost = f64::from(*quantity) * view.price(*resource);
            if view.balance(actor.id) < cost {
                return Err("insufficient funds");
            }
        }
        Action::Sell { resource, quantity } => {
            if !quantity.is_finite() || *quantity <= 0.0 {
                return Err("sell quantity not positive");
            }
            if view.holding(actor.id, *resource) < *quantity {
                return Err("insufficient holdings");
            }
        }
    }
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Provenance;
    use std::time::Duration;

    struct StubView {
        bounds: Vec2,
        other: Option<(ActorId, Vec2)>,
        balance: f64,
        holding: f32,
    }

    impl Default for StubView {
        fn default() -> Self {
            Self {
                bounds: Vec2::new(100.0, 100.0),
                other: Some((ActorId(2), Vec2::new(3.0, 0.0))),
                balance: 100.0,
                holding: 5.0,
            }
        }
    }

    impl WorldQuery for StubView {
        fn is_in_bounds(&self, p: Vec2) -> bool {
            p.x >= 0.0 && p.y >= 0.0 && p.x < self.bounds.x && p.y < self.bounds.y
        }
        fn actor_position(&self, actor: ActorId) -> Option<Vec2> {
            self.other.filter(|(id, _)| *id == actor).map(|(_, p)| p)
        }
        fn balance(&self, _: ActorId) -> f64 {
            self.balance
        }
        fn holding(&self, _: ActorId, _: ResourceKind) -> f32 {
            self.holding
        }
        fn price(&self, _: ResourceKind) -> f64 {
            5.0
        }
    }

    fn response(text: &str) -> DecisionResponse {
        DecisionResponse {
            text: text.into(),
            provenance: Provenance::Live,
            latency: Duration::ZERO,
        }
    }

    fn actor() -> Actor {
        Actor::new(ActorId(1), "Test".into(), "a test subject".into(), Vec2::default(), 20)
    }

    #[test]
    fn test_malformed_response_yields_idle() {
        let effect = decide(
            &actor(),
            &response("gibberish with no verb"),
            &StubView::default(),
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Idle);
    }

    #[test]
    fn test_empty_response_yields_idle() {
        let effect = decide(
            &actor(),
            &response(""),
            &StubView::default(),
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Idle);
    }

    #[test]
    fn test_out_of_bounds_move_becomes_rest() {
        let effect = decide(
            &actor(),
            &response("move 500 500"),
            &StubView::default(),
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Rest);
    }

    #[test]
    fn test_valid_move_passes() {
        let effect = decide(
            &actor(),
            &response("move 5 5"),
            &StubView::default(),
            &ActorConfig::default(),
            0,
        );
        assert_eq!(
            effect.action,
            Action::Move {
                target: Vec2::new(5.0, 5.0)
            }
        );
    }

    #[test]
    fn test_talk_outside_radius_becomes_rest() {
        let view = StubView {
            other: Some((ActorId(2), Vec2::new(50.0, 50.0))),
            ..StubView::default()
        };
        let effect = decide(
            &actor(),
            &response("talk actor-2"),
            &view,
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Rest);
    }

    #[test]
    fn test_talk_to_missing_actor_becomes_rest() {
        let view = StubView {
            other: None,
            ..StubView::default()
        };
        let effect = decide(
            &actor(),
            &response("talk actor-9"),
            &view,
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Rest);
    }

    #[test]
    fn test_overdrawn_buy_becomes_rest() {
        let view = StubView {
            balance: 1.0,
            ..StubView::default()
        };
        let effect = decide(
            &actor(),
            &response("buy food 10"),
            &view,
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Rest);
    }

    #[test]
    fn test_oversold_holdings_becomes_rest() {
        let view = StubView {
            holding: 1.0,
            ..StubView::default()
        };
        let effect = decide(
            &actor(),
            &response("sell tools 3"),
            &view,
            &ActorConfig::default(),
            0,
        );
        assert_eq!(effect.action, Action::Rest);
    }

    #[test]
    fn test_exactly_one_effect_per_decision() {
        let effect = decide(
            &actor(),
            &response("work"),
            &StubView::default(),
            &ActorConfig::default(),
            7,
        );
        assert_eq!(effect.actor, ActorId(1));
        assert_eq!(effect.tick, 7);
    }
}
