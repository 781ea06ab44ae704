//! Build decision contexts and fingerprint them
//!
//! The context is the full serialized prompt for one actor's decision:
//! persona, recent memories, a summary of nearby actors, and the
//! legal-action menu. Its fingerprint keys the response cache
//! and in-window deduplication, so the serialization must be
//! deterministic: neighbors are listed in ascending id order and floats
//! are printed with fixed precision.

use crate::actor::action::ACTION_MENU;
use crate::actor::Actor;
use crate::core::types::{ActorId, Tick};
use crate::decision::{DecisionRequest, GenerationParams};
use std::hash::{BuildHasher, Hash, Hasher};

// Fixed seeds so fingerprints are stable for the lifetime of a run.
const FINGERPRINT_SEEDS: (u64, u64, u64, u64) = (
    0x517c_c1b7_2722_0a95,
    0x6c62_272e_07bb_0142,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
);

/// Deterministic fingerprint of a serialized context
pub fn fingerprint(context: &str) -> u64 {
    let state = ahash::RandomState::with_seeds(
        FINGERPRINT_SEEDS.0,
        FINGERPRINT_SEEDS.1,
        FINGERPRINT_SEEDS.2,
        FINGERPRINT_SEEDS.3,
    );
    let mut hasher = state.build_hasher();
    context.hash(&mut hasher);
    hasher.finish()
}

/// One line describing a nearby actor, as seen by the decider
#[derive(Debug, Clone)]
pub struct NeighborSummary {
    pub id: ActorId,
    pub name: String,
    pub state: &'static str,
    pub distance: f32,
}

/// Serialize an actor's decision context
///
/// Deliberately excludes tick and position: the context is persona,
/// recent memory, nearby actors and the action menu, so an actor in a
/// repeated situation produces a repeated fingerprint regardless of
/// when or where it occurs.
pub fn build_context(actor: &Actor, neighbors: &[NeighborSummary]) -> String {
    let mut s = String::new();

    s.push_str(&format!("You are {}, {}.\n", actor.name, actor.persona));

    if !actor.memory.is_empty() {
        s.push_str("\nRecent memories:\n");
        s.push_str(&actor.memory.summary(5));
        s.push('\n');
    }

    if neighbors.is_empty() {
        s.push_str("\nNobody is nearby.\n");
    } else {
        s.push_str("\nNearby:\n");
        for n in neighbors {
            s.push_str(&format!(
                "- {} ({}), {} at distance {:.1}\n",
                n.id, n.name, n.state, n.distance
            ));
        }
    }

    s.push('\n');
    s.push_str(ACTION_MENU);
    s
}

/// Assemble the full request for one actor
pub fn build_request(
    actor: &Actor,
    neighbors: &[NeighborSummary],
    tick: Tick,
    params: GenerationParams,
) -> DecisionRequest {
    let context = build_context(actor, neighbors);
    let fingerprint = fingerprint(&context);
    DecisionRequest {
        actor: actor.id,
        tick,
        context,
        fingerprint,
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Vec2;

    fn actor(id: u64, name: &str) -> Actor {
        Actor::new(ActorId(id), name.into(), "a farmer".into(), Vec2::new(1.0, 2.0), 20)
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("same context");
        let b = fingerprint("same context");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_contexts() {
        assert_ne!(fingerprint("context a"), fingerprint("context b"));
    }

    #[test]
    fn test_identical_contexts_share_fingerprints_across_ticks() {
        // Same persona and situation must collapse to one service call
        // and keep hitting the cache no matter when it recurs.
        let a = build_request(&actor(1, "Ann"), &[], 5, GenerationParams::default());
        let b = build_request(&actor(2, "Ann"), &[], 9, GenerationParams::default());
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn test_context_includes_menu_and_persona() {
        let context = build_context(&actor(1, "Ann"), &[]);
        assert!(context.contains("Ann"));
        assert!(context.contains("a farmer"));
        assert!(context.contains("move <x> <y>"));
    }

    #[test]
    fn test_context_lists_neighbors() {
        let neighbors = vec![NeighborSummary {
            id: ActorId(9),
            name: "Bob".into(),
            state: "working",
            distance: 4.2,
        }];
        let context = build_context(&actor(1, "Ann"), &neighbors);
        assert!(context.contains("actor-9"));
        assert!(context.contains("Bob"));
    }
}
