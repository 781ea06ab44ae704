//! Decision service boundary
//!
//! Everything between "an actor needs a decision" and "here is the text":
//! context building and fingerprinting, the response cache, token-bucket
//! admission control, the retrying/fallback client, and the batching
//! coordinator that ties them together.

pub mod cache;
pub mod client;
pub mod context;
pub mod coordinator;
pub mod fallback;
pub mod rate_limit;

use crate::core::types::{ActorId, Provenance, Tick};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Generation parameters forwarded to the decision service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 150,
            temperature: 0.7,
        }
    }
}

/// A decision request for one actor on one tick
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub actor: ActorId,
    pub tick: Tick,
    /// Serialized context: persona, recent memory, neighbors, action menu
    pub context: String,
    /// Stable hash of `context`; cache and dedup key
    pub fingerprint: u64,
    pub params: GenerationParams,
}

/// The resolved decision for one request
#[derive(Debug, Clone)]
pub struct DecisionResponse {
    pub text: String,
    pub provenance: Provenance,
    pub latency: Duration,
}
