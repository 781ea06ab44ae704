//! Deterministic rule-based substitute decisions
//!
//! Used when the decision service is unavailable or the circuit breaker
//! is open. The choice is a pure function of the request fingerprint, so
//! a degraded run is still reproducible.

use crate::decision::DecisionRequest;

/// Always-valid decisions the fallback rotates through. Each must parse
/// and validate for any actor in any state.
const FALLBACK_DECISIONS: [&str; 4] = ["rest", "work", "idle", "rest"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, request: &DecisionRequest) -> String {
        let index = (request.fingerprint % FALLBACK_DECISIONS.len() as u64) as usize;
        FALLBACK_DECISIONS[index].to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::action::parse_decision;
    use crate::core::types::ActorId;
    use crate::decision::GenerationParams;

    fn request(fingerprint: u64) -> DecisionRequest {
        DecisionRequest {
            actor: ActorId(1),
            tick: 0,
            context: String::new(),
            fingerprint,
            params: GenerationParams::default(),
        }
    }

    #[test]
    fn test_deterministic_per_fingerprint() {
        let generator = FallbackGenerator::new();
        assert_eq!(
            generator.generate(&request(42)),
            generator.generate(&request(42))
        );
    }

    #[test]
    fn test_every_fallback_parses() {
        for text in FALLBACK_DECISIONS {
            assert!(parse_decision(text).is_ok(), "fallback {:?} must parse", text);
        }
    }
}
