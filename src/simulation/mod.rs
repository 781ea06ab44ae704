pub mod effects;
pub mod engine;

pub use effects::{EffectQueue, PendingEffect};
pub use engine::{RunState, StepEngine, TickSummary};
