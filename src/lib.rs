//! Agora - large-scale society simulation driven by an external
//! text-generation service

pub mod actor;
pub mod core;
pub mod decision;
pub mod simulation;
pub mod world;
