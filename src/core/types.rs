//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Unique identifier for actors
///
/// Ids are assigned densely in spawn order and never reused. Effect
/// application relies on their total order for reproducible tick outcomes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[display(fmt = "actor-{}", _0)]
pub struct ActorId(pub u64);

impl ActorId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Simulation tick counter (discrete time unit)
pub type Tick = u64;

/// Where a decision response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Served from the response cache without touching the service
    CacheHit,
    /// A fresh answer from the decision service
    Live,
    /// Rule-based substitute (service failure or open circuit breaker)
    Fallback,
}

/// Tradeable resource kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Food,
    Materials,
    Energy,
    Luxury,
    Tools,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Food,
        ResourceKind::Materials,
        ResourceKind::Energy,
        ResourceKind::Luxury,
        ResourceKind::Tools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Food => "food",
            ResourceKind::Materials => "materials",
            ResourceKind::Energy => "energy",
            ResourceKind::Luxury => "luxury",
            ResourceKind::Tools => "tools",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "food" => Some(ResourceKind::Food),
            "materials" | "material" => Some(ResourceKind::Materials),
            "energy" => Some(ResourceKind::Energy),
            "luxury" | "luxuries" => Some(ResourceKind::Luxury),
            "tools" | "tool" => Some(ResourceKind::Tools),
            _ => None,
        }
    }
}

/// 2D position
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}
