//! Bounded actor memory
//!
//! Each actor keeps a small ordered buffer of salient events. The buffer
//! never exceeds its capacity K; when full, the entry with the lowest
//! importance is evicted, ties broken by oldest tick.

use crate::core::types::Tick;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// A remembered event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub content: String,
    pub tick: Tick,
    /// Salience in [0, 1]; drives eviction order
    pub importance: f32,
    pub tag: MemoryTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryTag {
    Social,
    Work,
    Trade,
    Movement,
    Observation,
}

impl Memory {
    pub fn new(content: impl Into<String>, tick: Tick, importance: f32, tag: MemoryTag) -> Self {
        Self {
            content: content.into(),
            tick,
            importance: importance.clamp(0.0, 1.0),
            tag,
        }
    }
}

/// Ordered buffer of an actor's memories, bounded at capacity K
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBuffer {
    memories: Vec<Memory>,
    capacity: usize,
}

impl MemoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            memories: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record a memory, evicting the least important (oldest among ties)
    /// entry if the buffer would exceed capacity. The incoming memory
    /// itself is a candidate for eviction.
    pub fn record(&mut self, memory: Memory) {
        self.memories.push(memory);
        if self.memories.len() > self.capacity {
            if let Some(pos) = self
                .memories
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| (OrderedFloat(m.importance), m.tick))
                .map(|(i, _)| i)
            {
                self.memories.remove(pos);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// The most recently recorded memories, newest last
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Memory> {
        let start = self.memories.len().saturating_sub(n);
        self.memories[start..].iter()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Memory> {
        self.memories.iter()
    }

    /// One-line-per-memory summary for prompt context
    pub fn summary(&self, n: usize) -> String {
        self.recent(n)
            .map(|m| format!("- [t{}] {}", m.tick, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
