//! Decision action grammar
//!
//! Decision responses are free text; this module extracts a structured
//! action from them with a fixed verb grammar. The parser is deliberately
//! tolerant: it scans lines for the first recognized verb so surrounding
//! model chatter does not break a decision. Anything unparseable maps to
//! an error the state machine downgrades to an Idle no-op.

use crate::core::error::{AgoraError, Result};
use crate::core::types::{ActorId, ResourceKind, Vec2};
use serde::{Deserialize, Serialize};

/// A structured action extracted from decision text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Idle,
    Rest,
    Move { target: Vec2 },
    Talk { target: ActorId },
    Work,
    Create { item: String },
    Buy { resource: ResourceKind, quantity: f32 },
    Sell { resource: ResourceKind, quantity: f32 },
}

/// Action kind without arguments, for metrics and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    Idle,
    Rest,
    Move,
    Talk,
    Work,
    Create,
    Buy,
    Sell,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Idle,
        ActionKind::Rest,
        ActionKind::Move,
        ActionKind::Talk,
        ActionKind::Work,
        ActionKind::Create,
        ActionKind::Buy,
        ActionKind::Sell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Idle => "idle",
            ActionKind::Rest => "rest",
            ActionKind::Move => "move",
            ActionKind::Talk => "talk",
            ActionKind::Work => "work",
            ActionKind::Create => "create",
            ActionKind::Buy => "buy",
            ActionKind::Sell => "sell",
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Idle => ActionKind::Idle,
            Action::Rest => ActionKind::Rest,
            Action::Move { .. } => ActionKind::Move,
            Action::Talk { .. } => ActionKind::Talk,
            Action::Work => ActionKind::Work,
            Action::Create { .. } => ActionKind::Create,
            Action::Buy { .. } => ActionKind::Buy,
            Action::Sell { .. } => ActionKind::Sell,
        }
    }
}

/// The legal-action menu included in every decision prompt
pub const ACTION_MENU: &str = "\
Respond with exactly one action line:
  move <x> <y>        - travel to a position
  talk <actor-N>      - socialize with a nearby actor
  work                - do your job for a wage
  create <item>       - craft something new
  buy <resource> <qty>  - buy from the market
  sell <resource> <qty> - sell to the market
  rest                - recover energy
  idle                - do nothing";

/// Parse decision text into an action.
///
/// Scans lines for the first one starting with a recognized verb. A
/// recognized verb with malformed arguments is a `MalformedResponse`;
/// text with no recognized verb at all is too.
pub fn parse_decision(text: &str) -> Result<Action> {
    for line in text.lines() {
        let line = line.trim().trim_start_matches(['-', '*', '>']).trim();
        let mut tokens = line.split_whitespace();
        let verb = match tokens.next() {
            Some(v) => v
                .trim_matches(|c: char| !c.is_ascii_alphanumeric())
                .to_ascii_lowercase(),
            None => continue,
        };

        match verb.as_str() {
            "move" | "goto" => {
                let x = parse_float(tokens.next())?;
                let y = parse_float(tokens.next())?;
                return Ok(Action::Move {
                    target: Vec2::new(x, y),
                });
            }
            "talk" | "socialize" | "greet" => {
                let target = parse_actor(tokens.next())?;
                return Ok(Action::Talk { target });
            }
            "work" => return Ok(Action::Work),
            "create" | "craft" | "make" => {
                let item = tokens.collect::<Vec<_>>().join(" ");
                if item.is_empty() {
                    return Err(AgoraError::MalformedResponse(
                        "create without an item".into(),
                    ));
                }
                return Ok(Action::Create { item });
            }
            "buy" => {
                let (resource, quantity) = parse_trade(&mut tokens)?;
                return Ok(Action::Buy { resource, quantity });
            }
            "sell" => {
                let (resource, quantity) = parse_trade(&mut tokens)?;
                return Ok(Action::Sell { resource, quantity });
            }
            "rest" | "sleep" => return Ok(Action::Rest),
            "idle" | "wait" | "nothing" => return Ok(Action::Idle),
            _ => continue,
        }
    }

    Err(AgoraError::MalformedResponse(format!(
        "no recognized action verb in: {:?}",
        text.chars().take(80).collect::<String>()
    )))
}

fn parse_float(token: Option<&str>) -> Result<f32> {
    token
        .and_then(|t| t.trim_matches(|c: char| c == ',' || c == '(' || c == ')').parse().ok())
        .ok_or_else(|| AgoraError::MalformedResponse("expected a number".into()))
}

fn parse_actor(token: Option<&str>) -> Result<ActorId> {
    let token = token
        .ok_or_else(|| AgoraError::MalformedResponse("expected an actor id".into()))?;
    let digits = token.trim_start_matches("actor-").trim_matches(|c: char| !c.is_ascii_digit());
    digits
        .parse::<u64>()
        .map(ActorId)
        .map_err(|_| AgoraError::MalformedResponse(format!("bad actor id: {}", token)))
}

fn parse_trade<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<(ResourceKind, f32)> {
    let resource = tokens
        .next()
        .and_then(ResourceKind::parse)
        .ok_or_else(|| AgoraError::MalformedResponse("unknown resource".into()))?;
    let quantity = parse_float(tokens.next())?;
    Ok((resource, quantity))
}
