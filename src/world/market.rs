//! Market and banking ledger
//!
//! Per-actor balances and resource holdings plus a shared market stock
//! with posted prices. Invoked only during effect commit; failures are
//! reported as outcome values, never raised as faults that abort a tick.

use crate::core::types::{ActorId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result of applying a trade. Rejections are ordinary values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeOutcome {
    Applied { quantity: f32, total_price: f64 },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    InsufficientFunds,
    InsufficientHoldings,
    OutOfStock,
    NoSuchAccount,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InsufficientFunds => "insufficient funds",
            RejectReason::InsufficientHoldings => "insufficient holdings",
            RejectReason::OutOfStock => "out of stock",
            RejectReason::NoSuchAccount => "no such account",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    pub balance: f64,
    pub holdings: BTreeMap<ResourceKind, f32>,
}

/// The shared economic ledger
///
/// Ordered maps keep snapshot serialization byte-stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketLedger {
    accounts: BTreeMap<ActorId, Account>,
    /// Units of each resource available to buy from the market
    stock: BTreeMap<ResourceKind, f32>,
    prices: BTreeMap<ResourceKind, f64>,
    transactions: u64,
}

impl MarketLedger {
    pub fn new() -> Self {
        let mut prices = BTreeMap::new();
        let mut stock = BTreeMap::new();
        for kind in ResourceKind::ALL {
            prices.insert(kind, default_price(kind));
            stock.insert(kind, 1_000.0);
        }
        Self {
            accounts: BTreeMap::new(),
            stock,
            prices,
            transactions: 0,
        }
    }

    pub fn open_account(&mut self, actor: ActorId, initial_balance: f64) {
        self.accounts.entry(actor).or_insert(Account {
            balance: initial_balance,
            holdings: BTreeMap::new(),
        });
    }

    pub fn close_account(&mut self, actor: ActorId) -> Option<Account> {
        self.accounts.remove(&actor)
    }

    pub fn balance(&self, actor: ActorId) -> f64 {
        self.accounts.get(&actor).map(|a| a.balance).unwrap_or(0.0)
    }

    pub fn holding(&self, actor: ActorId, resource: ResourceKind) -> f32 {
        self.accounts
            .get(&actor)
            .and_then(|a| a.holdings.get(&resource))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn price(&self, resource: ResourceKind) -> f64 {
        self.prices.get(&resource).copied().unwrap_or(1.0)
    }

    pub fn stock(&self, resource: ResourceKind) -> f32 {
        self.stock.get(&resource).copied().unwrap_or(0.0)
    }

    pub fn set_stock(&mut self, resource: ResourceKind, quantity: f32) {
        self.stock.insert(resource, quantity.max(0.0));
    }

    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Apply a trade for one actor against the market.
    pub fn apply_trade(
        &mut self,
        actor: ActorId,
        side: TradeSide,
        resource: ResourceKind,
        quantity: f32,
    ) -> TradeOutcome {
        let price = self.price(resource);
        let total_price = f64::from(quantity) * price;

        let Some(account) = self.accounts.get_mut(&actor) else {
            return TradeOutcome::Rejected(RejectReason::NoSuchAccount);
        };

        match side {
            TradeSide::Buy => {
                if account.balance < total_price {
                    return TradeOutcome::Rejected(RejectReason::InsufficientFunds);
                }
                let available = self.stock.get(&resource).copied().unwrap_or(0.0);
                if available < quantity {
                    return TradeOutcome::Rejected(RejectReason::OutOfStock);
                }
                account.balance -= total_price;
                *account.holdings.entry(resource).or_insert(0.0) += quantity;
                self.stock.insert(resource, available - quantity);
            }
            TradeSide::Sell => {
                let held = account.holdings.entry(resource).or_insert(0.0);
                if *held < quantity {
                    return TradeOutcome::Rejected(RejectReason::InsufficientHoldings);
                }
                *held -= quantity;
                account.balance += total_price;
                let available = self.stock.get(&resource).copied().unwrap_or(0.0);
                self.stock.insert(resource, available + quantity);
            }
        }

        self.transactions += 1;
        tracing::trace!(
            %actor,
            ?side,
            resource = resource.as_str(),
            quantity,
            total_price,
            "trade applied"
        );
        TradeOutcome::Applied {
            quantity,
            total_price,
        }
    }

    /// Credit a wage for completed work
    pub fn pay_wage(&mut self, actor: ActorId, amount: f64) {
        if let Some(account) = self.accounts.get_mut(&actor) {
            account.balance += amount;
            self.transactions += 1;
        }
    }

    /// Add a crafted good to an actor's holdings
    pub fn deposit_goods(&mut self, actor: ActorId, resource: ResourceKind, quantity: f32) {
        if let Some(account) = self.accounts.get_mut(&actor) {
            *account.holdings.entry(resource).or_insert(0.0) += quantity;
        }
    }
}

impl Default for MarketLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn default_price(kind: ResourceKind) -> f64 {
    match kind {
        ResourceKind::Food => 5.0,
        ResourceKind::Materials => 3.0,
        ResourceKind::Energy => 4.0,
        ResourceKind::Luxury => 20.0,
        ResourceKind::Tools => 12.0,
    }
}
