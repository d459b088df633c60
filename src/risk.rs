//! Pre-match risk gate.
//!
//! A pure predicate over an inbound order: admit or reject with a reason.
//! Rejection is terminal for the request; nothing enters the book.

use serde::{Deserialize, Serialize};

use crate::request::AddOrder;
use crate::types::{Discipline, Price, Quantity};

/// Static limits applied to every Add before it reaches the book.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Largest admissible order quantity
    pub max_quantity: Quantity,
    /// Lowest admissible limit price
    pub min_price: Price,
    /// Highest admissible limit price
    pub max_price: Price,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_quantity: 10_000,
            min_price: 1,
            max_price: 1_000_000,
        }
    }
}

/// Outcome of the risk check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskVerdict {
    Allowed,
    RejectedMaxQuantity,
    RejectedPriceRange,
}

/// The gate itself. Stateless beyond its configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Check an inbound order against the configured limits.
    ///
    /// Market orders skip the price-range check: their effective price is
    /// chosen at admission, not by the client.
    #[inline]
    pub fn check(&self, order: &AddOrder) -> RiskVerdict {
        if order.qty > self.config.max_quantity {
            return RiskVerdict::RejectedMaxQuantity;
        }

        if order.discipline != Discipline::Market
            && (order.price < self.config.min_price || order.price > self.config.max_price)
        {
            return RiskVerdict::RejectedPriceRange;
        }

        RiskVerdict::Allowed
    }
}
