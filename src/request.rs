//! Request and observation types.
//!
//! Requests are inputs from the producer thread; observations are outputs
//! to the trade stream and any other outside consumers.

use crate::types::{Discipline, OrderId, Price, Quantity, Side};

// ============================================================================
// Inbound requests
// ============================================================================

/// Parameters of a new order. The matcher owns the pool, so producers
/// submit orders by value; a slot is acquired only once the order is
/// admitted into the book.
#[derive(Clone, Copy, Debug)]
pub struct AddOrder {
    /// External order ID (client-assigned)
    pub id: OrderId,
    /// Order side
    pub side: Side,
    /// Matching policy
    pub discipline: Discipline,
    /// Fixed-point limit price; ignored for Market orders
    pub price: Price,
    /// Order quantity
    pub qty: Quantity,
}

impl AddOrder {
    /// Create a resting limit order (most common case)
    #[inline]
    pub const fn good_till_cancel(id: OrderId, side: Side, price: Price, qty: Quantity) -> Self {
        Self {
            id,
            side,
            discipline: Discipline::GoodTillCancel,
            price,
            qty,
        }
    }

    /// Create a Market order; the price is bound at admission
    #[inline]
    pub const fn market(id: OrderId, side: Side, qty: Quantity) -> Self {
        Self {
            id,
            side,
            discipline: Discipline::Market,
            price: 0,
            qty,
        }
    }

    /// Create a Fill-And-Kill order
    #[inline]
    pub const fn fill_and_kill(id: OrderId, side: Side, price: Price, qty: Quantity) -> Self {
        Self {
            id,
            side,
            discipline: Discipline::FillAndKill,
            price,
            qty,
        }
    }

    /// Create a Fill-Or-Kill order
    #[inline]
    pub const fn fill_or_kill(id: OrderId, side: Side, price: Price, qty: Quantity) -> Self {
        Self {
            id,
            side,
            discipline: Discipline::FillOrKill,
            price,
            qty,
        }
    }
}

/// Replace an existing order's terms. The replacement inherits the original
/// order's discipline and id but loses time priority.
#[derive(Clone, Copy, Debug)]
pub struct ModifyOrder {
    /// Order ID to modify
    pub id: OrderId,
    /// New side
    pub side: Side,
    /// New price
    pub price: Price,
    /// New quantity
    pub qty: Quantity,
}

/// What the producer asks of the matcher.
#[derive(Clone, Copy, Debug)]
pub enum SubmitRequest {
    /// Admit a new order
    Add(AddOrder),
    /// Cancel a resting order by id
    Cancel(OrderId),
    /// Cancel + re-add with new terms
    Modify(ModifyOrder),
}

/// A request as it travels the inbound ring. `ingress_ts` is a monotonic
/// nanosecond stamp set by the submitter; the matcher uses it only for
/// latency accounting (zero means unset).
#[derive(Clone, Copy, Debug)]
pub struct Request {
    pub ingress_ts: u64,
    pub body: SubmitRequest,
}

// ============================================================================
// Outbound observations
// ============================================================================

/// One side of an executed trade. Carries values, never references: the
/// book is free to recycle the order slot the moment it is fully filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TradeLeg {
    pub id: OrderId,
    pub price: Price,
    pub qty: Quantity,
}

/// A match between a resting bid and a resting ask. Each leg trades at its
/// own order's price, so the two prices may differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trade {
    pub buy: TradeLeg,
    pub sell: TradeLeg,
}

/// Order was admitted and is resting in the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderAccepted {
    pub id: OrderId,
    pub side: Side,
    pub price: Price,
    pub qty: Quantity,
}

/// Order left the book without being fully filled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderCanceled {
    pub id: OrderId,
    /// Remaining quantity at cancellation
    pub canceled_qty: Quantity,
}

/// Order was refused before entering the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderRejected {
    pub id: OrderId,
    pub reason: RejectReason,
}

/// Why an Add never reached the book
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RejectReason {
    /// Risk gate: quantity above the configured maximum
    MaxQuantityExceeded = 0,
    /// Risk gate: limit price outside the configured band
    PriceOutOfRange = 1,
    /// Market order against an empty opposite side
    MarketNoLiquidity = 2,
    /// Fill-And-Kill with nothing to match
    FakUnfillable = 3,
    /// Fill-Or-Kill without full-quantity liquidity
    FokUnfillable = 4,
    /// Order pool exhausted in strict mode
    PoolExhausted = 5,
    /// Zero-quantity order
    InvalidQuantity = 6,
}

/// Observations emitted by the matcher, in emission order.
#[derive(Clone, Copy, Debug)]
pub enum OutputEvent {
    /// Trade executed
    Trade(Trade),
    /// Order admitted and resting
    Accepted(OrderAccepted),
    /// Order canceled (user request or FillAndKill residue)
    Canceled(OrderCanceled),
    /// Order refused
    Rejected(OrderRejected),
}
