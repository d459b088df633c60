//! Primitive identifiers shared across the engine.
//!
//! Prices are scaled integers in the instrument's minimum tick; there is
//! no floating-point arithmetic anywhere on the hot path.

use serde::{Deserialize, Serialize};

/// Fixed-point price in ticks (e.g. $100.50 -> 10050 with a 0.01 tick)
pub type Price = u64;

/// Order quantity in lots
pub type Quantity = u64;

/// External order ID (client-assigned)
pub type OrderId = u64;

/// Journal sequence number
pub type SequenceNumber = u64;

/// Index into the order pool - our "compressed pointer".
/// Using u32 instead of 64-bit pointers halves linkage metadata,
/// doubling cache efficiency.
pub type PoolIndex = u32;

/// Sentinel value representing a null/invalid pool index (like nullptr)
pub const NULL_INDEX: PoolIndex = u32::MAX;

/// Order side
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Matching policy of an order. Residency in the book is not encoded here:
/// it is implied by remaining quantity after matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Discipline {
    /// Price bound to the worst opposite resting price at admission,
    /// then treated as GoodTillCancel
    Market = 0,
    /// Rests in the book until canceled or filled (default)
    #[default]
    GoodTillCancel = 1,
    /// Match what is immediately available, cancel the residue
    FillAndKill = 2,
    /// All-or-nothing: dropped unless the full quantity is fillable
    FillOrKill = 3,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_discipline_default() {
        assert_eq!(Discipline::default(), Discipline::GoodTillCancel);
    }
}
