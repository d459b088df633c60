//! Order book - the central two-sided price-time priority structure.
//!
//! Bids and asks are price-ordered maps (bids descending, asks ascending),
//! each price holding a FIFO of resting orders. Top-of-book on a side is
//! the first key of its map, the worst price is the last key. An id index
//! gives O(log P + 1) cancel and modify.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::pool::OrderPool;
use crate::price_level::PriceLevel;
use crate::types::{OrderId, PoolIndex, Price, Quantity, Side};

/// Where a resting order lives: its pool slot plus the side/price keys
/// needed to find its level without touching the slot.
#[derive(Clone, Copy, Debug)]
pub struct OrderHandle {
    /// Slot in the order pool
    pub index: PoolIndex,
    /// Book side holding the order
    pub side: Side,
    /// Price level holding the order
    pub price: Price,
}

/// Aggregate view of one price level, best-first in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDepth {
    pub price: Price,
    pub qty: Quantity,
}

/// Best-effort market-data view: levels on each side, best-first.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<LevelDepth>,
    pub asks: Vec<LevelDepth>,
}

/// The limit order book for a single instrument.
///
/// Mutated only by the matcher thread (single-writer discipline); the
/// structure itself carries no synchronization.
pub struct Book {
    /// Bid levels, first key = highest price
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    /// Ask levels, first key = lowest price
    asks: BTreeMap<Price, PriceLevel>,
    /// Order lookup: id -> handle
    orders: FxHashMap<OrderId, OrderHandle>,
}

impl Book {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: FxHashMap::default(),
        }
    }

    /// Create a book with a pre-sized id index.
    pub fn with_capacity(orders: usize) -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            orders: FxHashMap::with_capacity_and_hasher(orders, Default::default()),
        }
    }

    // ========================================================================
    // Best / worst price access
    // ========================================================================

    /// Highest resting bid price
    #[inline]
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.keys().next().map(|Reverse(p)| *p)
    }

    /// Lowest resting ask price
    #[inline]
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.keys().next().copied()
    }

    /// Lowest resting bid price
    #[inline]
    pub fn worst_bid(&self) -> Option<Price> {
        self.bids.keys().next_back().map(|Reverse(p)| *p)
    }

    /// Highest resting ask price
    #[inline]
    pub fn worst_ask(&self) -> Option<Price> {
        self.asks.keys().next_back().copied()
    }

    /// Best price on a given side
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Worst price on a given side (terminal price for Market binding)
    #[inline]
    pub fn worst_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.worst_bid(),
            Side::Sell => self.worst_ask(),
        }
    }

    /// Spread (best_ask - best_bid), if both sides are resident and open
    pub fn spread(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Level access
    // ========================================================================

    #[inline]
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        match side {
            Side::Buy => self.bids.get(&Reverse(price)),
            Side::Sell => self.asks.get(&price),
        }
    }

    #[inline]
    pub fn level_mut(&mut self, side: Side, price: Price) -> Option<&mut PriceLevel> {
        match side {
            Side::Buy => self.bids.get_mut(&Reverse(price)),
            Side::Sell => self.asks.get_mut(&price),
        }
    }

    /// Delete a level from the side's map. Call only once its count is zero.
    #[inline]
    pub fn remove_level(&mut self, side: Side, price: Price) {
        let removed = match side {
            Side::Buy => self.bids.remove(&Reverse(price)),
            Side::Sell => self.asks.remove(&price),
        };
        debug_assert!(
            removed.map_or(true, |l| l.is_empty()),
            "removed a non-empty level at {}",
            price
        );
    }

    // ========================================================================
    // Order management
    // ========================================================================

    /// Place an order at the tail of its price's FIFO, creating the level
    /// if absent.
    ///
    /// The order record (id, side, price, remaining quantity) is read from
    /// the pool slot.
    ///
    /// # Returns
    /// `false` if the order id is already resident (nothing is inserted).
    pub fn insert(&mut self, pool: &mut OrderPool, index: PoolIndex) -> bool {
        let (id, side, price) = {
            let order = pool.get(index);
            (order.id, order.side, order.price)
        };

        if self.orders.contains_key(&id) {
            return false;
        }

        self.orders.insert(id, OrderHandle { index, side, price });

        let level = match side {
            Side::Buy => self.bids.entry(Reverse(price)).or_insert_with(PriceLevel::new),
            Side::Sell => self.asks.entry(price).or_insert_with(PriceLevel::new),
        };
        level.enqueue(pool, index);

        true
    }

    /// Remove an order by id (for cancel).
    ///
    /// Splices the order out of its level FIFO and deletes the level if it
    /// empties, in the same step. The slot is NOT released to the pool;
    /// the caller does that after reading what it needs.
    pub fn remove(&mut self, pool: &mut OrderPool, id: OrderId) -> Option<OrderHandle> {
        let handle = self.orders.remove(&id)?;

        if let Some(level) = self.level_mut(handle.side, handle.price) {
            let now_empty = level.unlink(pool, handle.index);
            if now_empty {
                self.remove_level(handle.side, handle.price);
            }
        }

        Some(handle)
    }

    /// Drop an order from the id index only (after a full fill during
    /// matching, where the level bookkeeping happens in the match loop).
    #[inline]
    pub fn remove_from_index(&mut self, id: OrderId) {
        self.orders.remove(&id);
    }

    #[inline]
    pub fn handle(&self, id: OrderId) -> Option<&OrderHandle> {
        self.orders.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    // ========================================================================
    // Matching predicates
    // ========================================================================

    /// Is there anything on the opposite side an order at this limit price
    /// could cross with?
    #[inline]
    pub fn can_match(&self, side: Side, price: Price) -> bool {
        match side {
            Side::Buy => self.best_ask().is_some_and(|ask| ask <= price),
            Side::Sell => self.best_bid().is_some_and(|bid| bid >= price),
        }
    }

    /// Can `qty` be fully filled against levels eligible at this limit
    /// price? Walks the opposite side best-first, summing level aggregates.
    pub fn can_fully_fill(&self, side: Side, price: Price, qty: Quantity) -> bool {
        let mut needed = qty;

        match side {
            Side::Buy => {
                for (&level_price, level) in &self.asks {
                    if level_price > price {
                        break;
                    }
                    if level.total_qty >= needed {
                        return true;
                    }
                    needed -= level.total_qty;
                }
            }
            Side::Sell => {
                for (&Reverse(level_price), level) in &self.bids {
                    if level_price < price {
                        break;
                    }
                    if level.total_qty >= needed {
                        return true;
                    }
                    needed -= level.total_qty;
                }
            }
        }

        false
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Total quantity and order count at a price level
    pub fn depth(&self, side: Side, price: Price) -> (Quantity, u32) {
        self.level(side, price)
            .map(|l| (l.total_qty, l.count))
            .unwrap_or((0, 0))
    }

    /// Number of resting orders
    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    #[inline]
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Aggregate both sides best-first into a market-data snapshot.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            bids: self
                .bids
                .iter()
                .map(|(&Reverse(price), level)| LevelDepth {
                    price,
                    qty: level.total_qty,
                })
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(&price, level)| LevelDepth {
                    price,
                    qty: level.total_qty,
                })
                .collect(),
        }
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("order_count", &self.orders.len())
            .finish()
    }
}
