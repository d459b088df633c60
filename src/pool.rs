//! Order pool - O(1) slab recycler with cache-line aligned order records.
//!
//! The pool pre-allocates a contiguous block of order slots at startup,
//! eliminating heap allocation in the hot path. Uses a free list threaded
//! through the `next` linkage field for O(1) acquire and release. Orders
//! are reset, not reconstructed: reusing a slot leaves no stale state.

use std::fmt;

use crate::types::{Discipline, OrderId, PoolIndex, Price, Quantity, Side, NULL_INDEX};

/// A single order record - exactly 64 bytes (one cache line).
///
/// # Memory Layout
///
/// | Field         | Type | Offset | Size |
/// |---------------|------|--------|------|
/// | price         | u64  | 0      | 8    |
/// | initial_qty   | u64  | 8      | 8    |
/// | remaining_qty | u64  | 16     | 8    |
/// | id            | u64  | 24     | 8    |
/// | next          | u32  | 32     | 4    |
/// | prev          | u32  | 36     | 4    |
/// | side          | u8   | 40     | 1    |
/// | discipline    | u8   | 41     | 1    |
/// | (padding)     | -    | 42     | 22   |
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy)]
pub struct Order {
    // === Hot data (read during matching) ===
    /// Fixed-point price in ticks
    pub price: Price,

    /// Quantity at admission
    pub initial_qty: Quantity,

    /// Quantity still open; the order is filled iff this reaches zero
    pub remaining_qty: Quantity,

    /// External order ID
    pub id: OrderId,

    // === Linkage (FIFO queue pointers within a PriceLevel) ===
    /// Index of the next order at the same price level
    pub next: PoolIndex,

    /// Index of the previous order (enables O(1) cancel)
    pub prev: PoolIndex,

    /// Order side
    pub side: Side,

    /// Matching policy
    pub discipline: Discipline,
}

// Compile-time assertions: Order must occupy exactly one cache line
const _: () = assert!(
    std::mem::size_of::<Order>() == 64,
    "Order must be exactly 64 bytes (one cache line)"
);
const _: () = assert!(
    std::mem::align_of::<Order>() == 64,
    "Order must be 64-byte aligned"
);

impl Order {
    /// Create an empty/uninitialized record (for the free list)
    #[inline]
    pub const fn vacant() -> Self {
        Self {
            price: 0,
            initial_qty: 0,
            remaining_qty: 0,
            id: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            side: Side::Buy,
            discipline: Discipline::GoodTillCancel,
        }
    }

    /// Overwrite every field for slot reuse.
    #[inline]
    pub fn reset(
        &mut self,
        discipline: Discipline,
        id: OrderId,
        side: Side,
        price: Price,
        quantity: Quantity,
    ) {
        self.discipline = discipline;
        self.id = id;
        self.side = side;
        self.price = price;
        self.initial_qty = quantity;
        self.remaining_qty = quantity;
        self.next = NULL_INDEX;
        self.prev = NULL_INDEX;
    }

    /// Decrement the open quantity after a match.
    #[inline]
    pub fn fill(&mut self, quantity: Quantity) {
        debug_assert!(
            quantity <= self.remaining_qty,
            "order {} filled beyond remaining quantity",
            self.id
        );
        self.remaining_qty -= quantity;
    }

    #[inline]
    pub fn filled_qty(&self) -> Quantity {
        self.initial_qty - self.remaining_qty
    }

    #[inline]
    pub fn is_filled(&self) -> bool {
        self.remaining_qty == 0
    }

    /// Bind a Market order to its terminal price and rewrite the discipline.
    /// Only valid on a Market order.
    #[inline]
    pub fn to_good_till_cancel(&mut self, price: Price) {
        debug_assert_eq!(
            self.discipline,
            Discipline::Market,
            "only Market orders can be rebound"
        );
        self.price = price;
        self.discipline = Discipline::GoodTillCancel;
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id)
            .field("side", &self.side)
            .field("discipline", &self.discipline)
            .field("price", &self.price)
            .field("initial_qty", &self.initial_qty)
            .field("remaining_qty", &self.remaining_qty)
            .field("prev", &self.prev)
            .field("next", &self.next)
            .finish()
    }
}

/// Behavior when `acquire` finds the free list empty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum PoolMode {
    /// `acquire` fails; the caller rejects the request
    #[default]
    Strict,
    /// The slab grows by one slot on demand; each growth is counted
    Degraded,
}

/// Pre-allocated order storage with O(1) acquire and release.
///
/// Uses a free list threaded through the `next` field of vacant slots.
/// Owned exclusively by the matcher thread; no locks anywhere.
pub struct OrderPool {
    /// Contiguous block of order slots
    slots: Vec<Order>,

    /// Head of the free list (index of the first vacant slot)
    free_head: PoolIndex,

    /// Number of currently acquired slots
    acquired_count: u32,

    /// Times `acquire` found the free list empty
    exhaustions: u64,

    mode: PoolMode,
}

impl OrderPool {
    /// Create a pool with the specified capacity.
    ///
    /// # Panics
    /// Panics if capacity exceeds u32::MAX - 1 (MAX is reserved for NULL_INDEX)
    pub fn new(capacity: u32, mode: PoolMode) -> Self {
        assert!(capacity < NULL_INDEX, "capacity must be less than NULL_INDEX");

        // Every slot starts vacant and chained to its successor; the last
        // one terminates the free list
        let slots: Vec<Order> = (0..capacity)
            .map(|i| {
                let mut slot = Order::vacant();
                slot.next = if i + 1 == capacity { NULL_INDEX } else { i + 1 };
                slot
            })
            .collect();

        Self {
            slots,
            free_head: if capacity == 0 { NULL_INDEX } else { 0 },
            acquired_count: 0,
            exhaustions: 0,
            mode,
        }
    }

    /// Acquire a slot from the pool.
    ///
    /// Returns `None` only in [`PoolMode::Strict`] when the pool is
    /// exhausted; in [`PoolMode::Degraded`] the slab grows on demand and
    /// the exhaustion counter is incremented.
    ///
    /// # Complexity
    /// O(1) - pops from the head of the free list
    #[inline]
    pub fn acquire(&mut self) -> Option<PoolIndex> {
        match self.free_head {
            NULL_INDEX => self.acquire_exhausted(),
            index => {
                let slot = &mut self.slots[index as usize];
                self.free_head = std::mem::replace(&mut slot.next, NULL_INDEX);
                slot.prev = NULL_INDEX;
                self.acquired_count += 1;
                Some(index)
            }
        }
    }

    /// Free list ran dry: count the event, then apply the configured
    /// policy. Out of line so the hot acquire path stays branch-light.
    #[cold]
    fn acquire_exhausted(&mut self) -> Option<PoolIndex> {
        self.exhaustions += 1;
        match self.mode {
            PoolMode::Strict => None,
            PoolMode::Degraded => {
                let index = self.slots.len() as u32;
                assert!(index < NULL_INDEX, "pool index space exhausted");
                self.slots.push(Order::vacant());
                self.acquired_count += 1;
                Some(index)
            }
        }
    }

    /// Return a slot to the pool.
    ///
    /// The caller must ensure the index was previously acquired and has not
    /// already been released; double-release trips a debug assertion.
    ///
    /// # Complexity
    /// O(1) - pushes to the head of the free list
    #[inline]
    pub fn release(&mut self, index: PoolIndex) {
        debug_assert!((index as usize) < self.slots.len(), "index out of bounds");
        debug_assert!(self.acquired_count > 0, "release without a matching acquire");

        self.acquired_count -= 1;
        let old_head = std::mem::replace(&mut self.free_head, index);

        // Wipe the record before it rejoins the free chain
        let slot = &mut self.slots[index as usize];
        slot.reset(Discipline::GoodTillCancel, 0, Side::Buy, 0, 0);
        slot.next = old_head;
    }

    #[inline]
    pub fn get(&self, index: PoolIndex) -> &Order {
        debug_assert!((index as usize) < self.slots.len(), "index out of bounds");
        &self.slots[index as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, index: PoolIndex) -> &mut Order {
        debug_assert!((index as usize) < self.slots.len(), "index out of bounds");
        &mut self.slots[index as usize]
    }

    /// Number of currently acquired slots.
    #[inline]
    pub fn acquired(&self) -> u32 {
        self.acquired_count
    }

    /// Current slab size (grows past the initial capacity in degraded mode).
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Times `acquire` found the free list empty.
    #[inline]
    pub fn exhaustions(&self) -> u64 {
        self.exhaustions
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.acquired_count == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_head == NULL_INDEX
    }

    /// Pre-fault all memory pages (warm-up routine).
    ///
    /// Walks every slot to force the OS to map virtual pages to physical
    /// RAM, preventing page faults in the hot path.
    pub fn warm_up(&mut self) {
        for slot in &mut self.slots {
            unsafe {
                std::ptr::write_volatile(&mut slot.price, 0);
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity())
            .field("acquired", &self.acquired_count)
            .field("exhaustions", &self.exhaustions)
            .field("mode", &self.mode)
            .finish()
    }
}
