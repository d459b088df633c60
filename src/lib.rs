//! # Pulse-LOB
//!
//! A deterministic limit order book matching core for a single instrument.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns the book exclusively (no locks)
//! - **Price-Time Priority**: better prices first, earlier arrivals first
//! - **Zero-Allocation Hot Path**: orders live in a recycling pool
//! - **Non-Blocking Observation**: journal, trades, and metrics never
//!   stall the matcher
//!
//! ## Architecture
//!
//! ```text
//! [Producer] --> [SPSC Ring] --> [Matcher Thread (Pinned)]
//!                                   |        |        |
//!                             [Journal]  [Events]  [Metrics]
//! ```

pub mod book;
pub mod engine;
pub mod journal;
pub mod matching;
pub mod metrics;
pub mod pool;
pub mod price_level;
pub mod request;
pub mod risk;
pub mod types;

// Re-exports for convenience
pub use book::{Book, BookSnapshot, LevelDepth};
pub use engine::{Clock, Engine, EngineConfig, EventStream, SubmitError, Submitter};
pub use journal::{JournalError, JournalRecord, JournalWriter};
pub use matching::MatchCore;
pub use metrics::{LatencyHistogram, Metrics, MetricsSnapshot};
pub use pool::{Order, OrderPool, PoolMode};
pub use price_level::PriceLevel;
pub use request::{
    AddOrder, ModifyOrder, OutputEvent, RejectReason, SubmitRequest, Trade, TradeLeg,
};
pub use risk::{RiskConfig, RiskGate, RiskVerdict};
pub use types::{Discipline, OrderId, Price, Quantity, SequenceNumber, Side};
