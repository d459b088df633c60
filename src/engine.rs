//! Engine - the matcher thread, its ingress/egress rings, and lifecycle.
//!
//! `Engine::start` wires the inbound request ring, the outbound event
//! ring, the journal ring, and spawns the matcher thread (optionally
//! pinned to the last CPU core). Exactly one thread - the matcher -
//! mutates the book, the id index, and the pool free list. Producers talk
//! to it only through the [`Submitter`]; observers only through the
//! [`EventStream`], the metrics surface, and best-effort snapshots.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::book::BookSnapshot;
use crate::journal::{JournalRecord, JournalWriter};
use crate::matching::MatchCore;
use crate::metrics::Metrics;
use crate::pool::PoolMode;
use crate::request::{OrderRejected, OutputEvent, RejectReason, Request, SubmitRequest};
use crate::risk::{RiskConfig, RiskGate, RiskVerdict};
use crate::types::SequenceNumber;

/// Monotonic nanosecond clock shared by submitter and matcher.
///
/// Stamps are nanoseconds since engine start; zero is reserved for
/// "unset", so the first possible stamp is clamped to 1.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        (self.origin.elapsed().as_nanos() as u64).max(1)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything configurable about one engine instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Order pool capacity (slots)
    pub pool_capacity: u32,
    /// Pool exhaustion policy
    pub pool_mode: PoolMode,
    /// Inbound request ring capacity (power of two)
    pub request_ring_capacity: usize,
    /// Outbound event ring capacity (power of two)
    pub event_ring_capacity: usize,
    /// Journal ring capacity (power of two)
    pub journal_ring_capacity: usize,
    /// Pre-match limits
    pub risk: RiskConfig,
    /// Audit journal file; `None` disables journaling
    pub journal_path: Option<PathBuf>,
    /// Pin the matcher to the last available CPU core
    pub pin_matcher: bool,
    /// Requests between best-effort snapshot shadow refreshes
    pub snapshot_refresh_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 100_000,
            pool_mode: PoolMode::Strict,
            request_ring_capacity: 65_536,
            event_ring_capacity: 65_536,
            journal_ring_capacity: 65_536,
            risk: RiskConfig::default(),
            journal_path: None,
            pin_matcher: false,
            snapshot_refresh_interval: 1_024,
        }
    }
}

/// Why a submission did not enter the inbound ring.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// Ring full; retry, spin, or shed
    #[error("inbound ring full")]
    Backpressure,
    /// Shutdown flag observed; stop producing
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// The producer-of-record's handle. Deliberately not `Clone`: the inbound
/// ring is single-producer and the wait-free guarantee holds only for one
/// producer. Multiple producers must serialize in front of this handle.
pub struct Submitter {
    producer: rtrb::Producer<Request>,
    metrics: Arc<Metrics>,
    shutdown: Arc<AtomicBool>,
    clock: Clock,
}

impl Submitter {
    /// Non-blocking submit; stamps the ingress time.
    pub fn submit(&mut self, body: SubmitRequest) -> Result<(), SubmitError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }

        let request = Request {
            ingress_ts: self.clock.now_ns(),
            body,
        };
        match self.producer.push(request) {
            Ok(()) => {
                self.metrics.orders_received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(_) => Err(SubmitError::Backpressure),
        }
    }

    /// Strict-ordering backpressure: spin-yield until the ring accepts.
    pub fn submit_spin(&mut self, body: SubmitRequest) -> Result<(), SubmitError> {
        loop {
            match self.submit(body) {
                Err(SubmitError::Backpressure) => thread::yield_now(),
                other => return other,
            }
        }
    }

    /// Shed-mode backpressure: drop on a full ring and count the shed.
    ///
    /// # Returns
    /// `true` if the request entered the ring.
    pub fn submit_or_shed(&mut self, body: SubmitRequest) -> bool {
        match self.submit(body) {
            Ok(()) => true,
            Err(SubmitError::Backpressure) => {
                self.metrics.requests_shed.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(SubmitError::ShuttingDown) => false,
        }
    }

    /// Free request slots currently available in the ring.
    pub fn free_slots(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer side of the outbound observation ring.
pub struct EventStream {
    consumer: rtrb::Consumer<OutputEvent>,
}

impl EventStream {
    /// Next observation, if any. Never blocks.
    pub fn poll(&mut self) -> Option<OutputEvent> {
        self.consumer.pop().ok()
    }
}

/// A running engine instance. There is no global state: one instrument is
/// one engine; scaling is by sharding, not by sharing.
pub struct Engine {
    metrics: Arc<Metrics>,
    shutdown: Arc<AtomicBool>,
    journal_stop: Arc<AtomicBool>,
    shadow: Arc<Mutex<BookSnapshot>>,
    matcher: Option<JoinHandle<()>>,
    journal: Option<JournalWriter>,
}

impl Engine {
    /// Spawn the matcher (and journal writer, if configured) and return
    /// the engine handle plus its ingress and egress endpoints.
    pub fn start(config: EngineConfig) -> io::Result<(Engine, Submitter, EventStream)> {
        debug_assert!(config.request_ring_capacity.is_power_of_two());
        debug_assert!(config.journal_ring_capacity.is_power_of_two());

        let clock = Clock::new();
        let metrics = Arc::new(Metrics::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let journal_stop = Arc::new(AtomicBool::new(false));
        let shadow = Arc::new(Mutex::new(BookSnapshot::default()));

        let (request_tx, request_rx) = rtrb::RingBuffer::new(config.request_ring_capacity);
        let (event_tx, event_rx) = rtrb::RingBuffer::new(config.event_ring_capacity);

        let (journal_tx, journal) = match &config.journal_path {
            Some(path) => {
                let (tx, rx) = rtrb::RingBuffer::new(config.journal_ring_capacity);
                let writer = JournalWriter::spawn(path, rx, journal_stop.clone())?;
                (Some(tx), Some(writer))
            }
            None => (None, None),
        };

        let worker = MatcherWorker {
            core: MatchCore::new(config.pool_capacity, config.pool_mode),
            gate: RiskGate::new(config.risk),
            input: request_rx,
            output: event_tx,
            journal: journal_tx,
            next_seq: 0,
            metrics: metrics.clone(),
            shutdown: shutdown.clone(),
            shadow: shadow.clone(),
            clock,
            pin_to_core: config.pin_matcher,
            snapshot_refresh_interval: config.snapshot_refresh_interval.max(1),
        };

        let matcher = thread::Builder::new()
            .name("lob-matcher".into())
            .spawn(move || worker.run())?;

        info!(
            pool_capacity = config.pool_capacity,
            request_ring = config.request_ring_capacity,
            journaling = config.journal_path.is_some(),
            "engine started"
        );

        Ok((
            Engine {
                metrics: metrics.clone(),
                shutdown: shutdown.clone(),
                journal_stop,
                shadow,
                matcher: Some(matcher),
                journal,
            },
            Submitter {
                producer: request_tx,
                metrics,
                shutdown,
                clock,
            },
            EventStream { consumer: event_rx },
        ))
    }

    /// The metrics surface; reads are plain atomic loads.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Best-effort market-data snapshot from the matcher's shadow.
    pub fn snapshot(&self) -> BookSnapshot {
        self.shadow
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Cooperative shutdown: flag, drain the inbound ring, join the
    /// matcher, then drain and join the journal writer.
    pub fn shutdown(self) {
        // Drop runs the actual sequence
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(matcher) = self.matcher.take() {
            let _ = matcher.join();
        }
        // Only stop the writer once the matcher can no longer push
        self.journal_stop.store(true, Ordering::Release);
        if let Some(writer) = self.journal.take() {
            writer.join();
        }
        info!("engine stopped");
    }
}

/// State owned by the matcher thread.
struct MatcherWorker {
    core: MatchCore,
    gate: RiskGate,
    input: rtrb::Consumer<Request>,
    output: rtrb::Producer<OutputEvent>,
    journal: Option<rtrb::Producer<JournalRecord>>,
    next_seq: SequenceNumber,
    metrics: Arc<Metrics>,
    shutdown: Arc<AtomicBool>,
    shadow: Arc<Mutex<BookSnapshot>>,
    clock: Clock,
    pin_to_core: bool,
    snapshot_refresh_interval: u64,
}

impl MatcherWorker {
    fn run(mut self) {
        if self.pin_to_core {
            pin_to_last_core();
        }
        self.core.warm_up();
        info!("matcher running");

        let mut events: Vec<OutputEvent> = Vec::with_capacity(64);
        let mut since_refresh = 0u64;

        loop {
            match self.input.pop() {
                Ok(request) => {
                    let t_start = self.clock.now_ns();

                    events.clear();
                    self.process(request.body, &mut events);
                    self.forward(&events);

                    if request.ingress_ts > 0 && t_start > request.ingress_ts {
                        self.metrics.record_latency(t_start - request.ingress_ts);
                    }
                    self.metrics
                        .orders_processed
                        .fetch_add(1, Ordering::Relaxed);
                    self.refresh_gauges();

                    since_refresh += 1;
                    if since_refresh >= self.snapshot_refresh_interval {
                        self.refresh_shadow();
                        since_refresh = 0;
                    }
                }
                Err(_) => {
                    // Drain-then-exit: producers stop once they observe
                    // the flag, so empty + flag means done
                    if self.shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    self.refresh_shadow();
                    thread::yield_now();
                }
            }
        }

        self.refresh_shadow();
        info!("matcher drained and exited");
    }

    fn process(&mut self, body: SubmitRequest, events: &mut Vec<OutputEvent>) {
        if let SubmitRequest::Add(add) = &body {
            let reason = match self.gate.check(add) {
                RiskVerdict::Allowed => None,
                RiskVerdict::RejectedMaxQuantity => Some(RejectReason::MaxQuantityExceeded),
                RiskVerdict::RejectedPriceRange => Some(RejectReason::PriceOutOfRange),
            };
            if let Some(reason) = reason {
                self.metrics.orders_rejected.fetch_add(1, Ordering::Relaxed);
                events.push(OutputEvent::Rejected(OrderRejected { id: add.id, reason }));
                return;
            }
        }

        self.journal(&body);

        let applied = self.core.apply(body, events);
        if !applied {
            // Silent no-ops carry no observation, only a counter
            match body {
                SubmitRequest::Add(_) => {
                    self.metrics.duplicate_adds.fetch_add(1, Ordering::Relaxed);
                }
                _ => {
                    self.metrics.unknown_ids.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        for event in events.iter() {
            match event {
                OutputEvent::Trade(trade) => self.metrics.record_trade(trade.buy.qty),
                OutputEvent::Rejected(_) => {
                    self.metrics.orders_rejected.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        self.metrics
            .pool_exhaustions
            .store(self.core.pool.exhaustions(), Ordering::Relaxed);
    }

    /// Journal an admitted request. Sequence numbers advance only on a
    /// successful push, keeping the file gapless; a full ring is counted
    /// and the request proceeds unjournaled.
    fn journal(&mut self, body: &SubmitRequest) {
        let Some(producer) = self.journal.as_mut() else {
            return;
        };

        let record = JournalRecord::from_request(self.next_seq, self.clock.now_ns(), body);
        match producer.push(record) {
            Ok(()) => self.next_seq += 1,
            Err(_) => {
                self.metrics.journal_drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Best-effort event publication: a full ring drops, never stalls.
    fn forward(&mut self, events: &[OutputEvent]) {
        for &event in events {
            let _ = self.output.push(event);
        }
    }

    fn refresh_gauges(&self) {
        let m = &self.metrics;
        m.queue_depth.store(self.input.slots() as u64, Ordering::Relaxed);
        m.bid_levels
            .store(self.core.book.bid_levels() as u64, Ordering::Relaxed);
        m.ask_levels
            .store(self.core.book.ask_levels() as u64, Ordering::Relaxed);
        m.best_bid
            .store(self.core.book.best_bid().unwrap_or(0), Ordering::Relaxed);
        m.best_ask
            .store(self.core.book.best_ask().unwrap_or(0), Ordering::Relaxed);
    }

    /// Refresh the snapshot shadow without ever blocking: contended lock
    /// means a reader is mid-copy and this refresh is skipped.
    fn refresh_shadow(&self) {
        if let Ok(mut guard) = self.shadow.try_lock() {
            *guard = self.core.book.snapshot();
        }
    }
}

/// Pin the current thread to the last available CPU core; the last core
/// is the one typically isolated from OS interrupts.
fn pin_to_last_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last_core) = core_ids.last() {
            core_affinity::set_for_current(*last_core);
        }
    }
}
