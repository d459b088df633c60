//! Audit journal - fixed-size binary records drained by a writer thread.
//!
//! The matcher pushes one [`JournalRecord`] per admitted request into an
//! SPSC ring; a dedicated writer thread drains the ring and appends to an
//! on-disk file. The matcher never blocks on the writer: a full ring is
//! counted and skipped, because correctness of the book does not depend on
//! the journal.
//!
//! # On-disk format
//!
//! A sequence of fixed 48-byte little-endian records:
//!
//! ```text
//! [ u64 seq ][ u64 ns_timestamp ][ u8 kind ][ payload ][ zero padding ]
//! ```
//!
//! Payloads: Add `{u64 id, u8 side, u8 discipline, i64 price, u64 qty}`,
//! Cancel `{u64 id, u8 reason}`, Modify `{u64 id, i64 price, u64 qty}`.
//! The file is append-only and truncated at process start.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::request::SubmitRequest;
use crate::types::{Discipline, OrderId, Quantity, SequenceNumber, Side};

/// Fixed size of every on-disk record, padding included.
pub const RECORD_SIZE: usize = 48;

/// Record kind codes as written to disk.
pub const KIND_ADD: u8 = 0;
pub const KIND_CANCEL: u8 = 1;
pub const KIND_MODIFY: u8 = 2;

/// Cancel-reason code for a client-initiated cancel request.
pub const CANCEL_REASON_USER: u8 = 0;

/// Everything that can go wrong reading a journal back.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed record at offset {offset}: {what}")]
    Malformed { offset: usize, what: &'static str },

    #[error("truncated trailing record ({0} bytes)")]
    Truncated(usize),
}

/// Per-kind payload of a journal record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JournalPayload {
    Add {
        id: OrderId,
        side: Side,
        discipline: Discipline,
        price: i64,
        qty: Quantity,
    },
    Cancel {
        id: OrderId,
        reason: u8,
    },
    Modify {
        id: OrderId,
        price: i64,
        qty: Quantity,
    },
}

/// One journal entry: strictly increasing `seq`, monotonic `ns_timestamp`,
/// and the request as submitted (before any Market rebinding).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalRecord {
    pub seq: SequenceNumber,
    pub ns_timestamp: u64,
    pub payload: JournalPayload,
}

impl JournalRecord {
    /// Capture an admitted request.
    pub fn from_request(seq: SequenceNumber, ns_timestamp: u64, request: &SubmitRequest) -> Self {
        let payload = match *request {
            SubmitRequest::Add(add) => JournalPayload::Add {
                id: add.id,
                side: add.side,
                discipline: add.discipline,
                price: add.price as i64,
                qty: add.qty,
            },
            SubmitRequest::Cancel(id) => JournalPayload::Cancel {
                id,
                reason: CANCEL_REASON_USER,
            },
            SubmitRequest::Modify(modify) => JournalPayload::Modify {
                id: modify.id,
                price: modify.price as i64,
                qty: modify.qty,
            },
        };
        Self {
            seq,
            ns_timestamp,
            payload,
        }
    }

    /// Kind code as written to disk.
    pub fn kind(&self) -> u8 {
        match self.payload {
            JournalPayload::Add { .. } => KIND_ADD,
            JournalPayload::Cancel { .. } => KIND_CANCEL,
            JournalPayload::Modify { .. } => KIND_MODIFY,
        }
    }

    /// Serialize to the fixed little-endian wire format.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..16].copy_from_slice(&self.ns_timestamp.to_le_bytes());
        buf[16] = self.kind();

        match self.payload {
            JournalPayload::Add {
                id,
                side,
                discipline,
                price,
                qty,
            } => {
                buf[17..25].copy_from_slice(&id.to_le_bytes());
                buf[25] = side as u8;
                buf[26] = discipline as u8;
                buf[27..35].copy_from_slice(&price.to_le_bytes());
                buf[35..43].copy_from_slice(&qty.to_le_bytes());
            }
            JournalPayload::Cancel { id, reason } => {
                buf[17..25].copy_from_slice(&id.to_le_bytes());
                buf[25] = reason;
            }
            JournalPayload::Modify { id, price, qty } => {
                buf[17..25].copy_from_slice(&id.to_le_bytes());
                buf[25..33].copy_from_slice(&price.to_le_bytes());
                buf[33..41].copy_from_slice(&qty.to_le_bytes());
            }
        }

        buf
    }

    /// Deserialize from the fixed wire format. `offset` is only used to
    /// report where in the file a malformed record was found.
    pub fn decode(buf: &[u8; RECORD_SIZE], offset: usize) -> Result<Self, JournalError> {
        let seq = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let ns_timestamp = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let id = u64::from_le_bytes(buf[17..25].try_into().unwrap());

        let payload = match buf[16] {
            KIND_ADD => {
                let side = match buf[25] {
                    0 => Side::Buy,
                    1 => Side::Sell,
                    _ => {
                        return Err(JournalError::Malformed {
                            offset,
                            what: "unknown side code",
                        })
                    }
                };
                let discipline = match buf[26] {
                    0 => Discipline::Market,
                    1 => Discipline::GoodTillCancel,
                    2 => Discipline::FillAndKill,
                    3 => Discipline::FillOrKill,
                    _ => {
                        return Err(JournalError::Malformed {
                            offset,
                            what: "unknown discipline code",
                        })
                    }
                };
                JournalPayload::Add {
                    id,
                    side,
                    discipline,
                    price: i64::from_le_bytes(buf[27..35].try_into().unwrap()),
                    qty: u64::from_le_bytes(buf[35..43].try_into().unwrap()),
                }
            }
            KIND_CANCEL => JournalPayload::Cancel {
                id,
                reason: buf[25],
            },
            KIND_MODIFY => JournalPayload::Modify {
                id,
                price: i64::from_le_bytes(buf[25..33].try_into().unwrap()),
                qty: u64::from_le_bytes(buf[33..41].try_into().unwrap()),
            },
            _ => {
                return Err(JournalError::Malformed {
                    offset,
                    what: "unknown record kind",
                })
            }
        };

        Ok(Self {
            seq,
            ns_timestamp,
            payload,
        })
    }
}

/// Read an entire journal file back, in file (= sequence) order.
///
/// Used by replay audits and tests; the hot path never reads.
pub fn read_records(path: &Path) -> Result<Vec<JournalRecord>, JournalError> {
    let bytes = std::fs::read(path)?;
    let mut records = Vec::with_capacity(bytes.len() / RECORD_SIZE);

    let mut chunks = bytes.chunks_exact(RECORD_SIZE);
    for (i, chunk) in chunks.by_ref().enumerate() {
        let buf: &[u8; RECORD_SIZE] = chunk.try_into().unwrap();
        records.push(JournalRecord::decode(buf, i * RECORD_SIZE)?);
    }

    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        return Err(JournalError::Truncated(remainder.len()));
    }

    Ok(records)
}

/// The writer side: a dedicated thread draining the journal ring to disk.
///
/// The writer may block on the storage device; the ring isolates that from
/// the matcher. An I/O error terminates only the writer.
pub struct JournalWriter {
    handle: JoinHandle<()>,
    path: PathBuf,
}

impl JournalWriter {
    /// Truncate/create the file and start the writer thread.
    pub fn spawn(
        path: &Path,
        mut ring: rtrb::Consumer<JournalRecord>,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let file = File::create(path)?;
        let path_buf = path.to_path_buf();

        let handle = thread::Builder::new()
            .name("lob-journal".into())
            .spawn(move || {
                let mut out = BufWriter::new(file);
                let mut dirty = false;

                loop {
                    match ring.pop() {
                        Ok(record) => {
                            if let Err(e) = out.write_all(&record.encode()) {
                                warn!(error = %e, "journal write failed; writer stopping");
                                return;
                            }
                            dirty = true;
                        }
                        Err(_) => {
                            if shutdown.load(Ordering::Acquire) {
                                break;
                            }
                            if dirty {
                                if let Err(e) = out.flush() {
                                    warn!(error = %e, "journal flush failed; writer stopping");
                                    return;
                                }
                                dirty = false;
                            }
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                }

                if let Err(e) = out.flush() {
                    warn!(error = %e, "final journal flush failed");
                }
                debug!("journal writer drained and exited");
            })?;

        Ok(Self {
            handle,
            path: path_buf,
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the writer to drain and exit. Call after setting the
    /// shutdown flag.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
