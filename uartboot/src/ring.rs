//! Bounded single-producer/single-consumer byte queue.
//!
//! This is the only point of concurrent access in the agent: the byte
//! transport's receive notification pushes from its own context (an
//! interrupt on the device, a reader thread on a host) while the main
//! loop pops. A fixed-capacity ring with separate monotonic read/write
//! cursors keeps the two sides lock-free; the producer does a bounded,
//! non-blocking push and nothing more, so it is safe to call from the
//! most constrained context.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Default receive-queue capacity in bytes.
pub const RX_RING_CAPACITY: usize = 512;

struct Shared {
    slots: Box<[AtomicU8]>,
    /// Total bytes ever written; slot index is `write % capacity`.
    write: AtomicUsize,
    /// Total bytes ever read.
    read: AtomicUsize,
}

/// Create a connected producer/consumer pair over a ring of `capacity`
/// bytes.
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    assert!(capacity > 0, "ring capacity must be non-zero");
    let shared = Arc::new(Shared {
        slots: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
        write: AtomicUsize::new(0),
        read: AtomicUsize::new(0),
    });
    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

/// Write half of the receive queue.
///
/// Owned by the receive notification path; `push` never blocks.
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Push one byte. Returns `false` (dropping the byte) if the ring
    /// is full.
    pub fn push(&mut self, byte: u8) -> bool {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) == self.shared.slots.len() {
            return false;
        }
        self.shared.slots[write % self.shared.slots.len()].store(byte, Ordering::Relaxed);
        self.shared.write.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Push a whole received chunk, returning how many bytes fit.
    pub fn push_slice(&mut self, bytes: &[u8]) -> usize {
        let mut accepted = 0;
        for &byte in bytes {
            if !self.push(byte) {
                break;
            }
            accepted += 1;
        }
        accepted
    }
}

/// Read half of the receive queue, owned by the main processing loop.
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Pop the oldest byte, if any.
    pub fn pop(&mut self) -> Option<u8> {
        let read = self.shared.read.load(Ordering::Relaxed);
        let write = self.shared.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }
        let byte = self.shared.slots[read % self.shared.slots.len()].load(Ordering::Relaxed);
        self.shared.read.store(read.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Number of bytes currently queued.
    pub fn len(&self) -> usize {
        let read = self.shared.read.load(Ordering::Relaxed);
        let write = self.shared.write.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
