//! Receive-side frame assembly state machine.
//!
//! Bytes are consumed one at a time; the assembler either reconstructs
//! a complete, checksum-valid [`Frame`] or reports exactly one
//! rejection acknowledgment and returns to idle. Structural recovery
//! is always a reset to the idle state; there is no partial resync
//! inside a frame.

use log::{trace, warn};

use crate::protocol::frame::{AckCode, FRAME_START, Frame, MAX_PAYLOAD, frame_crc};

/// Assembly states, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for the start marker; other bytes are discarded.
    Idle,
    /// Marker seen, next byte is the opcode.
    Start,
    /// Accumulating the two length bytes.
    Opcode,
    /// Accumulating `length` payload bytes.
    Param,
    /// Accumulating the four checksum bytes.
    Crc,
}

/// Result of feeding one byte to the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// More bytes are needed.
    Pending,
    /// A complete, checksum-valid frame. The context has been reset.
    Ready(Frame),
    /// The frame was rejected; the caller must transmit this
    /// acknowledgment. The context has been reset.
    Reject {
        /// Opcode to attribute the rejection to.
        opcode: u8,
        /// Rejection code.
        code: AckCode,
    },
}

/// The single in-progress frame context.
///
/// Exactly one exists per device, owned by the main processing loop.
/// The inactivity timeout is the owner's concern: the assembler only
/// exposes [`Assembler::is_idle`] so the loop can tell whether an
/// assembly is in flight.
#[derive(Debug)]
pub struct Assembler {
    state: State,
    opcode: u8,
    length: u16,
    scratch: [u8; 4],
    scratch_len: usize,
    payload: Vec<u8>,
}

impl Assembler {
    /// Create an idle assembler with the payload buffer preallocated.
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            opcode: 0,
            length: 0,
            scratch: [0; 4],
            scratch_len: 0,
            payload: Vec::with_capacity(MAX_PAYLOAD),
        }
    }

    /// Whether no assembly is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Discard any in-progress frame and return to idle.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.scratch_len = 0;
        self.payload.clear();
    }

    /// Consume one received byte.
    pub fn feed(&mut self, byte: u8) -> Step {
        match self.state {
            State::Idle => {
                if byte == FRAME_START {
                    trace!("frame start");
                    self.state = State::Start;
                }
                Step::Pending
            }
            State::Start => {
                self.opcode = byte;
                self.scratch_len = 0;
                self.state = State::Opcode;
                Step::Pending
            }
            State::Opcode => {
                self.scratch[self.scratch_len] = byte;
                self.scratch_len += 1;
                if self.scratch_len < 2 {
                    return Step::Pending;
                }
                self.length = u16::from_le_bytes([self.scratch[0], self.scratch[1]]);
                self.scratch_len = 0;
                if usize::from(self.length) > MAX_PAYLOAD {
                    warn!(
                        "declared length {} exceeds payload bound {MAX_PAYLOAD}",
                        self.length
                    );
                    return self.reject(AckCode::Overflow);
                }
                self.state = if self.length == 0 {
                    State::Crc
                } else {
                    State::Param
                };
                Step::Pending
            }
            State::Param => {
                // Defensive bound; unreachable given the length check,
                // but a byte past a full buffer must never be stored.
                if self.payload.len() >= usize::from(self.length) {
                    warn!("payload buffer already full");
                    return self.reject(AckCode::Overflow);
                }
                self.payload.push(byte);
                if self.payload.len() == usize::from(self.length) {
                    self.scratch_len = 0;
                    self.state = State::Crc;
                }
                Step::Pending
            }
            State::Crc => {
                self.scratch[self.scratch_len] = byte;
                self.scratch_len += 1;
                if self.scratch_len < 4 {
                    return Step::Pending;
                }
                let received = u32::from_le_bytes(self.scratch);
                let expected = frame_crc(self.opcode, &self.payload);
                if received != expected {
                    warn!("frame crc mismatch: {received:#010x} != {expected:#010x}");
                    return self.reject(AckCode::VerifyFailed);
                }
                let frame = Frame {
                    opcode: self.opcode,
                    payload: std::mem::replace(
                        &mut self.payload,
                        Vec::with_capacity(MAX_PAYLOAD),
                    ),
                };
                self.reset();
                Step::Ready(frame)
            }
        }
    }

    fn reject(&mut self, code: AckCode) -> Step {
        let opcode = self.opcode;
        self.reset();
        Step::Reject { opcode, code }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}
