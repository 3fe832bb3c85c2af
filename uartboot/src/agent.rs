//! The update agent: command dispatch and the main processing loop.
//!
//! One [`Agent`] exists per device. It drains the receive ring, runs
//! the frame assembler, dispatches validated frames to command
//! handlers, and produces exactly one response frame (or device
//! action) per valid input frame. All state lives in the agent passed
//! through the loop; nothing is shared or static.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::boot::{self, System};
use crate::error::Result;
use crate::flash::{FlashDriver, RegionManager};
use crate::protocol::assembler::{Assembler, Step};
use crate::protocol::command::{
    EraseParam, INQUIRY_BLOCK_SIZE, INQUIRY_VERSION, InquiryParam, VerifyParam, WriteParam,
};
use crate::protocol::frame::{self, AckCode, Frame, MAX_PAYLOAD, Opcode};
use crate::ring::Consumer;

/// Agent protocol version, major part.
pub const VERSION_MAJOR: u8 = 1;

/// Agent protocol version, minor part.
pub const VERSION_MINOR: u8 = 0;

/// Silence window after which a partial frame is discarded.
pub const FRAME_TIMEOUT_MS: u32 = 500;

/// Outbound byte path to the host.
///
/// Blocking is fine: a firmware-update session never interleaves
/// traffic with a response in flight. The inbound path is not part of
/// this trait — received bytes arrive through the ring producer, fed
/// from whatever notification context the transport owns.
pub trait Transport {
    /// Write all bytes to the host.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Monotonic millisecond tick source.
pub trait Clock {
    /// Current tick count. Elapsed time is computed with wrapping
    /// arithmetic, so rollover is harmless.
    fn ticks_ms(&self) -> u32;
}

/// Device action requested by a command handler.
///
/// The diverging operations themselves live behind [`System`]; the
/// dispatcher only states the intent so it stays testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Perform a full device reset.
    Reset,
    /// Transfer control to the verified application at this address.
    Boot(u32),
}

/// The firmware-update agent.
pub struct Agent<T, F, C> {
    transport: T,
    region: RegionManager<F>,
    clock: C,
    rx: Consumer,
    assembler: Assembler,
    last_byte_at: u32,
}

impl<T: Transport, F: FlashDriver, C: Clock> Agent<T, F, C> {
    /// Create an agent over its collaborators.
    pub fn new(transport: T, driver: F, clock: C, rx: Consumer) -> Self {
        let last_byte_at = clock.ticks_ms();
        Self {
            transport,
            region: RegionManager::new(driver),
            clock,
            rx,
            assembler: Assembler::new(),
            last_byte_at,
        }
    }

    /// Access the flash region manager (startup application check,
    /// inspection in tests).
    pub fn region_mut(&mut self) -> &mut RegionManager<F> {
        &mut self.region
    }

    /// Process everything currently queued.
    ///
    /// Drains the receive ring through the assembler, transmits any
    /// acknowledgments, and applies the inactivity rule: a partial
    /// frame older than [`FRAME_TIMEOUT_MS`] is silently discarded
    /// (the host retransmits). Returns a requested device action, if
    /// a command produced one.
    pub fn poll(&mut self) -> Result<Option<Action>> {
        while let Some(byte) = self.rx.pop() {
            self.last_byte_at = self.clock.ticks_ms();
            match self.assembler.feed(byte) {
                Step::Pending => {}
                Step::Reject { opcode, code } => self.send_ack(opcode, code)?,
                Step::Ready(frame) => {
                    if let Some(action) = self.dispatch(&frame)? {
                        return Ok(Some(action));
                    }
                }
            }
        }

        if self.assembler.is_idle() {
            self.last_byte_at = self.clock.ticks_ms();
        } else if self
            .clock
            .ticks_ms()
            .wrapping_sub(self.last_byte_at)
            > FRAME_TIMEOUT_MS
        {
            warn!("receive timeout, discarding partial frame");
            self.assembler.reset();
        }

        Ok(None)
    }

    /// Run the agent until a command diverges into a reset or boot.
    ///
    /// Both arms of the action call an operation that never returns,
    /// so the loop is only ever left through an error.
    pub fn run<S: System>(&mut self, system: &mut S) -> Result<()> {
        loop {
            if let Some(action) = self.poll()? {
                match action {
                    Action::Reset => system.reset(),
                    Action::Boot(address) => system.launch(address),
                }
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Invoke the handler for one validated frame.
    ///
    /// Unknown opcodes that survived framing are dropped without a
    /// response: they are treated as forward-compatible commands this
    /// agent does not speak, and answering them would confuse a newer
    /// host. Framing-layer errors, by contrast, are always
    /// acknowledged.
    fn dispatch(&mut self, frame: &Frame) -> Result<Option<Action>> {
        let Some(opcode) = frame.opcode() else {
            debug!("ignoring unknown opcode {:#04x}", frame.opcode);
            return Ok(None);
        };
        info!("opcode {opcode:?}, length {}", frame.payload.len());

        match opcode {
            Opcode::Inquiry => self.handle_inquiry(&frame.payload)?,
            Opcode::Boot => return self.handle_boot(),
            Opcode::Reset => {
                self.send_ack(Opcode::Reset as u8, AckCode::Ok)?;
                return Ok(Some(Action::Reset));
            }
            Opcode::Erase => self.handle_erase(&frame.payload)?,
            Opcode::Write => self.handle_write(&frame.payload)?,
            Opcode::Verify => self.handle_verify(&frame.payload)?,
            // reserved, no response
            Opcode::Read => debug!("read opcode is reserved"),
            // sentinel, never a command
            Opcode::None => {}
        }
        Ok(None)
    }

    fn handle_inquiry(&mut self, payload: &[u8]) -> Result<()> {
        let Some(param) = InquiryParam::decode(payload) else {
            warn!("inquiry length mismatch: {}", payload.len());
            return self.send_ack(Opcode::Inquiry as u8, AckCode::BadParam);
        };

        match param.subcode {
            INQUIRY_VERSION => {
                self.respond(Opcode::Inquiry, &[VERSION_MAJOR, VERSION_MINOR])
            }
            INQUIRY_BLOCK_SIZE => {
                #[allow(clippy::cast_possible_truncation)] // 4096 fits u16
                let block = (MAX_PAYLOAD as u16).to_le_bytes();
                self.respond(Opcode::Inquiry, &block)
            }
            other => {
                warn!("unknown inquiry subcode {other:#04x}");
                self.send_ack(Opcode::Inquiry as u8, AckCode::BadParam)
            }
        }
    }

    /// BOOT means "boot whatever is currently installed": the target
    /// comes from the persisted argument table, never from the host.
    fn handle_boot(&mut self) -> Result<Option<Action>> {
        self.send_ack(Opcode::Boot as u8, AckCode::Ok)?;

        match boot::verified_entry(&mut self.region) {
            Ok(Some(address)) => Ok(Some(Action::Boot(address))),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!("argument table read failed: {e}");
                Ok(None)
            }
        }
    }

    fn handle_erase(&mut self, payload: &[u8]) -> Result<()> {
        let Some(param) = EraseParam::decode(payload) else {
            warn!("erase length mismatch: {}", payload.len());
            return self.send_ack(Opcode::Erase as u8, AckCode::BadParam);
        };

        if self.region.is_protected(param.address, param.size) {
            warn!("erase of {:#010x} rejected: protected", param.address);
            return self.send_ack(Opcode::Erase as u8, AckCode::Unknown);
        }

        info!("erase {:#010x}, size {}", param.address, param.size);
        let outcome = self.region.erase(param.address, param.size);
        if outcome.sectors_failed > 0 {
            warn!("erase finished with {} failed sectors", outcome.sectors_failed);
        }
        // best effort: accepted, not byte-confirmed; hosts VERIFY next
        self.send_ack(Opcode::Erase as u8, AckCode::Ok)
    }

    fn handle_write(&mut self, payload: &[u8]) -> Result<()> {
        let Some(param) = WriteParam::decode(payload) else {
            warn!("write length mismatch: {}", payload.len());
            return self.send_ack(Opcode::Write as u8, AckCode::BadParam);
        };

        if self.region.is_protected(param.address, param.size) {
            warn!("write to {:#010x} rejected: protected", param.address);
            return self.send_ack(Opcode::Write as u8, AckCode::Unknown);
        }

        info!("write {:#010x}, size {}", param.address, param.size);
        match self.region.program(param.address, param.data) {
            Ok(outcome) => {
                if outcome.words_failed > 0 {
                    warn!("write finished with {} failed words", outcome.words_failed);
                }
                self.send_ack(Opcode::Write as u8, AckCode::Ok)
            }
            Err(e) => {
                warn!("write rejected: {e}");
                self.send_ack(Opcode::Write as u8, AckCode::BadParam)
            }
        }
    }

    fn handle_verify(&mut self, payload: &[u8]) -> Result<()> {
        let Some(param) = VerifyParam::decode(payload) else {
            warn!("verify length mismatch: {}", payload.len());
            return self.send_ack(Opcode::Verify as u8, AckCode::BadParam);
        };

        info!("verify {:#010x}, size {}", param.address, param.size);
        match self.region.checksum_range(param.address, param.size) {
            Ok(live) if live == param.crc => self.send_ack(Opcode::Verify as u8, AckCode::Ok),
            Ok(live) => {
                info!("crc {live:#010x}, expected {:#010x}", param.crc);
                self.send_ack(Opcode::Verify as u8, AckCode::VerifyFailed)
            }
            Err(e) => {
                warn!("verify read failed: {e}");
                self.send_ack(Opcode::Verify as u8, AckCode::Unknown)
            }
        }
    }

    fn respond(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        self.transport.write(&frame::encode(opcode as u8, payload))
    }

    fn send_ack(&mut self, opcode: u8, code: AckCode) -> Result<()> {
        self.transport.write(&frame::encode_ack(opcode, code))
    }
}
