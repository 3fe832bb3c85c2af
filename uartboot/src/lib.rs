//! # uartboot
//!
//! Core library for a field firmware-update agent: it receives a
//! framed command protocol over a serial link, validates it, and uses
//! the validated commands to erase, program and verify the device's
//! non-volatile program memory, then optionally transfers control to
//! the installed application.
//!
//! The crate provides:
//!
//! - The wire protocol: frame assembly, response encoding, pinned
//!   CRC32 ([`protocol`])
//! - A lock-free single-producer/single-consumer receive queue
//!   ([`ring`])
//! - Sector-table flash management with a protected bootloader region
//!   ([`flash`])
//! - Argument-table verification and boot transfer ([`boot`])
//! - The command dispatcher and main processing loop ([`agent`])
//!
//! Hardware stays behind four small traits ([`agent::Transport`],
//! [`flash::FlashDriver`], [`agent::Clock`] and [`boot::System`]) so
//! the same core runs against a device HAL, the bundled simulator, or
//! the test mocks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartboot::{Agent, ring};
//!
//! # struct MyTransport; struct MyFlash; struct MyClock; struct MySystem;
//! # impl uartboot::agent::Transport for MyTransport {
//! #     fn write(&mut self, _: &[u8]) -> uartboot::Result<()> { Ok(()) }
//! # }
//! # impl uartboot::flash::FlashDriver for MyFlash {
//! #     fn erase_sector(&mut self, _: usize) -> Result<(), uartboot::flash::FlashError> { Ok(()) }
//! #     fn program_word(&mut self, _: u32, _: u32) -> Result<(), uartboot::flash::FlashError> { Ok(()) }
//! #     fn read(&mut self, _: u32, _: &mut [u8]) -> Result<(), uartboot::flash::FlashError> { Ok(()) }
//! # }
//! # impl uartboot::agent::Clock for MyClock { fn ticks_ms(&self) -> u32 { 0 } }
//! # impl uartboot::boot::System for MySystem {
//! #     fn reset(&mut self) -> ! { unreachable!() }
//! #     fn launch(&mut self, _: u32) -> ! { unreachable!() }
//! # }
//! fn main() -> uartboot::Result<()> {
//!     let (producer, consumer) = ring::channel(ring::RX_RING_CAPACITY);
//!     // hand `producer` to the receive notification path, then:
//!     let mut agent = Agent::new(MyTransport, MyFlash, MyClock, consumer);
//!     agent.run(&mut MySystem)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod boot;
pub mod error;
pub mod flash;
pub mod protocol;
pub mod ring;

// Re-exports for convenience
pub use {
    agent::{Action, Agent, Clock, FRAME_TIMEOUT_MS, Transport, VERSION_MAJOR, VERSION_MINOR},
    boot::{ArgTable, System, verified_entry},
    error::{Error, Result},
    flash::{EraseOutcome, FlashDriver, FlashError, ProgramOutcome, RegionManager},
    protocol::{AckCode, Assembler, FRAME_START, Frame, MAX_PAYLOAD, Opcode, Step, crc32_update},
};
