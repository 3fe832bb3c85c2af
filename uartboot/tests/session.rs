//! End-to-end protocol sessions over mock collaborators.
//!
//! Each test feeds wire bytes through the receive ring exactly as a
//! host tool would send them and asserts on the raw response bytes
//! and on the flash driver call log.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use uartboot::agent::{Clock, Transport, VERSION_MAJOR, VERSION_MINOR};
use uartboot::flash::layout::{
    APP_ADDRESS, ARG_ADDRESS, BOOT_ADDRESS, BOOT_SIZE, FLASH_BASE, PROGRAM_WORD, flash_size,
    sectors,
};
use uartboot::protocol::frame::{self, AckCode, Opcode};
use uartboot::{Action, Agent, FlashDriver, FlashError, crc32_update, ring};

#[derive(Clone, Default)]
struct SharedTransport(Rc<RefCell<Vec<u8>>>);

impl Transport for SharedTransport {
    fn write(&mut self, bytes: &[u8]) -> uartboot::Result<()> {
        self.0.borrow_mut().extend_from_slice(bytes);
        Ok(())
    }
}

impl SharedTransport {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.0.borrow_mut())
    }
}

#[derive(Clone)]
struct TestClock(Rc<Cell<u32>>);

impl Clock for TestClock {
    fn ticks_ms(&self) -> u32 {
        self.0.get()
    }
}

/// RAM-backed flash with a call log for mutation assertions.
struct MemFlash {
    mem: Vec<u8>,
    erase_calls: usize,
    program_calls: usize,
}

impl MemFlash {
    fn new() -> Self {
        Self {
            mem: vec![0xFF; flash_size() as usize],
            erase_calls: 0,
            program_calls: 0,
        }
    }

    fn install(&mut self, address: u32, bytes: &[u8]) {
        let offset = (address - FLASH_BASE) as usize;
        self.mem[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn contents(&self, address: u32, len: usize) -> &[u8] {
        let offset = (address - FLASH_BASE) as usize;
        &self.mem[offset..offset + len]
    }
}

impl FlashDriver for MemFlash {
    fn erase_sector(&mut self, index: usize) -> Result<(), FlashError> {
        self.erase_calls += 1;
        let sector = sectors().nth(index).ok_or(FlashError::Erase(index))?;
        let offset = (sector.address - FLASH_BASE) as usize;
        self.mem[offset..offset + sector.size as usize].fill(0xFF);
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        self.program_calls += 1;
        let offset = (address - FLASH_BASE) as usize;
        self.mem[offset..offset + PROGRAM_WORD].copy_from_slice(&word.to_le_bytes());
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let offset = address
            .checked_sub(FLASH_BASE)
            .map(|o| o as usize)
            .filter(|o| o + buf.len() <= self.mem.len())
            .ok_or(FlashError::Read { address })?;
        buf.copy_from_slice(&self.mem[offset..offset + buf.len()]);
        Ok(())
    }
}

struct Session {
    agent: Agent<SharedTransport, MemFlash, TestClock>,
    tx: ring::Producer,
    transport: SharedTransport,
}

impl Session {
    fn new() -> Self {
        Self::with_flash(MemFlash::new())
    }

    fn with_flash(flash: MemFlash) -> Self {
        let (tx, rx) = ring::channel(ring::RX_RING_CAPACITY);
        let transport = SharedTransport::default();
        let agent = Agent::new(
            transport.clone(),
            flash,
            TestClock(Rc::new(Cell::new(0))),
            rx,
        );
        Self {
            agent,
            tx,
            transport,
        }
    }

    /// Send raw wire bytes and process them.
    fn send(&mut self, bytes: &[u8]) -> Option<Action> {
        assert_eq!(self.tx.push_slice(bytes), bytes.len(), "rx ring overflow");
        self.agent.poll().unwrap()
    }

    /// Send a command frame.
    fn command(&mut self, opcode: Opcode, payload: &[u8]) -> Option<Action> {
        self.send(&frame::encode(opcode as u8, payload))
    }

    fn response(&mut self) -> Vec<u8> {
        self.transport.take()
    }

    fn flash(&mut self) -> &mut MemFlash {
        self.agent.region_mut().driver_mut()
    }
}

fn ack(opcode: Opcode, code: AckCode) -> Vec<u8> {
    frame::encode_ack(opcode as u8, code)
}

fn erase_payload(address: u32, size: u32) -> Vec<u8> {
    let mut p = address.to_le_bytes().to_vec();
    p.extend_from_slice(&size.to_le_bytes());
    p
}

fn write_payload(address: u32, data: &[u8]) -> Vec<u8> {
    let mut p = address.to_le_bytes().to_vec();
    p.extend_from_slice(&(data.len() as u32).to_le_bytes());
    p.extend_from_slice(data);
    p
}

fn verify_payload(address: u32, size: u32, crc: u32) -> Vec<u8> {
    let mut p = erase_payload(address, size);
    p.extend_from_slice(&crc.to_le_bytes());
    p
}

#[test]
fn inquiry_version_reports_configured_constants() {
    let mut s = Session::new();
    assert_eq!(s.command(Opcode::Inquiry, &[0x00]), None);
    assert_eq!(
        s.response(),
        frame::encode(Opcode::Inquiry as u8, &[VERSION_MAJOR, VERSION_MINOR])
    );
}

#[test]
fn inquiry_block_size_reports_max_payload() {
    let mut s = Session::new();
    s.command(Opcode::Inquiry, &[0x01]);
    assert_eq!(
        s.response(),
        frame::encode(Opcode::Inquiry as u8, &[0x00, 0x10]) // 4096 LE
    );
}

#[test]
fn inquiry_with_zero_length_payload_is_bad_param() {
    let mut s = Session::new();
    s.command(Opcode::Inquiry, &[]);
    assert_eq!(s.response(), ack(Opcode::Inquiry, AckCode::BadParam));
}

#[test]
fn inquiry_unknown_subcode_is_bad_param() {
    let mut s = Session::new();
    s.command(Opcode::Inquiry, &[0x09]);
    assert_eq!(s.response(), ack(Opcode::Inquiry, AckCode::BadParam));
}

#[test]
fn full_update_session_erase_write_verify() {
    let mut s = Session::new();
    let data: Vec<u8> = (0u16..256).map(|i| (i ^ (i >> 3)) as u8).collect();
    let crc = crc32_update(0, &data);

    s.command(Opcode::Erase, &erase_payload(APP_ADDRESS, 16 * 1024));
    assert_eq!(s.response(), ack(Opcode::Erase, AckCode::Ok));
    assert_eq!(s.flash().erase_calls, 1);

    s.command(Opcode::Write, &write_payload(APP_ADDRESS, &data));
    assert_eq!(s.response(), ack(Opcode::Write, AckCode::Ok));
    assert_eq!(s.flash().contents(APP_ADDRESS, data.len()), &data[..]);

    s.command(Opcode::Verify, &verify_payload(APP_ADDRESS, 256, crc));
    assert_eq!(s.response(), ack(Opcode::Verify, AckCode::Ok));

    s.command(Opcode::Verify, &verify_payload(APP_ADDRESS, 256, crc ^ 1));
    assert_eq!(s.response(), ack(Opcode::Verify, AckCode::VerifyFailed));
}

#[test]
fn verify_mismatch_mutates_nothing() {
    let mut s = Session::new();
    s.command(
        Opcode::Verify,
        &verify_payload(APP_ADDRESS, 64, 0x1234_5678),
    );
    assert_eq!(s.response(), ack(Opcode::Verify, AckCode::VerifyFailed));
    assert_eq!(s.flash().erase_calls, 0);
    assert_eq!(s.flash().program_calls, 0);
}

#[test]
fn erase_inside_protected_region_is_rejected_before_mutation() {
    let mut s = Session::new();
    s.command(Opcode::Erase, &erase_payload(BOOT_ADDRESS, 1024));
    assert_eq!(s.response(), ack(Opcode::Erase, AckCode::Unknown));
    assert_eq!(s.flash().erase_calls, 0);
}

#[test]
fn erase_straddling_protected_boundary_is_rejected() {
    let mut s = Session::new();
    // starts outside, reaches back into the bootloader image
    s.command(
        Opcode::Erase,
        &erase_payload(BOOT_ADDRESS + BOOT_SIZE - 4, 8),
    );
    assert_eq!(s.response(), ack(Opcode::Erase, AckCode::Unknown));
    assert_eq!(s.flash().erase_calls, 0);
}

#[test]
fn write_inside_protected_region_answers_with_write_opcode() {
    let mut s = Session::new();
    s.command(
        Opcode::Write,
        &write_payload(BOOT_ADDRESS, &[0u8; 8]),
    );
    assert_eq!(s.response(), ack(Opcode::Write, AckCode::Unknown));
    assert_eq!(s.flash().program_calls, 0);
}

#[test]
fn write_with_mismatched_length_fields_is_bad_param() {
    let mut s = Session::new();
    // header claims 8 data bytes, only 4 follow; framing is intact
    let mut payload = APP_ADDRESS.to_le_bytes().to_vec();
    payload.extend_from_slice(&8u32.to_le_bytes());
    payload.extend_from_slice(&[1, 2, 3, 4]);
    s.command(Opcode::Write, &payload);
    assert_eq!(s.response(), ack(Opcode::Write, AckCode::BadParam));
    assert_eq!(s.flash().program_calls, 0);
}

#[test]
fn write_with_unaligned_size_is_bad_param_before_mutation() {
    let mut s = Session::new();
    s.command(Opcode::Write, &write_payload(APP_ADDRESS, &[1, 2, 3]));
    assert_eq!(s.response(), ack(Opcode::Write, AckCode::BadParam));
    assert_eq!(s.flash().program_calls, 0);
}

#[test]
fn oversized_declared_length_yields_single_overflow_ack() {
    let mut s = Session::new();
    // 0x1001 = 4097, over the bound; no payload follows
    assert_eq!(s.send(&[0xAA, 0x22, 0x01, 0x10]), None);
    assert_eq!(s.response(), ack(Opcode::Write, AckCode::Overflow));

    // session continues normally
    s.command(Opcode::Inquiry, &[0x00]);
    assert_eq!(
        s.response(),
        frame::encode(Opcode::Inquiry as u8, &[VERSION_MAJOR, VERSION_MINOR])
    );
}

#[test]
fn corrupted_trailing_checksum_yields_verify_failed_ack() {
    let mut s = Session::new();
    let mut wire = frame::encode(Opcode::Inquiry as u8, &[0x00]);
    let last = wire.len() - 1;
    wire[last] ^= 0x01;
    s.send(&wire);
    assert_eq!(s.response(), ack(Opcode::Inquiry, AckCode::VerifyFailed));
}

#[test]
fn boot_without_argument_table_stays_in_update_mode() {
    let mut s = Session::new();
    assert_eq!(s.command(Opcode::Boot, &[]), None);
    assert_eq!(s.response(), ack(Opcode::Boot, AckCode::Ok));
}

#[test]
fn boot_with_mismatched_argument_table_refuses() {
    let mut flash = MemFlash::new();
    flash.install(APP_ADDRESS, &[0x5A; 128]);
    let mut record = APP_ADDRESS.to_le_bytes().to_vec();
    record.extend_from_slice(&128u32.to_le_bytes());
    record.extend_from_slice(&0xBAD0_CAFEu32.to_le_bytes());
    flash.install(ARG_ADDRESS, &record);

    let mut s = Session::with_flash(flash);
    assert_eq!(s.command(Opcode::Boot, &[]), None);
    assert_eq!(s.response(), ack(Opcode::Boot, AckCode::Ok));
}

#[test]
fn boot_with_verified_application_requests_launch() {
    let image: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();
    let mut flash = MemFlash::new();
    flash.install(APP_ADDRESS, &image);
    let mut record = APP_ADDRESS.to_le_bytes().to_vec();
    record.extend_from_slice(&(image.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32_update(0, &image).to_le_bytes());
    flash.install(ARG_ADDRESS, &record);

    let mut s = Session::with_flash(flash);
    assert_eq!(s.command(Opcode::Boot, &[]), Some(Action::Boot(APP_ADDRESS)));
    assert_eq!(s.response(), ack(Opcode::Boot, AckCode::Ok));
}

#[test]
fn reset_command_acks_then_requests_reset() {
    let mut s = Session::new();
    assert_eq!(s.command(Opcode::Reset, &[]), Some(Action::Reset));
    assert_eq!(s.response(), ack(Opcode::Reset, AckCode::Ok));
}

#[test]
fn erase_with_short_payload_is_bad_param() {
    let mut s = Session::new();
    s.command(Opcode::Erase, &[0x00, 0x80, 0x00, 0x08]);
    assert_eq!(s.response(), ack(Opcode::Erase, AckCode::BadParam));
    assert_eq!(s.flash().erase_calls, 0);
}

#[test]
fn wire_bytes_of_version_exchange_are_pinned() {
    // Bit-exact exchange captured from the reference host tool.
    let mut s = Session::new();
    s.send(&[0xAA, 0x10, 0x01, 0x00, 0x00, 0x9F, 0xBA, 0x4C, 0x6B]);
    assert_eq!(
        s.response(),
        [0xAA, 0x10, 0x02, 0x00, 0x01, 0x00, 0xC0, 0x5C, 0x75, 0x6B]
    );
}
