//! Argument table and transfer of control to the application.
//!
//! A provisioning step outside this crate writes a small flash record
//! describing the installed application; this module only reads it.
//! An absent or corrupt record is not an error; it is the normal "no
//! valid application" signal that keeps the device in update mode.

use byteorder::{ByteOrder, LittleEndian};
use log::{info, warn};

use crate::flash::layout::{APP_SIZE, ARG_ADDRESS};
use crate::flash::{FlashDriver, FlashError, RegionManager};

/// Reset and control-transfer seam.
///
/// Both operations diverge by construction: once either is invoked the
/// current control flow is over, and the caller path after the call is
/// unreachable rather than merely unused.
pub trait System {
    /// Perform a full device reset.
    fn reset(&mut self) -> !;

    /// Hand control to the application installed at `address`.
    ///
    /// Implementations must tear down peripherals, disable interrupts,
    /// point the vector table base at `address`, and jump to the entry
    /// point stored at `address + 4`. Returning from the application is
    /// an unrecoverable fault.
    fn launch(&mut self, address: u32) -> !;
}

/// Flash-resident record describing the installed application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgTable {
    /// Application load address.
    pub address: u32,
    /// Application image size in bytes.
    pub size: u32,
    /// Expected CRC32 of the image.
    pub crc: u32,
}

impl ArgTable {
    /// On-flash record size.
    pub const WIRE_SIZE: usize = 12;

    /// Read the argument table from its fixed flash location.
    ///
    /// Returns `Ok(None)` when no plausible record is present: an
    /// erased sector (all-ones address) or a size that cannot describe
    /// an application image.
    pub fn load<F: FlashDriver>(
        region: &mut RegionManager<F>,
    ) -> Result<Option<Self>, FlashError> {
        let mut raw = [0u8; Self::WIRE_SIZE];
        region.read(ARG_ADDRESS, &mut raw)?;

        let table = Self {
            address: LittleEndian::read_u32(&raw[0..4]),
            size: LittleEndian::read_u32(&raw[4..8]),
            crc: LittleEndian::read_u32(&raw[8..12]),
        };

        if table.address == u32::MAX {
            // erased flash, nothing provisioned
            return Ok(None);
        }
        if table.size == 0 || table.size > APP_SIZE {
            warn!("argument table size {} is implausible", table.size);
            return Ok(None);
        }
        Ok(Some(table))
    }
}

/// Verify the installed application and return its address.
///
/// Recomputes the CRC32 over `[address, address + size)` and compares
/// it with the stored value. `Ok(None)`, whether from a missing table
/// or a checksum mismatch, means the device must stay in update mode.
pub fn verified_entry<F: FlashDriver>(
    region: &mut RegionManager<F>,
) -> Result<Option<u32>, FlashError> {
    let Some(table) = ArgTable::load(region)? else {
        info!("no application argument table");
        return Ok(None);
    };

    let live = region.checksum_range(table.address, table.size)?;
    if live != table.crc {
        warn!("application crc mismatch: {live:#010x} != {:#010x}", table.crc);
        return Ok(None);
    }

    info!("application verified at {:#010x}", table.address);
    Ok(Some(table.address))
}
