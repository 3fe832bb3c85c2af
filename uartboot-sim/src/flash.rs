//! In-memory flash model.
//!
//! Emulates the device's 1 MiB internal flash with NOR semantics:
//! erase sets a whole sector to `0xFF`, programming can only clear
//! bits. The backing store is shared so the shutdown paths can persist
//! it after the agent has taken ownership of the driver.

use std::sync::{Arc, Mutex};

use log::debug;
use uartboot::flash::layout::{FLASH_BASE, PROGRAM_WORD, flash_size, sectors};
use uartboot::flash::{FlashDriver, FlashError};

/// Shared flash contents.
pub type FlashImage = Arc<Mutex<Vec<u8>>>;

/// Create a flash image, blank (`0xFF`) unless initial contents are
/// given.
pub fn image(initial: Option<Vec<u8>>) -> FlashImage {
    let mut mem = vec![0xFF; flash_size() as usize];
    if let Some(initial) = initial {
        let len = initial.len().min(mem.len());
        mem[..len].copy_from_slice(&initial[..len]);
    }
    Arc::new(Mutex::new(mem))
}

/// Flash driver over a shared [`FlashImage`].
pub struct SimFlash {
    mem: FlashImage,
}

impl SimFlash {
    /// Wrap a shared image.
    pub fn new(mem: FlashImage) -> Self {
        Self { mem }
    }

    fn offset(address: u32, len: usize, total: usize) -> Result<usize, FlashError> {
        address
            .checked_sub(FLASH_BASE)
            .map(|o| o as usize)
            .filter(|o| o + len <= total)
            .ok_or(FlashError::Read { address })
    }
}

impl FlashDriver for SimFlash {
    fn erase_sector(&mut self, index: usize) -> Result<(), FlashError> {
        let sector = sectors().nth(index).ok_or(FlashError::Erase(index))?;
        debug!("erase sector {index} at {:#010x}", sector.address);
        let mut mem = self.mem.lock().expect("flash image lock");
        let offset = (sector.address - FLASH_BASE) as usize;
        mem[offset..offset + sector.size as usize].fill(0xFF);
        Ok(())
    }

    fn program_word(&mut self, address: u32, word: u32) -> Result<(), FlashError> {
        let mut mem = self.mem.lock().expect("flash image lock");
        let offset = Self::offset(address, PROGRAM_WORD, mem.len())
            .map_err(|_| FlashError::Program { address })?;
        // NOR behavior: programming can only clear bits
        for (slot, byte) in mem[offset..offset + PROGRAM_WORD]
            .iter_mut()
            .zip(word.to_le_bytes())
        {
            *slot &= byte;
        }
        Ok(())
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        let mem = self.mem.lock().expect("flash image lock");
        let offset = Self::offset(address, buf.len(), mem.len())?;
        buf.copy_from_slice(&mem[offset..offset + buf.len()]);
        Ok(())
    }
}
