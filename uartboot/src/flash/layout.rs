//! STM32F40x internal-flash memory map.
//!
//! The chip exposes 1 MiB of flash as twelve unevenly sized sectors;
//! erase granularity is one sector. The map is carved into the
//! bootloader image (protected), the argument table, and the
//! application region.

/// First byte of internal flash.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Sector sizes in address order (STM32F405/407 memory map).
pub const SECTOR_SIZES: [u32; 12] = [
    16 * 1024,
    16 * 1024,
    16 * 1024,
    16 * 1024,
    64 * 1024,
    128 * 1024,
    128 * 1024,
    128 * 1024,
    128 * 1024,
    128 * 1024,
    128 * 1024,
    128 * 1024,
];

/// Bootloader image location (the protected region).
pub const BOOT_ADDRESS: u32 = 0x0800_0000;
/// Bootloader image size.
pub const BOOT_SIZE: u32 = 16 * 1024;

/// Argument-table sector location.
pub const ARG_ADDRESS: u32 = 0x0800_4000;
/// Argument-table sector size.
pub const ARG_SIZE: u32 = 16 * 1024;

/// Application region location.
pub const APP_ADDRESS: u32 = 0x0800_8000;
/// Application region size.
pub const APP_SIZE: u32 = 256 * 1024;

/// Programming word width in bytes.
pub const PROGRAM_WORD: usize = 4;

/// One entry of the sector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    /// Sector number, as passed to the flash driver.
    pub index: usize,
    /// First byte of the sector.
    pub address: u32,
    /// Sector size in bytes.
    pub size: u32,
}

impl Sector {
    /// Whether this sector overlaps the half-open range
    /// `[address, address + size)`, even partially.
    pub fn overlaps(&self, address: u32, size: u32) -> bool {
        ranges_intersect(self.address, self.size, address, size)
    }
}

/// Iterate the sector table in address order.
pub fn sectors() -> impl Iterator<Item = Sector> {
    SECTOR_SIZES.iter().scan(FLASH_BASE, |next, &size| {
        let address = *next;
        *next += size;
        Some((address, size))
    })
    .enumerate()
    .map(|(index, (address, size))| Sector {
        index,
        address,
        size,
    })
}

/// Total flash size covered by the sector table.
pub fn flash_size() -> u32 {
    SECTOR_SIZES.iter().sum()
}

/// Whether `[address, address + size)` intersects the protected
/// bootloader region.
pub fn is_protected(address: u32, size: u32) -> bool {
    ranges_intersect(BOOT_ADDRESS, BOOT_SIZE, address, size)
}

fn ranges_intersect(a: u32, a_len: u32, b: u32, b_len: u32) -> bool {
    // u64 arithmetic: the host controls b and b_len, and a range
    // ending exactly at the 4 GiB boundary must not wrap.
    let a_end = u64::from(a) + u64::from(a_len);
    let b_end = u64::from(b) + u64::from(b_len);
    a_len > 0 && b_len > 0 && u64::from(a) < b_end && u64::from(b) < a_end
}
