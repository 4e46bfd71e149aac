//! Conversions between the three address spaces in play while reconstructing
//! the sound CPU's memory: a ROM file offset, the cartridge bus address
//! (`$bb:hhll`), and an SPC (sound CPU) RAM address. See spec.md §3, §4.1.

use crate::error::MusicError;

/// LoROM bank size: each 32 KiB bank maps the upper half of a 64 KiB CPU
/// address window onto a slice of the ROM file.
const BANK_SIZE: usize = 0x8000;
const BANK_BASE: usize = 0x80;
const OFFSET_BASE: usize = 0x8000;

/// Parses `"$bb:hhll"` (the `$` is optional) into a ROM file offset.
///
/// Bank and offset are each parsed as arbitrary-width hex; the textual form
/// is not otherwise validated beyond requiring exactly one `:` and that both
/// halves parse as hex.
pub fn rom_of_bus(bus: &str) -> Result<usize, MusicError> {
    let trimmed = bus.strip_prefix('$').unwrap_or(bus);
    let (bank_str, offset_str) = trimmed
        .split_once(':')
        .ok_or_else(|| MusicError::AddressFormat(bus.to_string()))?;
    let bank = usize::from_str_radix(bank_str, 16)
        .map_err(|_| MusicError::AddressFormat(bus.to_string()))?;
    let offset = usize::from_str_radix(offset_str, 16)
        .map_err(|_| MusicError::AddressFormat(bus.to_string()))?;
    if bank < BANK_BASE || offset < OFFSET_BASE {
        return Err(MusicError::AddressFormat(bus.to_string()));
    }
    Ok((bank - BANK_BASE) * BANK_SIZE + (offset - OFFSET_BASE))
}

/// Formats a ROM file offset as `"$bb:hhll"`: lowercase hex, no padding on
/// the bank, offset padded to 4 digits. Downstream consumers parse this
/// exact textual form, so the formatting is load-bearing, not cosmetic.
pub fn bus_of_rom(rom_offset: usize) -> String {
    let bank = rom_offset / BANK_SIZE + BANK_BASE;
    let offset = rom_offset % BANK_SIZE + OFFSET_BASE;
    format!("${:x}:{:04x}", bank, offset)
}
