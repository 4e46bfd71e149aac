//! The ROM-integrity precondition gate (spec.md §4.3, §6, §8 scenario 6) and
//! small helpers for reading bytes at a bus address. Purely a precondition
//! check; it never mutates the ROM.

use crate::address;
use crate::error::MusicError;
use sha1::{Digest, Sha1};

/// SHA-1 of the vanilla "handle music queue" routine's three guarded
/// slices, concatenated in order.
const MUSIC_HANDLER_SHA1: &str = "a5b4992b133ff9847b1219b54b6f370249b62f78";

/// Where the master music pointer table's own 24-bit bus pointer is stored,
/// embedded inside the "handle music queue" routine.
const TABLE_POINTER_BUS_ADDR: &str = "$80:8f73";

struct GuardedSlice {
    bus_addr: &'static str,
    length: usize,
}

const GUARDED_SLICES: [GuardedSlice; 3] = [
    GuardedSlice { bus_addr: "$80:8f0c", length: 24 },
    GuardedSlice { bus_addr: "$80:8f2a", length: 73 },
    GuardedSlice { bus_addr: "$80:8f7c", length: 39 },
];

pub fn read_bus<'a>(rom: &'a [u8], bus_addr: &str, length: usize) -> Result<&'a [u8], MusicError> {
    let start = address::rom_of_bus(bus_addr)?;
    let end = start + length;
    rom.get(start..end)
        .ok_or_else(|| MusicError::PreconditionFailed(format!("ROM is too short to read {bus_addr} (+{length})")))
}

/// Fails with `PreconditionFailed` unless the ROM's music-queue handler is
/// byte-identical to vanilla across the three guarded regions. This is the
/// sole sanity gate the extractor performs before trusting the ROM's data
/// layout.
pub fn verify_music_handler(rom: &[u8]) -> Result<(), MusicError> {
    let mut hasher = Sha1::new();
    for slice in &GUARDED_SLICES {
        hasher.update(read_bus(rom, slice.bus_addr, slice.length)?);
    }
    let digest = format!("{:x}", hasher.finalize());
    if digest != MUSIC_HANDLER_SHA1 {
        return Err(MusicError::PreconditionFailed(
            "function $80:8f0c 'handle music queue' is not vanilla".to_string(),
        ));
    }
    Ok(())
}

/// Reads the 24-bit little-endian bus pointer embedded in the music-queue
/// handler and returns the master table's own starting ROM offset.
pub fn music_table_rom_offset(rom: &[u8]) -> Result<usize, MusicError> {
    let bytes = read_bus(rom, TABLE_POINTER_BUS_ADDR, 3)?;
    let (low, high, bank) = (bytes[0], bytes[1], bytes[2]);
    let bus_addr = format!("${:02x}:{:02x}{:02x}", bank, high, low);
    address::rom_of_bus(&bus_addr)
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
