//! Reads the chain of length-prefixed, destination-addressed data blocks
//! that make up one song set's payload, and assembles a sparse sound-CPU
//! RAM image from them. See spec.md §4.2.

use crate::error::MusicError;

/// The assembled, zero-padded sound-CPU RAM image for one song set, plus
/// the two mapping anchors every emitted note's address triple is computed
/// from (spec.md §3).
pub struct LoadedRam {
    pub spc_ram: Vec<u8>,
    pub spc_start_addr: u16,
    pub rom_equiv_of_spc_start_addr: usize,
    pub spc_engine_begin_romaddr: usize,
}

const ENGINE_DEST: u16 = 0x1500;
const SONG_POINTER_LIST_DEST: u16 = 0x5820;
const TERMINATOR: [u8; 4] = [0x00, 0x00, 0x00, 0x15];

/// Reads one `{length: u16, dest: u16, payload}` block's header and
/// returns its destination and payload slice. Any truncation is a parse
/// error, surfaced as `InvalidSongSet` so the caller can end enumeration
/// of the master table cleanly rather than aborting the whole extraction.
fn read_block(rom: &[u8], header_offset: usize) -> Result<(u16, &[u8]), MusicError> {
    let header = rom.get(header_offset..header_offset + 4).ok_or_else(|| {
        MusicError::InvalidSongSet(format!("truncated block header at rom offset {header_offset:#x}"))
    })?;
    let length = u16::from_le_bytes([header[0], header[1]]) as usize;
    let dest = u16::from_le_bytes([header[2], header[3]]);
    let payload_start = header_offset + 4;
    let payload = rom.get(payload_start..payload_start + length).ok_or_else(|| {
        MusicError::InvalidSongSet(format!("truncated block payload at rom offset {payload_start:#x}"))
    })?;
    Ok((dest, payload))
}

/// Loads the block chain for one song set starting at `header_rom_offset`
/// (a ROM offset derived from one master-table entry) and assembles the
/// RAM image, distinguishing composite mode (song set 0, which bundles the
/// SPC engine and global song pointer list) from plain mode (spec.md §4.2).
pub fn load_song_set(rom: &[u8], header_rom_offset: usize) -> Result<LoadedRam, MusicError> {
    let mut current = header_rom_offset;
    let mut engine_payload: Option<(usize, Vec<u8>)> = None;
    let mut song_pointer_payload: Option<Vec<u8>> = None;

    for _ in 0..4 {
        let (dest, payload) = read_block(rom, current)?;
        if dest == ENGINE_DEST {
            engine_payload = Some((current + 4, payload.to_vec()));
        }
        if dest == SONG_POINTER_LIST_DEST {
            song_pointer_payload = Some(payload.to_vec());
        }
        if engine_payload.is_some() && song_pointer_payload.is_some() {
            break;
        }
        current += 4 + payload.len();
    }

    let (fifth_dest, fifth_payload) = read_block(rom, current)?;

    let loaded = match (engine_payload, song_pointer_payload) {
        (Some((spc_engine_begin_romaddr, engine_block)), Some(_)) => {
            let spc_start_addr = SONG_POINTER_LIST_DEST;
            // the engine block is deposited at spc address 0x1500, so the
            // image it occupies runs from 0x1500 to 0x1500 + its length
            let engine_end = ENGINE_DEST as usize + engine_block.len();
            if (spc_start_addr as usize) < engine_end {
                return Err(MusicError::EngineOverlap {
                    engine_end,
                    spc_start_addr: spc_start_addr as usize,
                });
            }
            let mut spc_ram = vec![0u8; ENGINE_DEST as usize];
            spc_ram.extend_from_slice(&engine_block);
            spc_ram.resize(spc_start_addr as usize, 0);
            spc_ram.extend_from_slice(fifth_payload);
            LoadedRam {
                spc_ram,
                spc_start_addr,
                // the global song pointer list's own rom offset, tracked
                // via the 0x5820 block read during the first-four pass
                rom_equiv_of_spc_start_addr: rom_equiv_of_song_pointer_block(rom, header_rom_offset)?,
                spc_engine_begin_romaddr,
            }
        }
        _ => {
            let rom_equiv_of_spc_start_addr = current + 4;
            let terminator_offset = current + 4 + fifth_payload.len();
            let terminator = rom.get(terminator_offset..terminator_offset + 4).ok_or_else(|| {
                MusicError::InvalidSongSet(format!(
                    "ROM ended before terminator at offset {terminator_offset:#x}"
                ))
            })?;
            if terminator != TERMINATOR {
                return Err(MusicError::InvalidSongSet(format!(
                    "expected 00 00 00 15 terminator at rom offset {terminator_offset:#x}, found {terminator:02x?}"
                )));
            }
            let mut spc_ram = vec![0u8; fifth_dest as usize];
            spc_ram.extend_from_slice(fifth_payload);
            LoadedRam {
                spc_ram,
                spc_start_addr: fifth_dest,
                rom_equiv_of_spc_start_addr,
                spc_engine_begin_romaddr: 0,
            }
        }
    };

    Ok(loaded)
}

/// Re-walks the first four blocks to recover the rom offset of the
/// 0x5820-destined payload. Kept as a tiny second pass rather than
/// threading an extra `Option<usize>` through the composite-mode branch
/// above, since the first-four loop already discards that offset once
/// both special blocks are found.
fn rom_equiv_of_song_pointer_block(rom: &[u8], header_rom_offset: usize) -> Result<usize, MusicError> {
    let mut current = header_rom_offset;
    for _ in 0..4 {
        let (dest, payload) = read_block(rom, current)?;
        if dest == SONG_POINTER_LIST_DEST {
            return Ok(current + 4);
        }
        current += 4 + payload.len();
    }
    Err(MusicError::InvalidSongSet(
        "composite mode detected but 0x5820 block vanished on second pass".to_string(),
    ))
}
