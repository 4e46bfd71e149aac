//! Finds each voice's `end_spc_ptr` with a light parse that shares the
//! decoder's command classification but discards every emitted note and
//! the resulting `SpcState` (spec.md §4.5, §9's design note).

use std::collections::HashSet;

use crate::decoder::{self, AddressContext, SpcState, StepOutcome};
use crate::error::MusicError;

/// A voice's command stream ends at the first of: a zero byte, the start
/// address of another voice, or a song pointer (spec.md §4.5).
pub fn find_voice_end(
    spc_ram: &[u8],
    voice_start: u16,
    voice_start_boundaries: &HashSet<u16>,
    song_ptrs: &HashSet<u16>,
) -> Result<u16, MusicError> {
    let dummy_ctx = AddressContext {
        spc_start_addr: 0,
        rom_equiv_of_spc_start_addr: 0,
        spc_engine_begin_romaddr: 0,
    };
    let mut state = SpcState::default();
    let mut addr = voice_start;
    loop {
        let b = *spc_ram
            .get(addr as usize)
            .ok_or_else(|| MusicError::InvalidSongSet(format!("voice stream ran off spc ram at 0x{addr:04x}")))?;
        if b == 0 {
            break;
        }
        if addr != voice_start && voice_start_boundaries.contains(&addr) {
            break;
        }
        if song_ptrs.contains(&addr) {
            break;
        }
        match decoder::classify_command(spc_ram, addr, &mut state, &dummy_ctx, false)? {
            StepOutcome::Plain { length, .. } => addr = addr.wrapping_add(length),
            StepOutcome::Subsection { .. } => addr = addr.wrapping_add(4),
        }
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_at_zero_byte() {
        let mut ram = vec![0u8; 0x10000];
        ram[0x6000] = 0xC9; // rest, length 1
        ram[0x6001] = 0x00;
        let end = find_voice_end(&ram, 0x6000, &HashSet::new(), &HashSet::new()).unwrap();
        assert_eq!(end, 0x6001);
    }

    #[test]
    fn stops_when_colliding_with_another_voice_start() {
        let mut ram = vec![0u8; 0x10000];
        ram[0x6000] = 0xC9;
        ram[0x6001] = 0xC9;
        ram[0x6002] = 0xC9;
        let mut boundaries = HashSet::new();
        boundaries.insert(0x6001);
        let end = find_voice_end(&ram, 0x6000, &boundaries, &HashSet::new()).unwrap();
        assert_eq!(end, 0x6001);
    }

    #[test]
    fn stops_when_colliding_with_a_song_pointer() {
        let mut ram = vec![0u8; 0x10000];
        ram[0x6000] = 0xC9;
        ram[0x6001] = 0xC9;
        let mut song_ptrs = HashSet::new();
        song_ptrs.insert(0x6001);
        let end = find_voice_end(&ram, 0x6000, &HashSet::new(), &song_ptrs).unwrap();
        assert_eq!(end, 0x6001);
    }

    #[test]
    fn skips_over_subsection_directives_without_following_them() {
        let mut ram = vec![0u8; 0x10000];
        ram[0x6000] = 0xEF;
        ram[0x6001] = 0x00;
        ram[0x6002] = 0x00; // target 0x0000, never visited by the light parse
        ram[0x6003] = 0x00; // the 4th byte, also the terminator
        let end = find_voice_end(&ram, 0x6000, &HashSet::new(), &HashSet::new()).unwrap();
        assert_eq!(end, 0x6003);
    }
}
