//! Pitch naming and the instrument-id naming convention shared by notes and
//! percussion notes. `bytevalue` is the exact inverse of the pitch naming
//! in spec.md §4.6, grounded on `examples/original_source/notes.py` (kept
//! out of spec.md's distillation but needed by the modifier below).

use crate::error::MusicError;

const NOTE_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Converts a pitched-note command byte (`0x80..0xC8`) to its name, e.g.
/// `0x80` -> `"C1"`.
pub fn pitch_name(byte: u8) -> String {
    let n = byte.wrapping_sub(0x80) as usize;
    let octave = n / 12 + 1;
    format!("{}{}", NOTE_NAMES[n % 12], octave)
}

/// Converts a name like `"C7"` back to its command byte. This is the
/// modifier's side of the "Pitch invertibility" property in spec.md §8.
pub fn bytevalue(name_octave: &str) -> Result<u8, MusicError> {
    let split_at = name_octave
        .len()
        .checked_sub(1)
        .ok_or_else(|| MusicError::AddressFormat(name_octave.to_string()))?;
    let (key_name, octave_str) = name_octave.split_at(split_at);
    let octave: i32 = octave_str
        .parse()
        .map_err(|_| MusicError::AddressFormat(name_octave.to_string()))?;
    let key_num = NOTE_NAMES
        .iter()
        .position(|n| *n == key_name)
        .ok_or_else(|| MusicError::AddressFormat(name_octave.to_string()))?;
    let value = 0x80 + (octave - 1) * 12 + key_num as i32;
    if !(0x80..0xC8).contains(&value) {
        return Err(MusicError::AddressFormat(name_octave.to_string()));
    }
    Ok(value as u8)
}

/// Instrument naming from spec.md §4.6: `global` below the vanilla-engine's
/// custom-instrument threshold, `custom` at or above it.
pub fn instrument(id: u8) -> String {
    if id < 0x18 {
        format!("global0x{:x}", id)
    } else {
        format!("custom0x{:x}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_invertibility_holds_for_every_note_byte() {
        for n in 0u8..72 {
            let byte = 0x80 + n;
            let name = pitch_name(byte);
            assert_eq!(bytevalue(&name).unwrap(), byte, "name was {name}");
        }
    }

    #[test]
    fn octave_boundaries_match_the_source() {
        assert_eq!(pitch_name(0x80), "C1");
        assert_eq!(pitch_name(0x90), "E2");
        assert_eq!(pitch_name(0xC7), "B6");
    }

    #[test]
    fn instrument_naming_switches_at_0x18() {
        assert_eq!(instrument(0x05), "global0x5");
        assert_eq!(instrument(0x17), "global0x17");
        assert_eq!(instrument(0x18), "custom0x18");
        assert_eq!(instrument(0x20), "custom0x20");
    }

    #[test]
    fn rejects_out_of_range_names() {
        assert!(bytevalue("Z5").is_err());
        assert!(bytevalue("C99").is_err());
    }
}
