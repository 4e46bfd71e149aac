//! The companion modifier: reads `music.json` back through the same typed
//! tree the emitter produces and rewrites specific note bytes in the ROM at
//! the addresses the extractor recorded. Grounded on
//! `examples/original_source/intervalrando.py` and `reverserando.py`
//! (spec.md §1, §6; supplemented per SPEC_FULL.md since the modifier's
//! rules are in scope, only its CLI harness is not).

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use rand::Rng;

use crate::decoder::NoteRecord;
use crate::emit::MusicJson;
use crate::error::MusicError;
use crate::notes;

/// The midpoint of the pitched-note range, used as a fallback when a
/// re-randomized interval would otherwise clamp twice in a row. Preserved
/// verbatim from the Python original, which calls it "a hack" in a comment
/// and leaves the reason unexplained (spec.md §9's modifier is reproduced
/// behaviorally, not "fixed").
const OUT_OF_RANGE_FALLBACK: u8 = ((0x80u16 + 0xc8u16) / 2) as u8;
const PITCH_LOW: i32 = 0x80;
const PITCH_HIGH: i32 = 0xc8;

/// A note-rewriting rule the modifier can apply to a ROM, given the JSON
/// tree an earlier extraction produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Re-randomizes each of the first 4 voices' per-song melodic
    /// intervals, preserving the sign flip/clamp behavior of
    /// `intervalrando.py`.
    IntervalRandomize,
    /// Reverses each of the first 3 voices' note sequence per song, writing
    /// each note's *reversed* partner's pitch at the original's address,
    /// matching `reverserando.py`.
    ReverseSequence,
    /// Writes each note's own original pitch back at its own address.
    /// Exists to make spec.md §8's "modifier idempotence under identity"
    /// property directly exercisable as library code.
    Identity,
}

/// One ROM byte write, already resolved to a file offset.
struct Edit {
    rom_offset: u64,
    byte: u8,
}

fn parse_rom_offset(note: &NoteRecord) -> Result<u64, MusicError> {
    let addr = match note {
        NoteRecord::Pitched(n) => &n.address,
        NoteRecord::Percussion(n) => &n.address,
        NoteRecord::Tie(n) => &n.address,
        NoteRecord::Rest(n) => &n.address,
        NoteRecord::Subsection(_) => {
            return Err(MusicError::AddressFormat("subsection container has no address of its own".to_string()))
        }
    };
    let hex = addr.rom.strip_prefix("0x").unwrap_or(&addr.rom);
    u64::from_str_radix(hex, 16).map_err(|_| MusicError::AddressFormat(addr.rom.clone()))
}

/// Flattens a section's notes into the melodic (pitched) notes visited by
/// interval randomization, recursing one level into subsection containers
/// exactly as `intervalrando.py`'s nested loop does.
fn pitched_notes(notes: &[NoteRecord]) -> Vec<&NoteRecord> {
    let mut out = Vec::new();
    for note in notes {
        match note {
            NoteRecord::Pitched(_) => out.push(note),
            NoteRecord::Subsection(sub) => {
                for sub_note in &sub.subsection.notes {
                    if matches!(sub_note, NoteRecord::Pitched(_)) {
                        out.push(sub_note);
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn pitched_note_name(note: &NoteRecord) -> &str {
    match note {
        NoteRecord::Pitched(n) => &n.note,
        _ => unreachable!("pitched_notes only collects Pitched variants"),
    }
}

fn interval_randomize_edits(music: &MusicJson, rng: &mut impl Rng) -> Result<Vec<Edit>, MusicError> {
    const MAX_VOICES: usize = 4;
    let mut edits = Vec::new();

    for songset in &music.songsets {
        for song in &songset.songs {
            for voice in song.voices.iter().take(MAX_VOICES) {
                let mut first_note = true;
                let mut prev_original: i32 = 0;
                let mut prev_modified: i32 = 0;

                for section in &voice.sections {
                    let crate::emit::SectionSlotJson::Present(section) = section else {
                        continue;
                    };
                    for note in pitched_notes(&section.notes) {
                        let original = notes::bytevalue(pitched_note_name(note))? as i32;
                        if first_note {
                            first_note = false;
                            prev_original = original;
                            prev_modified = original;
                            continue;
                        }
                        let orig_interval = original - prev_original;
                        let sign = if rng.gen_bool(0.5) { 1 } else { -1 };
                        let mut new_interval = sign * orig_interval;
                        if prev_modified + new_interval >= PITCH_HIGH || prev_modified + new_interval < PITCH_LOW {
                            new_interval = -new_interval;
                        }
                        prev_original = original;
                        prev_modified += new_interval;
                        if prev_modified >= PITCH_HIGH || prev_modified < PITCH_LOW {
                            prev_modified = OUT_OF_RANGE_FALLBACK as i32;
                        }
                        edits.push(Edit {
                            rom_offset: parse_rom_offset(note)?,
                            byte: prev_modified as u8,
                        });
                    }
                }
            }
        }
    }

    Ok(edits)
}

fn reverse_sequence_edits(music: &MusicJson) -> Result<Vec<Edit>, MusicError> {
    const MAX_VOICES: usize = 3;
    let mut edits = Vec::new();

    for songset in &music.songsets {
        for song in &songset.songs {
            for voice in song.voices.iter().take(MAX_VOICES) {
                let mut voice_notes: Vec<&NoteRecord> = Vec::new();
                for section in &voice.sections {
                    let crate::emit::SectionSlotJson::Present(section) = section else {
                        continue;
                    };
                    voice_notes.extend(pitched_notes(&section.notes));
                }
                for (addr_note, value_note) in voice_notes.iter().zip(voice_notes.iter().rev()) {
                    edits.push(Edit {
                        rom_offset: parse_rom_offset(addr_note)?,
                        byte: notes::bytevalue(pitched_note_name(value_note))?,
                    });
                }
            }
        }
    }

    Ok(edits)
}

fn identity_edits(music: &MusicJson) -> Result<Vec<Edit>, MusicError> {
    let mut edits = Vec::new();
    for songset in &music.songsets {
        for song in &songset.songs {
            for voice in &song.voices {
                for section in &voice.sections {
                    let crate::emit::SectionSlotJson::Present(section) = section else {
                        continue;
                    };
                    for note in pitched_notes(&section.notes) {
                        edits.push(Edit {
                            rom_offset: parse_rom_offset(note)?,
                            byte: notes::bytevalue(pitched_note_name(note))?,
                        });
                    }
                }
            }
        }
    }
    Ok(edits)
}

/// Applies `rule` to `music` and writes the resulting bytes into the ROM at
/// `rom_path`, seeking to each note's recorded `address.rom` in turn. The
/// file is opened read+write and flushed on every exit path, including
/// error paths, per spec.md §5.
pub fn apply(music: &MusicJson, rom_path: &Path, rule: Rule) -> Result<(), MusicError> {
    let edits = match rule {
        Rule::IntervalRandomize => interval_randomize_edits(music, &mut rand::thread_rng())?,
        Rule::ReverseSequence => reverse_sequence_edits(music)?,
        Rule::Identity => identity_edits(music)?,
    };

    let mut rom_file = File::options().read(true).write(true).open(rom_path)?;
    let result = write_edits(&mut rom_file, &edits);
    rom_file.flush()?;
    result
}

fn write_edits(rom_file: &mut File, edits: &[Edit]) -> Result<(), MusicError> {
    for edit in edits {
        rom_file.seek(SeekFrom::Start(edit.rom_offset))?;
        rom_file.write_all(&[edit.byte])?;
    }
    Ok(())
}
