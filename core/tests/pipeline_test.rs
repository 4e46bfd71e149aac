//! Exercises the full `TableWalker -> BlockLoader -> TreeBuilder ->
//! VoiceBoundaryFinder -> CommandDecoder -> TreeReorganizer -> Emitter`
//! pipeline end to end through public API only, against a tiny synthetic
//! song set. Mirrors the teacher's `core/tests/basic_test.rs`, which builds
//! a minimal synthetic ROM rather than shipping a real cartridge image.
//!
//! This doesn't go through `Extractor::extract` itself, since that also
//! requires the real vanilla ROM's SHA-1 precondition to hold over bytes
//! this test has no legitimate way to reconstruct; see
//! `core/src/extractor.rs`'s own inline test for the same tradeoff.

use std::collections::HashSet;

use sm_music_core::address;
use sm_music_core::boundary;
use sm_music_core::decoder::{self, AddressContext, SpcState};
use sm_music_core::emit;
use sm_music_core::reorganize;
use sm_music_core::table::TableWalker;
use sm_music_core::tree::{self, VoiceKey};
use sm_music_core::{block, notes};

fn block_bytes(dest: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&dest.to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn put_u16(ram: &mut [u8], addr: usize, value: u16) {
    let bytes = value.to_le_bytes();
    ram[addr] = bytes[0];
    ram[addr + 1] = bytes[1];
}

/// Builds a song set whose one song has two sections and one voice that
/// sets an instrument, plays two pitched notes, then rests.
fn synthetic_song_set_rom() -> (Vec<u8>, usize) {
    let mut rom = vec![0u8; 0x10_0000];

    let table_offset = 0x1000;
    let chain_offset = 0x2000usize;
    let bus = address::bus_of_rom(chain_offset);
    let parsed = bus.trim_start_matches('$');
    let (bank_str, offset_str) = parsed.split_once(':').unwrap();
    let bank = u8::from_str_radix(bank_str, 16).unwrap();
    let offset = u16::from_str_radix(offset_str, 16).unwrap();
    let offset_bytes = offset.to_le_bytes();
    rom[table_offset] = offset_bytes[0];
    rom[table_offset + 1] = offset_bytes[1];
    rom[table_offset + 2] = bank;
    rom[table_offset + 3] = 0;
    rom[table_offset + 4] = 0;
    rom[table_offset + 5] = 0;

    let mut cursor = chain_offset;
    for _ in 0..4 {
        let bytes = block_bytes(0x2500, &[0xAA]);
        rom[cursor..cursor + bytes.len()].copy_from_slice(&bytes);
        cursor += bytes.len();
    }

    let spc_start: u16 = 0x6000;
    let base = spc_start as usize;
    let mut music_payload = vec![0u8; 0x400];

    // one song, pointer value == spc_start+2: discovery halts the instant
    // its own *address* is reached, since that address is now a recorded
    // song-pointer key (see tree::build_tree's loop)
    put_u16(&mut music_payload, 0x6000 - base, 0x6002);
    // song (spc_start+2)'s section list: two sections, 0x6100 and 0x6200,
    // then terminator
    put_u16(&mut music_payload, 0x6002 - base, 0x6100);
    put_u16(&mut music_payload, 0x6004 - base, 0x6200);
    put_u16(&mut music_payload, 0x6006 - base, 0);
    // section 0x6100: voice 0 at 0x6300, rest unused
    put_u16(&mut music_payload, 0x6100 - base, 0x6300);
    for i in 1..8u16 {
        put_u16(&mut music_payload, (0x6100 + i * 2) as usize - base, 0);
    }
    // section 0x6200: same voice continues at 0x6380
    put_u16(&mut music_payload, 0x6200 - base, 0x6380);
    for i in 1..8u16 {
        put_u16(&mut music_payload, (0x6200 + i * 2) as usize - base, 0);
    }

    // voice stream at 0x6300: set instrument 0x05, a note, rest, terminator
    let v1 = 0x6300 - base;
    music_payload[v1] = 0xE0; // set instrument, length 2
    music_payload[v1 + 1] = 0x05;
    music_payload[v1 + 2] = 0x90; // note: n=16 -> E2
    music_payload[v1 + 3] = 0xC9; // rest
    music_payload[v1 + 4] = 0x00; // terminator

    // voice stream at 0x6380: another note, then terminator
    let v2 = 0x6380 - base;
    music_payload[v2] = 0x95; // note: n=21 -> A2
    music_payload[v2 + 1] = 0x00;

    let music_block = block_bytes(spc_start, &music_payload);
    rom[cursor..cursor + music_block.len()].copy_from_slice(&music_block);
    cursor += music_block.len();
    rom[cursor..cursor + 4].copy_from_slice(&[0x00, 0x00, 0x00, 0x15]);

    (rom, table_offset)
}

#[test]
fn full_pipeline_decodes_a_two_section_voice() {
    let (rom, table_offset) = synthetic_song_set_rom();
    let entry = TableWalker::new(&rom, table_offset).next().expect("one table entry");

    let loaded = block::load_song_set(&rom, entry.rom_offset).unwrap();
    let built = tree::build_tree(&loaded.spc_ram, loaded.spc_start_addr).unwrap();
    let mut songs = built.songs;
    let song_ptrs: HashSet<u16> = songs.keys().copied().collect();

    for song in songs.values_mut() {
        for section in song.values_mut() {
            for (key, record) in section.iter_mut() {
                if let (VoiceKey::Used(start), Some(record)) = (key, record) {
                    let end = boundary::find_voice_end(
                        &loaded.spc_ram,
                        *start,
                        &built.voice_start_boundaries,
                        &song_ptrs,
                    )
                    .unwrap();
                    record.end_spc_ptr = Some(end);
                }
            }
        }
    }

    let reorganized = reorganize::reorganize(&songs);
    assert_eq!(reorganized.songs.len(), 1);
    let (&song_start, song) = reorganized.songs.iter().next().unwrap();
    assert_eq!(song.voices.len(), 1, "only one voice slot was ever used");
    assert_eq!(song.voices[0].len(), 2, "voice appears in both sections");

    let ctx = AddressContext {
        spc_start_addr: loaded.spc_start_addr,
        rom_equiv_of_spc_start_addr: loaded.rom_equiv_of_spc_start_addr,
        spc_engine_begin_romaddr: loaded.spc_engine_begin_romaddr,
    };
    let mut decoded_sections = Vec::new();
    let mut state = SpcState::default();
    for entry in &song.voices[0] {
        let entry = entry.as_ref().expect("both sections use this voice");
        let notes = decoder::decode_section(&loaded.spc_ram, entry.voice_start_ptr, entry.end_spc_ptr, &mut state, &ctx).unwrap();
        decoded_sections.push(notes);
    }

    assert_eq!(decoded_sections[0].len(), 2, "instrument set, note, rest in section 1");
    assert_eq!(decoded_sections[1].len(), 1, "one note in section 2, sharing state from section 1");

    let mut decoded = indexmap::IndexMap::new();
    decoded.insert(song_start, vec![decoded_sections.into_iter().map(Some).collect()]);
    let song_set_json = emit::build_song_set_json(entry.id, &reorganized, &decoded);
    assert_eq!(song_set_json.songs.len(), 1);
    assert_eq!(song_set_json.songs[0].voices[0].sections.len(), 2);

    // sanity: the second section's note really is the A2 we wrote at 0x6380
    match &song_set_json.songs[0].voices[0].sections[1] {
        emit::SectionSlotJson::Present(section) => match &section.notes[0] {
            decoder::NoteRecord::Pitched(p) => assert_eq!(notes::bytevalue(&p.note).unwrap(), 0x95),
            other => panic!("expected a pitched note, got {other:?}"),
        },
        other => panic!("expected a present section, got {other:?}"),
    }
}
