//! Top-level orchestration: wires `TableWalker -> BlockLoader -> TreeBuilder
//! -> VoiceBoundaryFinder -> CommandDecoder -> TreeReorganizer -> Emitter`
//! together into one `extract` call (spec.md §2's data-flow line).

use std::collections::HashSet;

use indexmap::IndexMap;
use log::{info, warn};

use crate::block;
use crate::boundary;
use crate::decoder::{self, AddressContext, SpcState};
use crate::emit::{self, DecodedSongSet, MusicJson};
use crate::error::MusicError;
use crate::reorganize::{self, ReorganizedSongSet};
use crate::rom;
use crate::table::TableWalker;
use crate::tree::{self, VoiceKey};

/// Runs the full extraction pipeline over a ROM image already read into
/// memory, returning the normative JSON tree.
pub struct Extractor;

impl Extractor {
    /// Verifies the ROM's music-queue handler, then walks the master table
    /// and decodes every song set it names. An `InvalidSongSet` error from
    /// any song set ends the master-table walk there, keeping whatever
    /// song sets decoded cleanly before it (spec.md §7).
    pub fn extract(rom_bytes: &[u8], romname: &str) -> Result<MusicJson, MusicError> {
        rom::verify_music_handler(rom_bytes)?;
        let table_rom_offset = rom::music_table_rom_offset(rom_bytes)?;

        let mut songsets = Vec::new();
        for entry in TableWalker::new(rom_bytes, table_rom_offset) {
            match Self::extract_song_set(rom_bytes, entry.id, entry.rom_offset) {
                Ok(song_set_json) => songsets.push(song_set_json),
                Err(MusicError::InvalidSongSet(reason)) => {
                    warn!("song set {:02x} ended enumeration: {reason}", entry.id);
                    break;
                }
                Err(other) => return Err(other),
            }
        }

        info!("extracted {} song set(s)", songsets.len());
        Ok(MusicJson {
            romname: romname.to_string(),
            romsha1hash: rom::sha1_hex(rom_bytes),
            songsets,
        })
    }

    fn extract_song_set(
        rom_bytes: &[u8],
        song_set_id: u8,
        header_rom_offset: usize,
    ) -> Result<crate::emit::SongSetJson, MusicError> {
        let loaded = block::load_song_set(rom_bytes, header_rom_offset)?;
        let built = tree::build_tree(&loaded.spc_ram, loaded.spc_start_addr)?;
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
                        )?;
                        record.end_spc_ptr = Some(end);
                    }
                }
            }
        }

        let reorganized = reorganize::reorganize(&songs);
        let decoded = Self::decode_song_set(&loaded.spc_ram, &reorganized, &loaded)?;
        Ok(emit::build_song_set_json(song_set_id, &reorganized, &decoded))
    }

    fn decode_song_set(
        spc_ram: &[u8],
        songs: &ReorganizedSongSet,
        loaded: &block::LoadedRam,
    ) -> Result<DecodedSongSet, MusicError> {
        let ctx = AddressContext {
            spc_start_addr: loaded.spc_start_addr,
            rom_equiv_of_spc_start_addr: loaded.rom_equiv_of_spc_start_addr,
            spc_engine_begin_romaddr: loaded.spc_engine_begin_romaddr,
        };

        let mut decoded: DecodedSongSet = IndexMap::new();
        for (&song_start_ptr, song) in &songs.songs {
            let mut decoded_voices = Vec::with_capacity(song.voices.len());
            for voice in &song.voices {
                let mut state = SpcState::default();
                let mut decoded_sections = Vec::with_capacity(voice.len());
                for entry in voice {
                    let notes = match entry {
                        None => None,
                        Some(entry) => Some(decoder::decode_section(
                            spc_ram,
                            entry.voice_start_ptr,
                            entry.end_spc_ptr,
                            &mut state,
                            &ctx,
                        )?),
                    };
                    decoded_sections.push(notes);
                }
                decoded_voices.push(decoded_sections);
            }
            decoded.insert(song_start_ptr, decoded_voices);
        }
        Ok(decoded)
    }
}
