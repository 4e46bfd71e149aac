//! Assembles the normative JSON tree from a reorganized song set: known
//! song-set names, song/section/voice id formatting, and the
//! `{empty: true}` placeholder for unused voice slots (spec.md §4.8, §6).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::decoder::NoteRecord;
use crate::reorganize::ReorganizedSongSet;

/// Per-voice, per-section decoded note streams, keyed by song start
/// pointer. Decoding happens one voice at a time across *all* its
/// sections in order, since `SpcState` is shared across a voice's
/// sections (spec.md §3) — the emitter only assembles what's already
/// been decoded, it never drives decoding itself.
pub type DecodedSongSet = IndexMap<u16, Vec<Vec<Option<Vec<NoteRecord>>>>>;

const GLOBAL_SONG_BOUNDARY: u16 = 0x5820;
const GLOBAL_SONG_ID_OFFSET: u16 = 5;

/// `id -> name` for the song sets vanilla Super Metroid ships (spec.md §6).
const KNOWN_SONG_SET_NAMES: &[(u8, &str)] = &[
    (0x00, "Default"),
    (0x03, "Title"),
    (0x06, "Zebes Asleep"),
    (0x09, "Crateria Indoor"),
    (0x0C, "Crateria Outdoor with Power Bombs"),
    (0x0F, "Green Brinstar"),
    (0x12, "Red Brinstar"),
    (0x15, "Upper Norfair"),
    (0x18, "Lower Norfair"),
    (0x1B, "Maridia"),
    (0x1E, "Tourian"),
    (0x21, "Mother Brain"),
    (0x24, "Ridley etc"),
    (0x27, "Kraid etc"),
    (0x2A, "Botwoon/Spore"),
    (0x2D, "Ceres"),
    (0x30, "Wrecked Ship"),
    (0x33, "Zebes Exploding"),
    (0x36, "Intro"),
    (0x39, "Death Cry"),
    (0x3C, "Credits"),
    (0x3F, "VFX intro 1"),
    (0x42, "VFX intro 2"),
    (0x45, "Tourian version of Enemy Incoming and Kraid"),
    (0x48, "Tourian version of Crateria Outdoor with Power Bombs"),
];

fn vanilla_matching_song_set_name(id: u8) -> Option<&'static str> {
    KNOWN_SONG_SET_NAMES.iter().find(|&&(known_id, _)| known_id == id).map(|&(_, name)| name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MusicJson {
    pub romname: String,
    pub romsha1hash: String,
    pub songsets: Vec<SongSetJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongSetJson {
    pub id: String,
    #[serde(rename = "vanillaMatchingSongSetName", skip_serializing_if = "Option::is_none", default)]
    pub vanilla_matching_song_set_name: Option<String>,
    pub songs: Vec<SongJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongJson {
    pub id: String,
    pub voices: Vec<VoiceJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceJson {
    pub id: usize,
    pub sections: Vec<SectionSlotJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectionSlotJson {
    Empty { empty: bool },
    Present(SectionJson),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionJson {
    #[serde(rename = "sectionId")]
    pub section_id: String,
    pub notes: Vec<NoteRecord>,
}

fn song_id(song_start_ptr: u16, song_index: usize) -> u16 {
    let base = song_index as u16;
    if song_start_ptr > GLOBAL_SONG_BOUNDARY {
        base + GLOBAL_SONG_ID_OFFSET
    } else {
        base
    }
}

/// Builds the song-set's JSON subtree from already-decoded note streams.
pub fn build_song_set_json(song_set_id: u8, songs: &ReorganizedSongSet, decoded: &DecodedSongSet) -> SongSetJson {
    let mut songs_json = Vec::with_capacity(songs.songs.len());
    for (song_index, (&song_start_ptr, song)) in songs.songs.iter().enumerate() {
        let decoded_song = &decoded[&song_start_ptr];
        let mut voices_json = Vec::with_capacity(song.voices.len());
        for (voice_index, voice) in song.voices.iter().enumerate() {
            let mut sections_json = Vec::with_capacity(voice.len());
            for (section_index, _entry) in voice.iter().enumerate() {
                let slot = match &decoded_song[voice_index][section_index] {
                    None => SectionSlotJson::Empty { empty: true },
                    Some(notes) => {
                        let section_id = format!(
                            "song{:02x}{:02x}voice{}section{}",
                            song_set_id, song_id(song_start_ptr, song_index), voice_index, section_index
                        );
                        SectionSlotJson::Present(SectionJson { section_id, notes: notes.clone() })
                    }
                };
                sections_json.push(slot);
            }
            voices_json.push(VoiceJson { id: voice_index, sections: sections_json });
        }
        songs_json.push(SongJson {
            id: format!("{:02x}", song_id(song_start_ptr, song_index)),
            voices: voices_json,
        });
    }

    SongSetJson {
        id: format!("{song_set_id:02x}"),
        vanilla_matching_song_set_name: vanilla_matching_song_set_name(song_set_id).map(str::to_string),
        songs: songs_json,
    }
}
