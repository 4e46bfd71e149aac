//! Transposes the `Song -> Section -> VoiceSlot` tree built by
//! [`crate::tree`] into `Song -> Voice -> Section`, trimming any voice
//! slots past the last one actually used in any section (spec.md §4.7).

use indexmap::IndexMap;

use crate::tree::{Song, SongSetTree, VoiceKey};

const VOICES_PER_SECTION: usize = 8;

/// One voice's appearance within a single section: its start pointer, and
/// its resolved end pointer (filled in earlier by [`crate::boundary`]).
#[derive(Debug, Clone)]
pub struct VoiceSectionEntry {
    pub voice_start_ptr: u16,
    pub end_spc_ptr: u16,
}

/// A song transposed into `max_voices` voice slots, each carrying one
/// entry per section (`None` where that section left the slot unused).
#[derive(Debug, Clone)]
pub struct ReorganizedSong {
    pub section_ptrs: Vec<u16>,
    pub voices: Vec<Vec<Option<VoiceSectionEntry>>>,
}

#[derive(Debug, Clone)]
pub struct ReorganizedSongSet {
    pub songs: IndexMap<u16, ReorganizedSong>,
}

pub fn reorganize(songs: &SongSetTree) -> ReorganizedSongSet {
    let mut out = IndexMap::new();
    for (&song_ptr, song) in songs {
        out.insert(song_ptr, reorganize_song(song));
    }
    ReorganizedSongSet { songs: out }
}

fn reorganize_song(song: &Song) -> ReorganizedSong {
    let section_ptrs: Vec<u16> = song.keys().copied().collect();
    let mut voices: Vec<Vec<Option<VoiceSectionEntry>>> =
        (0..VOICES_PER_SECTION).map(|_| Vec::with_capacity(section_ptrs.len())).collect();
    let mut max_voices = 0usize;

    for section_ptr in &section_ptrs {
        let section = &song[section_ptr];
        for (slot_index, (key, record)) in section.iter().enumerate() {
            let entry = match (key, record) {
                (VoiceKey::Used(start), Some(rec)) => {
                    max_voices = max_voices.max(slot_index + 1);
                    Some(VoiceSectionEntry {
                        voice_start_ptr: *start,
                        end_spc_ptr: rec
                            .end_spc_ptr
                            .expect("reorganize called before voice boundaries were resolved"),
                    })
                }
                _ => None,
            };
            voices[slot_index].push(entry);
        }
    }

    voices.truncate(max_voices);
    ReorganizedSong { section_ptrs, voices }
}
