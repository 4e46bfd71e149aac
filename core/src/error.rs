use thiserror::Error;

/// Every way the extractor or modifier can fail, per the fatal/recoverable
/// split in spec.md §7. Only [`MusicError::InvalidSongSet`] is recoverable;
/// callers that hit it end the current song set's enumeration and keep
/// whatever was already collected. Everything else aborts the run.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("{0}")]
    PreconditionFailed(String),

    #[error("malformed bus address: {0:?}")]
    AddressFormat(String),

    #[error("invalid song set: {0}")]
    InvalidSongSet(String),

    #[error("SPC engine block overlaps the start of the music area (engine ends at 0x{engine_end:04x}, music area starts at 0x{spc_start_addr:04x})")]
    EngineOverlap {
        engine_end: usize,
        spc_start_addr: usize,
    },

    #[error("unknown command byte 0x{byte:02x} at spc address 0x{addr:04x}")]
    UnknownCommand { byte: u8, addr: u16 },

    #[error("percussion note at spc address 0x{addr:04x} played before command 0xfa set a base index")]
    UninitializedPercussion { addr: u16 },

    #[error("pitched note at spc address 0x{addr:04x} played before command 0xe0 set an instrument")]
    UninitializedInstrument { addr: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
