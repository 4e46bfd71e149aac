pub mod address;
pub mod block;
pub mod boundary;
pub mod decoder;
pub mod emit;
pub mod error;
pub mod extractor;
pub mod modify;
pub mod notes;
pub mod reorganize;
pub mod rom;
pub mod table;
pub mod tree;

pub use emit::MusicJson;
pub use error::MusicError;
pub use extractor::Extractor;
pub use modify::Rule;
