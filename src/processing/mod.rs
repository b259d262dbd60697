pub mod chunking;
pub mod extract;

pub use chunking::{ChunkMetadata, ChunkSource, Chunker, TextChunk};
pub use extract::{ExtractError, extract_text, resolve_mime};
