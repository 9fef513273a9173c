pub mod chunker;

pub use chunker::{chunk_text, split_sentences, TextChunk, DEFAULT_MAX_CHUNK_CHARS};
