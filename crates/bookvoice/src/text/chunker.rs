//! Sentence-respecting text chunker for speech synthesis.
//!
//! The synthesizer degrades (and eventually crashes) on long inputs, so the
//! extracted book text is fed to it in bounded pieces.
//!
//! # Algorithm
//!
//! 1. Split the text into sentences on terminal punctuation (`.`, `!`, `?`).
//!    A run of terminal marks (`?!`, `...`) stays with its sentence, and any
//!    trailing text without a terminal mark becomes a final sentence.
//! 2. Greedily append sentences to the current chunk while
//!    `len(current) + 1 + len(next) <= max_chars`.
//! 3. Otherwise close the current chunk and start a new one with `next`.
//!
//! A sentence longer than `max_chars` becomes its own oversized chunk; it is
//! never truncated or dropped. Lengths are counted in `char`s.

use serde::{Deserialize, Serialize};

/// Default upper bound on chunk length, in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 300;

const TERMINAL_MARKS: [char; 3] = ['.', '!', '?'];

/// One unit of text handed to a single synthesis invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in synthesis order, starting at 0.
    pub index: usize,
    /// Space-joined sentences.
    pub text: String,
}

impl TextChunk {
    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if TERMINAL_MARKS.contains(&c) {
            while let Some(&next) = chars.peek() {
                if !TERMINAL_MARKS.contains(&next) {
                    break;
                }
                current.push(next);
                chars.next();
            }
            push_sentence(&mut sentences, &current);
            current.clear();
        }
    }
    push_sentence(&mut sentences, &current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Groups sentences into chunks of at most `max_chars` characters.
///
/// Returns an empty vector only for blank input. Text without any terminal
/// punctuation yields exactly one chunk holding the whole (trimmed) input.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for sentence in split_sentences(text) {
        let sentence_len = sentence.chars().count();

        if current.is_empty() {
            current = sentence;
            current_len = sentence_len;
        } else if current_len + 1 + sentence_len <= max_chars {
            current.push(' ');
            current.push_str(&sentence);
            current_len += 1 + sentence_len;
        } else {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
            });
            current = sentence;
            current_len = sentence_len;
        }
    }

    if !current.is_empty() {
        chunks.push(TextChunk {
            index: chunks.len(),
            text: current,
        });
    }

    chunks
}
