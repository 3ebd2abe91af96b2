// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Text chunking for embedding long documents.
//!
//! Splits on blank-line paragraph boundaries and greedily accumulates
//! paragraphs up to the size limit. Oversized paragraphs are further split on
//! sentence boundaries; an oversized sentence is kept whole rather than
//! force-split. Pure function of its input.

use std::sync::OnceLock;

use regex::Regex;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8000;

/// Runs of non-terminator characters ending in `.`, `!` or `?`.
fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^.!?]+[.!?]+").expect("valid sentence regex"))
}

/// Split text into chunks of at most `max_chunk_size` characters.
///
/// A chunk may exceed the limit only when a single sentence does; such
/// sentences are emitted whole as oversized chunks.
pub fn chunk_text(text: &str, max_chunk_size: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        if current.len() + paragraph.len() > max_chunk_size {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
                current.clear();
            }

            if paragraph.len() > max_chunk_size {
                // Paragraph alone is too long, fall back to sentence runs.
                let sentences: Vec<&str> = sentence_pattern()
                    .find_iter(paragraph)
                    .map(|m| m.as_str())
                    .collect();
                let sentences = if sentences.is_empty() {
                    vec![paragraph]
                } else {
                    sentences
                };

                for sentence in sentences {
                    if current.len() + sentence.len() > max_chunk_size {
                        if !current.is_empty() {
                            chunks.push(current.trim().to_string());
                        }
                        current = sentence.to_string();
                    } else {
                        current.push_str(sentence);
                    }
                }
            } else {
                current = paragraph.to_string();
            }
        } else {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Split with the default size limit.
pub fn chunk_text_default(text: &str) -> Vec<String> {
    chunk_text(text, DEFAULT_MAX_CHUNK_SIZE)
}
