//! Sliding-window text chunker.
//!
//! Splits document text into fixed-size windows of `size` characters where
//! consecutive windows share `overlap` characters. Offsets are counted in
//! Unicode scalar values, so multi-byte text never splits inside a char.
//!
//! # Guarantees
//!
//! - Windows are produced lazily by [`ChunkWindows`], which is `Clone` and
//!   can be restarted from any clone.
//! - Offsets are strictly increasing and the windows cover `[0, len)`
//!   without gaps.
//! - Text of `len <= size` (including the empty string) yields exactly one
//!   window. Longer text yields `⌈(len - overlap) / (size - overlap)⌉`.
//!
//! # Example
//!
//! ```rust
//! use notes_rag_core::chunk::chunk;
//!
//! let windows: Vec<_> = chunk("abcdefghij", 4, 1).unwrap().collect();
//! assert_eq!(windows[0], (0, 4, "abcd"));
//! assert_eq!(windows[1], (3, 7, "defg"));
//! assert_eq!(windows.last().unwrap(), &(6, 10, "ghij"));
//! ```

use crate::error::{RagError, Result};
use crate::models::Chunk;
use crate::settings::RagSettings;

/// Lazy iterator over `(offset_start, offset_end, text)` windows.
#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    text: &'a str,
    size: usize,
    step: usize,
    start_char: usize,
    start_byte: usize,
    done: bool,
}

impl<'a> Iterator for ChunkWindows<'a> {
    type Item = (usize, usize, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let rest = &self.text[self.start_byte..];
        let (window_bytes, window_chars) = advance(rest, self.size);
        let end_byte = self.start_byte + window_bytes;
        let item = (
            self.start_char,
            self.start_char + window_chars,
            &self.text[self.start_byte..end_byte],
        );

        if end_byte >= self.text.len() {
            self.done = true;
        } else {
            // step < size and the window was full, so `rest` has at least `step` chars
            let (step_bytes, step_chars) = advance(rest, self.step);
            self.start_byte += step_bytes;
            self.start_char += step_chars;
        }

        Some(item)
    }
}

impl std::iter::FusedIterator for ChunkWindows<'_> {}

/// Byte length and char count of the first `n` chars of `s` (or all of it).
fn advance(s: &str, n: usize) -> (usize, usize) {
    match s.char_indices().nth(n) {
        Some((byte, _)) => (byte, n),
        None => (s.len(), s.chars().count()),
    }
}

/// Reject window parameters that would not make forward progress.
pub fn validate_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::InvalidConfig(
            "chunk size must be greater than 0".to_string(),
        ));
    }
    if overlap >= size {
        return Err(RagError::InvalidConfig(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        )));
    }
    Ok(())
}

/// Split `text` into overlapping windows.
///
/// # Errors
///
/// [`RagError::InvalidConfig`] when `size == 0` or `overlap >= size`.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<ChunkWindows<'_>> {
    validate_window(size, overlap)?;
    Ok(ChunkWindows {
        text,
        size,
        step: size - overlap,
        start_char: 0,
        start_byte: 0,
        done: false,
    })
}

/// Chunk a document with the current settings into owned [`Chunk`]s.
pub fn chunk_document(path: &str, text: &str, settings: &RagSettings) -> Result<Vec<Chunk>> {
    Ok(chunk(text, settings.chunk_size, settings.chunk_overlap)?
        .map(|(offset_start, offset_end, window)| Chunk {
            document_path: path.to_string(),
            offset_start,
            offset_end,
            text: window.to_string(),
        })
        .collect())
}

/// Number of windows [`chunk`] produces for text of `len` characters.
pub fn expected_chunk_count(len: usize, size: usize, overlap: usize) -> usize {
    if len <= size {
        return 1;
    }
    let step = size - overlap;
    (len - overlap).div_ceil(step)
}
