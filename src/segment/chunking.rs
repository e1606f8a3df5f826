//! Overlapping window splitting for oversized segments.
//!
//! Lengths and offsets are counted in characters, not bytes.

/// One window of a split text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// Inclusive character offset.
    pub start: usize,
    /// Exclusive character offset.
    pub end: usize,
    pub text: String,
}

/// Overlap actually applied for a given maximum.
///
/// An overlap that would stall the walk (`>= max_len`) falls back to a third of the window.
#[must_use]
pub const fn effective_overlap(max_len: usize, overlap: usize) -> usize {
    if overlap >= max_len {
        max_len / 3
    } else {
        overlap
    }
}

/// Split `text` into windows of at most `max_len` characters where each
/// window starts `overlap` characters before the previous one ended.
///
/// The last window always ends at the end of the text. Text that already
/// fits comes back as a single window.
#[must_use]
pub fn split_windows(text: &str, max_len: usize, overlap: usize) -> Vec<Window> {
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = offsets.len() - 1;

    if max_len == 0 || len <= max_len {
        return vec![Window {
            start: 0,
            end: len,
            text: text.to_string(),
        }];
    }

    let overlap = effective_overlap(max_len, overlap);
    let mut windows = Vec::with_capacity(len / (max_len - overlap) + 1);
    let mut start = 0;
    loop {
        let end = (start + max_len).min(len);
        windows.push(Window {
            start,
            end,
            text: text[offsets[start]..offsets[end]].to_string(),
        });
        if end == len {
            break;
        }
        start = end - overlap;
    }
    windows
}
