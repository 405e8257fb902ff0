//! Fixed-size overlapping text windows.
//!
//! Windows are measured in characters with offsets tracked in character
//! positions: with window 500 / overlap 100, each window after the first
//! starts 400 characters into the previous one. A 1200-character input
//! yields [0,500), [400,900), [800,1200).

/// One window of the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    /// Inclusive start, in characters.
    pub start_offset: usize,
    /// Exclusive end, in characters.
    pub end_offset: usize,
}

/// Split `text` into overlapping windows of `window` characters with
/// `overlap` characters shared between neighbors. The step is clamped to at
/// least 1 so a degenerate overlap cannot loop forever.
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<TextChunk> {
    if text.trim().is_empty() || window == 0 {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let step = window.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let end = (start + window).min(total);
        chunks.push(TextChunk {
            text: chars[start..end].iter().collect(),
            start_offset: start,
            end_offset: end,
        });
        if end == total {
            break;
        }
        start += step;
    }

    chunks
}

/// Rough token estimate: 1 token ≈ 4 characters.
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
