//! Overlapping character-window chunker.
//!
//! Splits document text into passages of roughly `chunk_size` characters,
//! with consecutive passages sharing about `overlap` characters. Windows are
//! aligned to whitespace/non-whitespace token boundaries, so a word is never
//! cut in half and every passage is an exact (trimmed) substring of the
//! input.
//!
//! Lengths are counted in characters, not bytes.

/// Default window size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 900;

/// Default overlap between consecutive windows in characters.
pub const DEFAULT_OVERLAP: usize = 150;

/// A run of either whitespace or non-whitespace characters.
struct Token<'a> {
    text: &'a str,
    chars: usize,
}

/// Split text into alternating whitespace / non-whitespace runs.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    let mut in_space: Option<bool> = None;

    for (pos, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        match in_space {
            Some(prev) if prev != is_space => {
                tokens.push(Token {
                    text: &text[start..pos],
                    chars,
                });
                start = pos;
                chars = 0;
            }
            _ => {}
        }
        in_space = Some(is_space);
        chars += 1;
    }

    if start < text.len() {
        tokens.push(Token {
            text: &text[start..],
            chars,
        });
    }

    tokens
}

/// Split `text` into overlapping chunks.
///
/// Each window accumulates tokens until it holds at least `chunk_size`
/// characters; the next window starts roughly `chunk_size - overlap`
/// characters later. The step is clamped to at least one character so the
/// loop always makes progress, even for `overlap >= chunk_size`.
///
/// Empty windows (pure whitespace) are dropped, so an empty or blank input
/// yields no chunks.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let tokens = tokenize(text);
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        let mut window = String::new();
        let mut window_chars = 0;
        let mut end = start;
        while end < tokens.len() && window_chars < chunk_size {
            window.push_str(tokens[end].text);
            window_chars += tokens[end].chars;
            end += 1;
        }

        let trimmed = window.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= tokens.len() {
            break;
        }

        // Advance by re-accumulating from the current start, not globally.
        let mut consumed = 0;
        let mut next = start;
        while next < tokens.len() && consumed < step {
            consumed += tokens[next].chars;
            next += 1;
        }
        start = next;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 900, 150);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_and_blank_text() {
        assert!(chunk_text("", 900, 150).is_empty());
        assert!(chunk_text("   \n\t  ", 900, 150).is_empty());
    }

    #[test]
    fn test_tokens_rejoin_exactly() {
        let text = "  alpha  beta\n\ngamma\tdelta ";
        let rejoined: String = tokenize(text).iter().map(|t| t.text).collect();
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_long_text_produces_overlapping_chunks() {
        let text = (0..200)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&text, 100, 30);
        assert!(chunks.len() > 1);

        for pair in chunks.windows(2) {
            // The tail of each chunk reappears at the head of its successor.
            let last_word = pair[0].split_whitespace().last().unwrap();
            assert!(
                pair[1].contains(last_word),
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_chunks_are_substrings_and_non_empty() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        for chunk in chunk_text(&text, 64, 16) {
            assert!(!chunk.trim().is_empty());
            assert!(text.contains(&chunk));
        }
    }

    #[test]
    fn test_all_but_last_reach_chunk_size() {
        let text = "lorem ipsum dolor sit amet ".repeat(50);
        let chunks = chunk_text(&text, 80, 20);
        for chunk in &chunks[..chunks.len() - 1] {
            // Trimming removes at most the surrounding single spaces.
            assert!(chunk.chars().count() >= 78, "short chunk: {:?}", chunk);
        }
    }

    #[test]
    fn test_degenerate_overlap_terminates() {
        let text = "a b c d e f g h i j k l m n o p";
        let chunks = chunk_text(text, 4, 4);
        assert!(!chunks.is_empty());
        let chunks = chunk_text(text, 4, 10);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn test_single_huge_token() {
        let text = "x".repeat(5000);
        let chunks = chunk_text(&text, 900, 150);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 5000);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "ééééé ééééé ééééé";
        let chunks = chunk_text(text, 11, 0);
        assert_eq!(chunks[0], "ééééé ééééé");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta ".repeat(30);
        assert_eq!(chunk_text(&text, 50, 10), chunk_text(&text, 50, 10));
    }
}
