//! Character-budget helpers.
//!
//! Budgets are counted in `char`s, never bytes, so slicing always lands on a
//! character boundary.

use std::mem;

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Clip `text` to `max_chars`, preferring to cut at whitespace.
pub fn clip(text: &str, max_chars: usize) -> String {
    let head = truncate_chars(text, max_chars);
    if head.len() == text.len() {
        return text.trim().to_string();
    }
    // Fall back to a hard cut when the head has no usable break
    match head.rfind(char::is_whitespace) {
        Some(idx) if idx > head.len() / 2 => head[..idx].trim_end().to_string(),
        _ => head.trim_end().to_string(),
    }
}

/// Split `text` into chunks of at most `limit` characters.
///
/// Paragraphs (blank-line separated) stay whole when they fit; longer ones are
/// split between words, and single words longer than `limit` are cut.
pub fn split_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunker = Chunker::new(limit);

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() <= limit {
            chunker.push(paragraph, "\n\n");
            continue;
        }

        chunker.flush();
        for word in paragraph.split_whitespace() {
            if word.chars().count() <= limit {
                chunker.push(word, " ");
                continue;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(limit) {
                chunker.push(&piece.iter().collect::<String>(), " ");
            }
        }
        chunker.flush();
    }

    chunker.finish()
}

struct Chunker {
    limit: usize,
    chunks: Vec<String>,
    current: String,
    len: usize,
}

impl Chunker {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            chunks: Vec::new(),
            current: String::new(),
            len: 0,
        }
    }

    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = piece.chars().count();
        if !self.current.is_empty() && self.len + separator.len() + piece_len > self.limit {
            self.flush();
        }
        if !self.current.is_empty() {
            self.current.push_str(separator);
            self.len += separator.len();
        }
        self.current.push_str(piece);
        self.len += piece_len;
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(mem::take(&mut self.current));
        }
        self.len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}
