//! Minimal structural scanning of CSS text.
//!
//! Only enough of the grammar to find rule boundaries: comments and quoted
//! strings are skipped, parentheses are tracked so delimiters inside
//! `url(...)` or functional notation are ignored. Anything the scanner cannot
//! make sense of is handed back to the caller untouched.

/// Iterator over bytes that are outside comments and strings.
struct Structural<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Structural<'a> {
    fn new(text: &'a str, start: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: start,
        }
    }
}

impl Iterator for Structural<'_> {
    type Item = (usize, u8);

    fn next(&mut self) -> Option<Self::Item> {
        let len = self.bytes.len();
        while self.pos < len {
            let i = self.pos;
            let b = self.bytes[i];
            match b {
                b'/' if self.bytes.get(i + 1) == Some(&b'*') => {
                    self.pos = find_comment_end(self.bytes, i + 2).map_or(len, |end| end + 2);
                }
                b'"' | b'\'' => {
                    self.pos = find_string_end(self.bytes, i + 1, b).map_or(len, |end| end + 1);
                }
                _ => {
                    self.pos += 1;
                    return Some((i, b));
                }
            }
        }
        None
    }
}

fn find_comment_end(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(2)
        .position(|w| w == b"*/")
        .map(|p| p + from)
}

fn find_string_end(bytes: &[u8], from: usize, quote: u8) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// First occurrence of any `targets` byte outside strings, comments and parentheses.
pub(crate) fn find_top_level(text: &str, targets: &[u8]) -> Option<(usize, u8)> {
    let mut depth = 0usize;
    for (i, b) in Structural::new(text, 0) {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && targets.contains(&b) => return Some((i, b)),
            _ => {}
        }
    }
    None
}

/// Index of the `}` closing the `{` at `open`.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in Structural::new(text, open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split on top-level commas.
pub(crate) fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some((idx, _)) = find_top_level(rest, b",") {
        parts.push(&rest[..idx]);
        rest = &rest[idx + 1..];
    }
    parts.push(rest);
    parts
}
