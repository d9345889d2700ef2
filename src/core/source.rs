//! Literal-aware masking of JavaScript-family source
//!
//! Structural scans (lint rules, type erasure) run on a masked copy in which the
//! bodies of strings, template literals, regex literals and comments are blanked
//! with spaces. The copy keeps the byte length and the line breaks of the input,
//! so an offset found in the mask indexes the original text directly.

/// Kind of literal or comment that was left open at end of input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    Template,
    BlockComment,
}

impl LiteralKind {
    pub fn describe(&self) -> &'static str {
        match self {
            LiteralKind::String => "string literal",
            LiteralKind::Template => "template literal",
            LiteralKind::BlockComment => "block comment",
        }
    }
}

/// First literal that was never closed, by byte offset of its opening delimiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unterminated {
    pub kind: LiteralKind,
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct MaskedSource {
    text: String,
    unterminated: Option<Unterminated>,
}

impl MaskedSource {
    pub fn new(source: &str) -> Self {
        mask(source)
    }

    /// Masked text, byte-aligned with the source
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn unterminated(&self) -> Option<Unterminated> {
        self.unterminated
    }
}

enum Frame {
    Template,
    Interpolation { depth: usize },
}

/// Bytes after which a `/` starts a regex literal rather than a division
const REGEX_PRECEDERS: &[u8] = b"(,=:[!&|?{};+-*%<>~^}";

/// Keywords after which a `/` starts a regex literal
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "in", "of", "delete", "void", "throw", "new", "instanceof",
    "yield", "await", "else", "do",
];

fn mask(source: &str) -> MaskedSource {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let mut stack: Vec<Frame> = Vec::new();
    let mut template_start = 0usize;
    let mut unterminated: Option<Unterminated> = None;
    let mut last_code: Option<usize> = None;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];

        if matches!(stack.last(), Some(Frame::Template)) {
            match b {
                b'\\' => i += 2,
                b'`' => {
                    stack.pop();
                    if stack.is_empty() {
                        blank(&mut out, template_start + 1, i);
                        last_code = Some(i);
                    }
                    i += 1;
                }
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    stack.push(Frame::Interpolation { depth: 0 });
                    i += 2;
                }
                _ => i += 1,
            }
            continue;
        }

        match b {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                let end = find_byte(bytes, i, b'\n').unwrap_or(bytes.len());
                blank(&mut out, i, end);
                i = end;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match find_seq(bytes, i + 2, b"*/") {
                Some(end) => {
                    blank(&mut out, i, end + 2);
                    i = end + 2;
                }
                None => {
                    record(&mut unterminated, LiteralKind::BlockComment, i);
                    blank(&mut out, i, bytes.len());
                    i = bytes.len();
                }
            },
            b'\'' | b'"' => {
                let (end, closed) = scan_string(bytes, i);
                blank(&mut out, i + 1, end);
                if closed {
                    last_code = Some(end);
                    i = end + 1;
                } else {
                    record(&mut unterminated, LiteralKind::String, i);
                    last_code = Some(i);
                    i = end;
                }
            }
            b'`' => {
                if stack.is_empty() {
                    template_start = i;
                }
                stack.push(Frame::Template);
                i += 1;
            }
            b'/' if regex_allowed(bytes, last_code) => match scan_regex(bytes, i) {
                Some(end) => {
                    blank(&mut out, i + 1, end);
                    last_code = Some(end);
                    i = end + 1;
                }
                None => {
                    last_code = Some(i);
                    i += 1;
                }
            },
            b'{' => {
                if let Some(Frame::Interpolation { depth }) = stack.last_mut() {
                    *depth += 1;
                }
                last_code = Some(i);
                i += 1;
            }
            b'}' => {
                let closes_interpolation =
                    matches!(stack.last(), Some(Frame::Interpolation { depth: 0 }));
                if closes_interpolation {
                    stack.pop();
                } else if let Some(Frame::Interpolation { depth }) = stack.last_mut() {
                    *depth -= 1;
                }
                last_code = Some(i);
                i += 1;
            }
            _ => {
                if !b.is_ascii_whitespace() {
                    last_code = Some(i);
                }
                i += 1;
            }
        }
    }

    if !stack.is_empty() {
        record(&mut unterminated, LiteralKind::Template, template_start);
        blank(&mut out, template_start + 1, bytes.len());
    }

    // Only whole multi-byte sequences are ever blanked, so this stays valid UTF-8
    let text = String::from_utf8(out)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned());

    MaskedSource { text, unterminated }
}

fn record(slot: &mut Option<Unterminated>, kind: LiteralKind, offset: usize) {
    if slot.is_none() {
        *slot = Some(Unterminated { kind, offset });
    }
}

/// Replace `out[start..end]` with spaces, keeping newlines
fn blank(out: &mut [u8], start: usize, end: usize) {
    let end = end.min(out.len());
    if start >= end {
        return;
    }
    for byte in &mut out[start..end] {
        if *byte != b'\n' {
            *byte = b' ';
        }
    }
}

fn find_byte(bytes: &[u8], from: usize, needle: u8) -> Option<usize> {
    bytes
        .get(from..)?
        .iter()
        .position(|&b| b == needle)
        .map(|p| p + from)
}

fn find_seq(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Returns the index of the closing quote (and `true`), or of the newline/end
/// of input that left the string open (and `false`)
fn scan_string(bytes: &[u8], start: usize) -> (usize, bool) {
    let quote = bytes[start];
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\n' => return (j, false),
            c if c == quote => return (j, true),
            _ => j += 1,
        }
    }
    (bytes.len(), false)
}

/// Returns the index of the closing `/` of a regex literal on the same line
fn scan_regex(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 1;
    let mut in_class = false;
    while j < bytes.len() {
        match bytes[j] {
            b'\n' => return None,
            b'\\' => {
                j += 2;
                continue;
            }
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => return Some(j),
            _ => {}
        }
        j += 1;
    }
    None
}

fn regex_allowed(bytes: &[u8], last_code: Option<usize>) -> bool {
    let Some(pos) = last_code else {
        return true;
    };
    let c = bytes[pos];
    if REGEX_PRECEDERS.contains(&c) {
        return true;
    }
    if is_ident_byte(c) {
        let start = bytes[..=pos]
            .iter()
            .rposition(|&b| !is_ident_byte(b))
            .map_or(0, |p| p + 1);
        let word = std::str::from_utf8(&bytes[start..=pos]).unwrap_or("");
        return REGEX_KEYWORDS.contains(&word);
    }
    false
}

pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// 1-based line and column (in characters) of a byte offset
pub fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut column = 1u32;
    for (idx, ch) in source.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_keeps_length_and_lines() {
        let src = "const s = \"a{b}\";\n// }}}\nlet t = 'x';";
        let masked = MaskedSource::new(src);
        assert_eq!(masked.text().len(), src.len());
        assert_eq!(masked.text().lines().count(), src.lines().count());
        assert!(!masked.text().contains("{b}"));
        assert!(!masked.text().contains("}}}"));
        assert!(masked.unterminated().is_none());
    }

    #[test]
    fn test_mask_template_with_interpolation() {
        let src = "const s = `a ${ {x: '`'}.x } b`; main();";
        let masked = MaskedSource::new(src);
        assert!(masked.unterminated().is_none());
        assert!(masked.text().ends_with("; main();"));
        assert!(!masked.text().contains("x:"));
    }

    #[test]
    fn test_mask_regex_literal_but_not_division() {
        let src = "const r = /[/{]+/g; const half = total / 2 / 1;";
        let masked = MaskedSource::new(src);
        assert!(!masked.text().contains('{'));
        assert!(masked.text().contains("total / 2 / 1"));
    }

    #[test]
    fn test_mask_regex_after_return() {
        let masked = MaskedSource::new("function f() { return /}/.test(x); }");
        let opens = masked.text().matches('{').count();
        let closes = masked.text().matches('}').count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn test_unterminated_string() {
        let masked = MaskedSource::new("let a = 1;\nlet s = 'oops;\nlet b = 2;");
        assert_eq!(
            masked.unterminated(),
            Some(Unterminated {
                kind: LiteralKind::String,
                offset: 19
            })
        );
    }

    #[test]
    fn test_unterminated_block_comment_and_template() {
        let comment = MaskedSource::new("let a = 1; /* never closed");
        assert_eq!(
            comment.unterminated().map(|u| u.kind),
            Some(LiteralKind::BlockComment)
        );

        let template = MaskedSource::new("let a = `open ${1}");
        assert_eq!(
            template.unterminated().map(|u| u.kind),
            Some(LiteralKind::Template)
        );
    }

    #[test]
    fn test_line_col() {
        let src = "ab\ncdé\nf";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 3), (2, 1));
        assert_eq!(line_col(src, 5), (2, 3));
        assert_eq!(line_col(src, src.len() - 1), (3, 1));
    }
}
