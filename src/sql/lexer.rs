//! Minimal MySQL lexical scanner.
//!
//! Splits SQL text into code, quoted and comment segments so that callers can
//! look for `?` placeholders or `;` separators without tripping over string
//! literals, quoted identifiers or comments.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    /// `'...'`, `"..."` or `` `...` ``.
    Quoted,
    /// `-- ...`, `# ...` or `/* ... */`.
    Comment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    /// Byte offset of `text` within the scanned SQL.
    pub start: usize,
    pub text: &'a str,
}

/// Scan `sql` into contiguous segments covering the whole input.
///
/// Unterminated quotes and block comments run to the end of the input.
pub fn segments(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut code_start = 0;
    let mut i = 0;

    while i < len {
        let end = match bytes[i] {
            q @ (b'\'' | b'"' | b'`') => Some((SegmentKind::Quoted, quoted_end(bytes, i, q))),
            b'-' if is_dash_comment(bytes, i) => Some((SegmentKind::Comment, line_end(bytes, i))),
            b'#' => Some((SegmentKind::Comment, line_end(bytes, i))),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                Some((SegmentKind::Comment, block_end(bytes, i)))
            }
            _ => None,
        };

        match end {
            Some((kind, end)) => {
                push_segment(&mut out, sql, SegmentKind::Code, code_start, i);
                push_segment(&mut out, sql, kind, i, end);
                i = end;
                code_start = end;
            }
            None => i += 1,
        }
    }
    push_segment(&mut out, sql, SegmentKind::Code, code_start, len);
    out
}

fn push_segment<'a>(
    out: &mut Vec<Segment<'a>>,
    sql: &'a str,
    kind: SegmentKind,
    start: usize,
    end: usize,
) {
    if end > start {
        out.push(Segment {
            kind,
            start,
            text: &sql[start..end],
        });
    }
}

// MySQL only treats `--` as a comment when followed by whitespace or EOF.
fn is_dash_comment(bytes: &[u8], i: usize) -> bool {
    bytes.get(i + 1) == Some(&b'-')
        && bytes
            .get(i + 2)
            .is_none_or(|b| b.is_ascii_whitespace())
}

fn quoted_end(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut j = start + 1;
    while j < bytes.len() {
        let b = bytes[j];
        if b == b'\\' && quote != b'`' {
            j += 2;
            continue;
        }
        if b == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    bytes.len()
}

fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

fn block_end(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 2)
}

/// Split SQL text into individual statements on top-level `;`.
///
/// Pieces that hold only whitespace or comments are dropped. Returned slices
/// are trimmed.
pub fn split_statements(sql: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut has_content = false;

    for seg in segments(sql) {
        match seg.kind {
            SegmentKind::Code => {
                for (offset, ch) in seg.text.char_indices() {
                    if ch == ';' {
                        let end = seg.start + offset;
                        if has_content {
                            out.push(sql[start..end].trim());
                        }
                        start = end + 1;
                        has_content = false;
                    } else if !ch.is_whitespace() {
                        has_content = true;
                    }
                }
            }
            SegmentKind::Quoted => has_content = true,
            SegmentKind::Comment => {}
        }
    }
    if has_content {
        out.push(sql[start..].trim());
    }
    out
}
