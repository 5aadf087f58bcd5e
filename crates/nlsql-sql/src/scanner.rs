//! Statement scanner.
//!
//! Splits a SQL script on `;` separators while stepping over the places a
//! `;` does not end a statement:
//! - single-quoted literals (`''` doubling, `E'..'` backslash escapes)
//! - double-quoted identifiers
//! - dollar-quoted bodies (`$$ .. $$`, `$tag$ .. $tag$`)
//! - `--` line comments and nested `/* .. */` block comments
//!
//! The scanner is a single forward pass with no backtracking. Unterminated
//! quotes and block comments are reported as [`ScanError`]; every other input
//! produces a (possibly empty) statement list.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    String,
    QuotedIdentifier,
    DollarQuoted,
    BlockComment,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::String => "string literal",
            Self::QuotedIdentifier => "quoted identifier",
            Self::DollarQuoted => "dollar-quoted string",
            Self::BlockComment => "block comment",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("unterminated {kind} starting at byte {offset}")]
    Unterminated { kind: LiteralKind, offset: usize },
}

/// One statement of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statement<'a> {
    /// Source text from the first keyword through the `;` (or end of input),
    /// with leading whitespace/comments removed.
    pub text: &'a str,
    /// Byte offset of `text` in the scanned input.
    pub offset: usize,
    /// Whether the statement ended with a `;`.
    pub terminated: bool,
}

impl<'a> Statement<'a> {
    /// Every place in the statement's code (outside literals and comments)
    /// where `keywords` appear in sequence, case-insensitively, each one
    /// followed by whitespace. Yields the byte offset of the first keyword
    /// within `text` and the text after the last keyword's whitespace.
    pub fn find_keywords(&self, keywords: &[&str]) -> Result<Vec<(usize, &'a str)>, ScanError> {
        let text = self.text;
        let bytes = text.as_bytes();
        let mut found = Vec::new();
        let mut i = 0usize;

        while i < bytes.len() {
            match bytes[i] {
                b'\'' => {
                    let backslash = is_escape_string_prefix(bytes, i);
                    i = skip_quoted(bytes, i, b'\'', backslash, LiteralKind::String)?;
                }
                b'"' => {
                    i = skip_quoted(bytes, i, b'"', false, LiteralKind::QuotedIdentifier)?;
                }
                b'-' if bytes.get(i + 1) == Some(&b'-') => {
                    i = skip_line_comment(bytes, i);
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = skip_block_comment(bytes, i)?;
                }
                b'$' => match dollar_tag_end(bytes, i) {
                    Some(tag_end) => i = skip_dollar_quoted(text, i, tag_end)?,
                    None => i += 1,
                },
                b if is_ident_byte(b) => {
                    if let Some(rest) = match_keywords(&text[i..], keywords) {
                        found.push((i, rest));
                    }
                    i += bytes[i..]
                        .iter()
                        .position(|&b| !is_ident_byte(b))
                        .unwrap_or(bytes.len() - i);
                }
                _ => i += 1,
            }
        }
        Ok(found)
    }
}

fn match_keywords<'a>(text: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let mut rest = text;
    for keyword in keywords {
        let head = rest.as_bytes().get(..keyword.len())?;
        if !head.eq_ignore_ascii_case(keyword.as_bytes()) {
            return None;
        }
        let after = &rest[keyword.len()..];
        let trimmed = after.trim_start();
        if trimmed.len() == after.len() {
            return None;
        }
        rest = trimmed;
    }
    Some(rest)
}

/// Split `sql` into statements. Empty statements (bare `;`, whitespace or
/// comments only) are dropped.
pub fn split_statements(sql: &str) -> Result<Vec<Statement<'_>>, ScanError> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut statements = Vec::new();
    let mut start = 0usize;
    let mut i = 0usize;

    while i < len {
        match bytes[i] {
            b'\'' => {
                let backslash = is_escape_string_prefix(bytes, i);
                i = skip_quoted(bytes, i, b'\'', backslash, LiteralKind::String)?;
            }
            b'"' => {
                i = skip_quoted(bytes, i, b'"', false, LiteralKind::QuotedIdentifier)?;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = skip_line_comment(bytes, i);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = skip_block_comment(bytes, i)?;
            }
            b'$' => match dollar_tag_end(bytes, i) {
                Some(tag_end) => i = skip_dollar_quoted(sql, i, tag_end)?,
                None => i += 1,
            },
            b';' => {
                push_statement(sql, start, i + 1, true, &mut statements)?;
                i += 1;
                start = i;
            }
            _ => i += 1,
        }
    }
    push_statement(sql, start, len, false, &mut statements)?;

    Ok(statements)
}

fn push_statement<'a>(
    sql: &'a str,
    start: usize,
    end: usize,
    terminated: bool,
    out: &mut Vec<Statement<'a>>,
) -> Result<(), ScanError> {
    let segment = &sql[start..end];
    let body = skip_leading_trivia(segment, start)?;
    let text = body.trim_end();
    if text.is_empty() || text == ";" {
        return Ok(());
    }
    out.push(Statement {
        text,
        offset: start + (segment.len() - body.len()),
        terminated,
    });
    Ok(())
}

fn skip_leading_trivia(segment: &str, base: usize) -> Result<&str, ScanError> {
    let mut rest = segment;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = match after.find('\n') {
                Some(nl) => &after[nl + 1..],
                None => "",
            };
        } else if trimmed.starts_with("/*") {
            let offset = base + (segment.len() - trimmed.len());
            let end = skip_block_comment(trimmed.as_bytes(), 0).map_err(|_| {
                ScanError::Unterminated {
                    kind: LiteralKind::BlockComment,
                    offset,
                }
            })?;
            rest = &trimmed[end..];
        } else {
            return Ok(trimmed);
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

// `E'...'` / `e'...'`, but not `some_e'...'`.
fn is_escape_string_prefix(bytes: &[u8], quote: usize) -> bool {
    if quote == 0 || !matches!(bytes[quote - 1], b'e' | b'E') {
        return false;
    }
    quote < 2 || !is_ident_byte(bytes[quote - 2])
}

fn skip_quoted(
    bytes: &[u8],
    open: usize,
    quote: u8,
    backslash_escapes: bool,
    kind: LiteralKind,
) -> Result<usize, ScanError> {
    let mut j = open + 1;
    while j < bytes.len() {
        let b = bytes[j];
        if backslash_escapes && b == b'\\' {
            j += 2;
        } else if b == quote {
            if bytes.get(j + 1) == Some(&quote) {
                j += 2;
            } else {
                return Ok(j + 1);
            }
        } else {
            j += 1;
        }
    }
    Err(ScanError::Unterminated { kind, offset: open })
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|nl| start + nl + 1)
        .unwrap_or(bytes.len())
}

fn skip_block_comment(bytes: &[u8], start: usize) -> Result<usize, ScanError> {
    let mut depth = 1usize;
    let mut j = start + 2;
    while j < bytes.len() {
        match (bytes[j], bytes.get(j + 1)) {
            (b'/', Some(b'*')) => {
                depth += 1;
                j += 2;
            }
            (b'*', Some(b'/')) => {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    return Ok(j);
                }
            }
            _ => j += 1,
        }
    }
    Err(ScanError::Unterminated {
        kind: LiteralKind::BlockComment,
        offset: start,
    })
}

/// End (exclusive) of a dollar-quote opening tag at `start`, or `None` when
/// the `$` is a positional parameter or part of an identifier.
fn dollar_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return None;
    }
    let mut j = start + 1;
    match bytes.get(j) {
        Some(b'$') => return Some(j + 1),
        Some(&b) if b.is_ascii_alphabetic() || b == b'_' || b >= 0x80 => {}
        _ => return None,
    }
    while j < bytes.len() && is_ident_byte(bytes[j]) {
        j += 1;
    }
    (bytes.get(j) == Some(&b'$')).then_some(j + 1)
}

fn skip_dollar_quoted(sql: &str, open: usize, tag_end: usize) -> Result<usize, ScanError> {
    let tag = &sql[open..tag_end];
    sql[tag_end..]
        .find(tag)
        .map(|pos| tag_end + pos + tag.len())
        .ok_or(ScanError::Unterminated {
            kind: LiteralKind::DollarQuoted,
            offset: open,
        })
}
