//! JSON string escaping for frame payloads.
//!
//! Output is pure ASCII: quotes, backslash and `/` are backslash-escaped,
//! control characters use their short form where JSON has one, and every
//! other code point below `0x20` or above `0x7F` becomes `\uXXXX` (UTF-16
//! code units, surrogate pairs for astral characters). Browsers that mangle
//! non-ASCII bytes in streaming responses therefore see the same text.

use std::fmt::Write as _;

use crate::errors::EscapeError;

/// Escape `input` for embedding between double quotes.
pub fn escape_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    escape_json_into(&mut out, input);
    out
}

/// Escape `input` and append it to `out`.
pub fn escape_json_into(out: &mut String, input: &str) {
    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '/' => out.push_str("\\/"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c < '\u{20}' || c > '\u{7F}' => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            }
            c => out.push(c),
        }
    }
}

/// Escape `input` and wrap it in double quotes.
pub fn quote_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 10);
    out.push('"');
    escape_json_into(&mut out, input);
    out.push('"');
    out
}

/// Undo [`escape_json`]. Accepts every escape JSON allows.
pub fn unescape_json(input: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            return Err(EscapeError::DanglingBackslash);
        };
        match esc {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let unit = read_hex4(&mut chars)?;
                out.push(decode_unit(unit, &mut chars)?);
            }
            other => return Err(EscapeError::InvalidEscape(other)),
        }
    }
    Ok(out)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Result<u32, EscapeError> {
    let mut value = 0u32;
    for _ in 0..4 {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or(EscapeError::TruncatedUnicode)?;
        value = (value << 4) | digit;
    }
    Ok(value)
}

fn decode_unit(unit: u32, chars: &mut std::str::Chars<'_>) -> Result<char, EscapeError> {
    match unit {
        0xD800..=0xDBFF => {
            // High surrogate: the low half must follow as another \u escape.
            if chars.next() != Some('\\') || chars.next() != Some('u') {
                return Err(EscapeError::UnpairedSurrogate(unit));
            }
            let low = read_hex4(chars)?;
            if !(0xDC00..=0xDFFF).contains(&low) {
                return Err(EscapeError::UnpairedSurrogate(unit));
            }
            let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
            char::from_u32(code).ok_or(EscapeError::UnpairedSurrogate(unit))
        }
        0xDC00..=0xDFFF => Err(EscapeError::UnpairedSurrogate(unit)),
        _ => char::from_u32(unit).ok_or(EscapeError::UnpairedSurrogate(unit)),
    }
}
