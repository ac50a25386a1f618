//! Entity Decoding and Text Escaping
//!
//! Handles character references in chaotic input:
//! - Built-in entities: &lt; &gt; &amp; &quot; &apos;
//! - A fixed table of common HTML named entities
//! - Numeric character references: &#233; &#xE9;
//!
//! Uses Cow for zero-copy when no references are present. What happens
//! to an unrecognized named reference is an explicit policy choice, not
//! an accident: see [`EntityPolicy`].

use memchr::{memchr, memchr3};
use std::borrow::Cow;

/// What to do with a reference that parses as `&name;` but names no
/// known entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EntityPolicy {
    /// Drop the whole reference from the output.
    #[default]
    Drop,
    /// Keep the reference text literally.
    Keep,
}

/// A scanned character reference.
#[derive(Debug, PartialEq)]
pub(crate) enum Reference<'a> {
    /// `&#…;`; `None` when the number is not a valid scalar value.
    Numeric(Option<char>),
    /// `&name;`.
    Named(&'a str),
}

/// Try to read a character reference at the start of `input` (which must
/// begin with `&`). Returns the byte length of the whole reference
/// including the terminating `;`.
pub(crate) fn scan_reference(input: &str) -> Option<(usize, Reference<'_>)> {
    let bytes = input.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&b'&'));

    if bytes.get(1) == Some(&b'#') {
        let (digits_at, radix) = match bytes.get(2) {
            Some(&b'x') | Some(&b'X') => (3, 16),
            _ => (2, 10),
        };
        let mut end = digits_at;
        while end < bytes.len() && (bytes[end] as char).is_digit(radix) {
            end += 1;
        }
        if end == digits_at || bytes.get(end) != Some(&b';') {
            return None;
        }
        let codepoint = u32::from_str_radix(&input[digits_at..end], radix).ok();
        let decoded = codepoint.and_then(char::from_u32);
        return Some((end + 1, Reference::Numeric(decoded)));
    }

    let mut end = 1;
    while end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
        end += 1;
    }
    if end == 1 || bytes.get(end) != Some(&b';') || !bytes[1].is_ascii_alphabetic() {
        return None;
    }
    Some((end + 1, Reference::Named(&input[1..end])))
}

/// Decode character references in text content.
///
/// Returns Borrowed when no references are present (zero-copy). A bare
/// `&` that opens no reference stays literal; unknown named references
/// follow `policy`.
pub fn decode_text(input: &str, policy: EntityPolicy) -> Cow<'_, str> {
    // Fast path: no ampersand, nothing to decode
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut result = String::with_capacity(input.len());
    let mut pos = 0;

    while pos < input.len() {
        match memchr(b'&', &bytes[pos..]) {
            None => {
                result.push_str(&input[pos..]);
                break;
            }
            Some(offset) => {
                result.push_str(&input[pos..pos + offset]);
                pos += offset;
                match scan_reference(&input[pos..]) {
                    Some((len, reference)) => {
                        let decoded = match reference {
                            Reference::Numeric(decoded) => decoded,
                            Reference::Named(name) => named_entity(name),
                        };
                        match decoded {
                            Some(ch) => result.push(ch),
                            None => {
                                if policy == EntityPolicy::Keep {
                                    result.push_str(&input[pos..pos + len]);
                                }
                            }
                        }
                        pos += len;
                    }
                    None => {
                        // Not a reference shape, the ampersand is literal
                        result.push('&');
                        pos += 1;
                    }
                }
            }
        }
    }

    Cow::Owned(result)
}

/// The five entity names every markup dialect knows.
#[inline]
pub fn is_core_entity(name: &str) -> bool {
    matches!(name, "lt" | "gt" | "amp" | "quot" | "apos")
}

/// Look up a named entity in the fixed table.
pub fn named_entity(name: &str) -> Option<char> {
    let decoded = match name {
        "lt" => '<',
        "gt" => '>',
        "amp" => '&',
        "quot" => '"',
        "apos" => '\'',
        // Latin-1 punctuation and symbols
        "nbsp" => '\u{00A0}',
        "iexcl" => '\u{00A1}',
        "cent" => '\u{00A2}',
        "pound" => '\u{00A3}',
        "curren" => '\u{00A4}',
        "yen" => '\u{00A5}',
        "sect" => '\u{00A7}',
        "copy" => '\u{00A9}',
        "laquo" => '\u{00AB}',
        "reg" => '\u{00AE}',
        "deg" => '\u{00B0}',
        "plusmn" => '\u{00B1}',
        "micro" => '\u{00B5}',
        "para" => '\u{00B6}',
        "middot" => '\u{00B7}',
        "raquo" => '\u{00BB}',
        "frac12" => '\u{00BD}',
        "iquest" => '\u{00BF}',
        "times" => '\u{00D7}',
        "divide" => '\u{00F7}',
        // Latin-1 letters
        "agrave" => '\u{00E0}',
        "aacute" => '\u{00E1}',
        "acirc" => '\u{00E2}',
        "atilde" => '\u{00E3}',
        "auml" => '\u{00E4}',
        "aring" => '\u{00E5}',
        "aelig" => '\u{00E6}',
        "ccedil" => '\u{00E7}',
        "egrave" => '\u{00E8}',
        "eacute" => '\u{00E9}',
        "ecirc" => '\u{00EA}',
        "euml" => '\u{00EB}',
        "igrave" => '\u{00EC}',
        "iacute" => '\u{00ED}',
        "icirc" => '\u{00EE}',
        "iuml" => '\u{00EF}',
        "ntilde" => '\u{00F1}',
        "ograve" => '\u{00F2}',
        "oacute" => '\u{00F3}',
        "ocirc" => '\u{00F4}',
        "otilde" => '\u{00F5}',
        "ouml" => '\u{00F6}',
        "oslash" => '\u{00F8}',
        "ugrave" => '\u{00F9}',
        "uacute" => '\u{00FA}',
        "ucirc" => '\u{00FB}',
        "uuml" => '\u{00FC}',
        "szlig" => '\u{00DF}',
        // Greek letters
        "alpha" => '\u{03B1}',
        "beta" => '\u{03B2}',
        "gamma" => '\u{03B3}',
        "delta" => '\u{03B4}',
        "epsilon" => '\u{03B5}',
        "lambda" => '\u{03BB}',
        "pi" => '\u{03C0}',
        "sigma" => '\u{03C3}',
        "omega" => '\u{03C9}',
        // General punctuation
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "bull" => '\u{2022}',
        "hellip" => '\u{2026}',
        "euro" => '\u{20AC}',
        "trade" => '\u{2122}',
        _ => return None,
    };
    Some(decoded)
}

/// Escape `&`, `<` and `>` in text content.
pub fn escape_text(input: &str) -> Cow<'_, str> {
    // Fast path: nothing to escape
    if memchr3(b'&', b'<', b'>', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len() + 16);
    for ch in input.chars() {
        match ch {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            _ => result.push(ch),
        }
    }
    Cow::Owned(result)
}

/// Write an attribute value with minimal-escaping quoting.
///
/// The quote character that occurs less often inside the value wins;
/// only that character is entity-escaped, besides the usual `&`, `<`,
/// `>`.
pub fn write_attribute(out: &mut String, value: &str) {
    let doubles = value.bytes().filter(|&b| b == b'"').count();
    let (quote, escaped_quote) = if doubles > 0 {
        let singles = value.bytes().filter(|&b| b == b'\'').count();
        if doubles <= singles {
            ('"', Some(('"', "&quot;")))
        } else {
            ('\'', Some(('\'', "&apos;")))
        }
    } else {
        ('"', None)
    };

    out.push(quote);
    for ch in value.chars() {
        match (ch, escaped_quote) {
            ('&', _) => out.push_str("&amp;"),
            ('<', _) => out.push_str("&lt;"),
            ('>', _) => out.push_str("&gt;"),
            (c, Some((q, replacement))) if c == q => out.push_str(replacement),
            (c, _) => out.push(c),
        }
    }
    out.push(quote);
}
