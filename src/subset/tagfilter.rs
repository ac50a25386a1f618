//! Text-level tag filtering
//!
//! The first line of defense for user-supplied markup: anything shaped
//! like a tag that is not on the allow-list (unknown element, unknown
//! attribute, half-finished bracket) is HTML-escaped before parsing
//! begins, so it can never reach the dispatcher as structure. Entity
//! references are policed the same way: numeric and recognized named
//! references survive, everything else has its ampersand escaped.

use crate::core::entities::{escape_text, is_core_entity, named_entity, scan_reference, Reference};
use memchr::memchr3;
use std::collections::{HashMap, HashSet};

/// Outcome of scanning a `<…>` candidate.
enum TagScan {
    /// A complete tag on the allow-list; copy `len` bytes verbatim.
    Allowed(usize),
    /// A complete tag that is not allowed; escape `len` bytes.
    Rejected(usize),
    /// Not a tag shape at all; only the `<` is escaped.
    NotATag,
}

/// Allow-list driven escaper for tag shapes in raw text.
#[derive(Default)]
pub struct TagFilter {
    /// Element name -> allowed attribute names, all lowercase.
    elements: HashMap<String, HashSet<String>>,
    html_entities: bool,
}

impl TagFilter {
    pub fn new() -> Self {
        TagFilter::default()
    }

    /// Also recognize the full named-entity table, not just the core
    /// five.
    pub fn with_html_entities(mut self) -> Self {
        self.html_entities = true;
        self
    }

    /// Register an element and the attributes it may carry. A tag with
    /// any other attribute is escaped whole.
    pub fn register(&mut self, name: &str, attrs: &[&str]) {
        self.elements.insert(
            name.to_ascii_lowercase(),
            attrs.iter().map(|a| a.to_ascii_lowercase()).collect(),
        );
    }

    fn element_allows(&self, name: &str, attr_names: &[&str]) -> bool {
        match self.elements.get(&name.to_ascii_lowercase()) {
            Some(allowed) => attr_names
                .iter()
                .all(|attr| allowed.contains(&attr.to_ascii_lowercase())),
            None => false,
        }
    }

    fn reference_recognized(&self, reference: &Reference<'_>) -> bool {
        match reference {
            Reference::Numeric(decoded) => decoded.is_some(),
            Reference::Named(name) => {
                is_core_entity(name) || (self.html_entities && named_entity(name).is_some())
            }
        }
    }

    /// Escape everything in `text` that is not a recognized element or
    /// entity reference, quoting it literally.
    pub fn escape_non_elements(&self, text: &str) -> String {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;

        while pos < text.len() {
            match memchr3(b'<', b'>', b'&', &bytes[pos..]) {
                None => {
                    out.push_str(&text[pos..]);
                    break;
                }
                Some(offset) => {
                    out.push_str(&text[pos..pos + offset]);
                    pos += offset;
                    match bytes[pos] {
                        b'>' => {
                            out.push_str("&gt;");
                            pos += 1;
                        }
                        b'&' => match scan_reference(&text[pos..]) {
                            Some((len, reference)) if self.reference_recognized(&reference) => {
                                out.push_str(&text[pos..pos + len]);
                                pos += len;
                            }
                            _ => {
                                out.push_str("&amp;");
                                pos += 1;
                            }
                        },
                        _ => match self.scan_tag(&text[pos..]) {
                            TagScan::Allowed(len) => {
                                out.push_str(&text[pos..pos + len]);
                                pos += len;
                            }
                            TagScan::Rejected(len) => {
                                out.push_str(&escape_text(&text[pos..pos + len]));
                                pos += len;
                            }
                            TagScan::NotATag => {
                                out.push_str("&lt;");
                                pos += 1;
                            }
                        },
                    }
                }
            }
        }

        out
    }

    /// Scan a `<…>` candidate at the start of `rest`.
    fn scan_tag(&self, rest: &str) -> TagScan {
        let bytes = rest.as_bytes();

        // End tag: name, optional whitespace, '>'
        if bytes.get(1) == Some(&b'/') {
            let Some(name_end) = scan_name(bytes, 2) else {
                return TagScan::NotATag;
            };
            let mut pos = skip_ws(bytes, name_end);
            match bytes.get(pos) {
                Some(&b'>') => {
                    pos += 1;
                    if self.element_allows(&rest[2..name_end], &[]) {
                        TagScan::Allowed(pos)
                    } else {
                        TagScan::Rejected(pos)
                    }
                }
                _ => TagScan::NotATag,
            }
        } else {
            let Some(name_end) = scan_name(bytes, 1) else {
                return TagScan::NotATag;
            };
            let name = &rest[1..name_end];
            let mut attr_names: Vec<&str> = Vec::new();
            let mut pos = name_end;
            loop {
                pos = skip_ws(bytes, pos);
                match bytes.get(pos) {
                    None | Some(&b'<') => return TagScan::NotATag,
                    Some(&b'>') => {
                        pos += 1;
                        break;
                    }
                    Some(&b'/') if bytes.get(pos + 1) == Some(&b'>') => {
                        pos += 2;
                        break;
                    }
                    _ => {
                        let Some(attr_end) = scan_name(bytes, pos) else {
                            return TagScan::NotATag;
                        };
                        attr_names.push(&rest[pos..attr_end]);
                        pos = skip_ws(bytes, attr_end);
                        if bytes.get(pos) != Some(&b'=') {
                            // Bare attribute
                            continue;
                        }
                        pos = skip_ws(bytes, pos + 1);
                        match bytes.get(pos) {
                            Some(&quote) if quote == b'"' || quote == b'\'' => {
                                let value_start = pos + 1;
                                let Some(value_len) =
                                    memchr::memchr(quote, &bytes[value_start..])
                                else {
                                    return TagScan::NotATag;
                                };
                                pos = value_start + value_len + 1;
                            }
                            None | Some(&b'<') => return TagScan::NotATag,
                            _ => {
                                // Unquoted value
                                while matches!(bytes.get(pos), Some(&b)
                                    if !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'<'))
                                {
                                    if bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'>') {
                                        break;
                                    }
                                    pos += 1;
                                }
                            }
                        }
                    }
                }
            }
            if self.element_allows(name, &attr_names) {
                TagScan::Allowed(pos)
            } else {
                TagScan::Rejected(pos)
            }
        }
    }
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while matches!(bytes.get(pos), Some(&(b' ' | b'\t' | b'\n' | b'\r'))) {
        pos += 1;
    }
    pos
}

fn scan_name(bytes: &[u8], start: usize) -> Option<usize> {
    if !matches!(*bytes.get(start)?, b'A'..=b'Z' | b'a'..=b'z' | b'_') {
        return None;
    }
    let mut pos = start + 1;
    while matches!(
        bytes.get(pos),
        Some(&(b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' | b'-'))
    ) {
        pos += 1;
    }
    Some(pos)
}
