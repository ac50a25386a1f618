//! Tolerant markup tokenizer
//!
//! Turns arbitrary, possibly malformed markup into a well-formed event
//! stream. It is expected that the input author made mistakes: tags that
//! never close, close tags that never opened, interleaved nesting,
//! half-finished tags. The tokenizer does its best and guarantees the
//! output is balanced regardless:
//!
//! - an end tag closes every still-open descendant down to its match
//! - an end tag with no match is discarded
//! - tags still open at end of input are closed, top to bottom
//!
//! The stream is a finite, non-restartable iterator of [`Event`]s;
//! [`saxify`] pumps it into any sink.

mod scanner;

pub use scanner::Position;

use crate::core::entities::{decode_text, EntityPolicy};
use crate::core::events::{Event, SaxSink};
use crate::core::name::{split_prefix, Attributes, QName};
use crate::Result;
use log::debug;
use scanner::{is_name_char, is_name_start_char, Scanner};
use std::collections::VecDeque;

/// Tag names that never take content: start events are immediately
/// followed by end events and nothing is pushed on the open stack.
const EMPTY_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// An element still waiting for its end tag.
struct OpenTag {
    /// The name as written, used for end-tag matching.
    raw: String,
    /// The resolved name, used for events.
    name: QName,
    /// Prefixes this element declared, in declaration order.
    declared: Vec<Option<String>>,
}

/// Stack of in-scope namespace declarations.
#[derive(Default)]
struct PrefixStack {
    bindings: Vec<(Option<String>, String)>,
}

impl PrefixStack {
    fn declare(&mut self, prefix: Option<String>, uri: String) {
        self.bindings.push((prefix, uri));
    }

    fn undeclare(&mut self, prefix: Option<&str>) {
        if let Some(idx) = self
            .bindings
            .iter()
            .rposition(|(p, _)| p.as_deref() == prefix)
        {
            self.bindings.remove(idx);
        }
    }

    fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }
}

/// Tolerant tokenizer producing a well-formed event sequence.
pub struct TagNormalizer<'a> {
    scanner: Scanner<'a>,
    stack: Vec<OpenTag>,
    prefixes: PrefixStack,
    queue: VecDeque<Event>,
    empty_tags: Vec<String>,
    policy: EntityPolicy,
    token_position: Position,
    drained: bool,
}

impl<'a> TagNormalizer<'a> {
    pub fn new(text: &'a str) -> Self {
        TagNormalizer {
            scanner: Scanner::new(text),
            stack: Vec::new(),
            prefixes: PrefixStack::default(),
            queue: VecDeque::new(),
            empty_tags: EMPTY_TAGS.iter().map(|t| t.to_string()).collect(),
            policy: EntityPolicy::default(),
            token_position: Position::start(),
            drained: false,
        }
    }

    /// Choose what happens to unrecognized named entity references.
    pub fn with_entity_policy(mut self, policy: EntityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the set of always-empty tag names.
    pub fn with_empty_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.empty_tags = tags
            .into_iter()
            .map(|t| {
                let t: String = t.into();
                t.to_ascii_lowercase()
            })
            .collect();
        self
    }

    /// Source position of the most recently yielded token.
    pub fn position(&self) -> Position {
        self.token_position
    }

    fn is_empty_tag(&self, raw: &str) -> bool {
        self.empty_tags.iter().any(|t| t.eq_ignore_ascii_case(raw))
    }

    /// Resolve a raw element name against in-scope prefixes. The default
    /// namespace applies to unprefixed element names; an unknown prefix
    /// degrades to a no-namespace name keeping the raw spelling.
    fn resolve_element(&self, raw: &str) -> QName {
        match split_prefix(raw) {
            (Some(prefix), local) => match self.prefixes.resolve(Some(prefix)) {
                Some(uri) => QName::in_ns(uri, local),
                None => QName::new(raw),
            },
            (None, local) => match self.prefixes.resolve(None) {
                Some(uri) => QName::in_ns(uri, local),
                None => QName::new(local),
            },
        }
    }

    /// Resolve a raw attribute name. Unprefixed attributes are never in
    /// the default namespace.
    fn resolve_attribute(&self, raw: &str) -> QName {
        match split_prefix(raw) {
            (Some(prefix), local) => match self.prefixes.resolve(Some(prefix)) {
                Some(uri) => QName::in_ns(uri, local),
                None => QName::new(raw),
            },
            (None, local) => QName::new(local),
        }
    }

    fn handle_start_tag(&mut self, tag: ParsedTag<'_>) {
        // Namespace declarations come into scope before the element
        // name is resolved
        let mut declared = Vec::new();
        for (attr_name, raw_value) in &tag.attrs {
            let prefix = if *attr_name == "xmlns" {
                None
            } else if let Some(p) = attr_name.strip_prefix("xmlns:") {
                if p.is_empty() {
                    continue;
                }
                Some(p.to_string())
            } else {
                continue;
            };
            let uri = decode_text(raw_value, self.policy).into_owned();
            self.prefixes.declare(prefix.clone(), uri.clone());
            declared.push(prefix.clone());
            self.queue.push_back(Event::StartPrefixMapping { prefix, uri });
        }

        let name = self.resolve_element(tag.name);
        let mut attrs = Attributes::new();
        for (attr_name, raw_value) in &tag.attrs {
            if *attr_name == "xmlns" || attr_name.starts_with("xmlns:") {
                continue;
            }
            let value = decode_text(raw_value, self.policy).into_owned();
            attrs.set_qname(self.resolve_attribute(attr_name), value);
        }

        self.queue.push_back(Event::StartElement {
            name: name.clone(),
            attrs,
        });

        if tag.self_closing || self.is_empty_tag(tag.name) {
            self.emit_close(OpenTag {
                raw: tag.name.to_string(),
                name,
                declared,
            });
        } else {
            self.stack.push(OpenTag {
                raw: tag.name.to_string(),
                name,
                declared,
            });
        }
    }

    fn handle_end_tag(&mut self, raw: &str) {
        match self
            .stack
            .iter()
            .rposition(|tag| tag.raw.eq_ignore_ascii_case(raw))
        {
            Some(matched) => {
                // Close everything above the match, then the match itself
                while self.stack.len() > matched {
                    if let Some(tag) = self.stack.pop() {
                        self.emit_close(tag);
                    }
                }
            }
            None => {
                // Stray end tag: leave the stack alone
                debug!("discarding stray end tag </{}>", raw);
            }
        }
    }

    fn emit_close(&mut self, tag: OpenTag) {
        self.queue.push_back(Event::EndElement { name: tag.name });
        for prefix in tag.declared.into_iter().rev() {
            self.prefixes.undeclare(prefix.as_deref());
            self.queue.push_back(Event::EndPrefixMapping { prefix });
        }
    }

    fn close_remaining(&mut self) {
        if !self.stack.is_empty() {
            debug!("auto-closing {} unclosed element(s)", self.stack.len());
        }
        while let Some(tag) = self.stack.pop() {
            self.emit_close(tag);
        }
    }

    /// Emit the text run from the current position up to the next `<`.
    fn scan_text(&mut self) {
        let start = self.scanner.offset();
        let end = self
            .scanner
            .find_byte(b'<')
            .unwrap_or(start + self.scanner.rest().len());
        let raw = self.scanner.slice(start, end);
        self.scanner.goto(end);
        let decoded = decode_text(raw, self.policy);
        if !decoded.is_empty() {
            self.queue.push_back(Event::Characters(decoded.into_owned()));
        }
    }

    /// The byte at the cursor is `<`. Classify and consume the markup
    /// construct, or fall back to treating the `<` as literal text.
    fn scan_markup(&mut self) {
        let rest = self.scanner.rest();
        match self.scanner.peek_at(1) {
            Some(b'/') => {
                if let Some((name, len)) = parse_end_tag(rest) {
                    let name = name.to_string();
                    self.scanner.bump(len);
                    self.handle_end_tag(&name);
                } else {
                    self.literal_angle();
                }
            }
            Some(b'!') => {
                if rest.starts_with("<!--") {
                    // Comment, skipped entirely
                    match self.scanner.find_str("-->") {
                        Some(end) => self.scanner.goto(end + 3),
                        None => self.scanner.bump(rest.len()),
                    }
                } else {
                    // Declaration, skipped
                    match self.scanner.find_byte(b'>') {
                        Some(end) => self.scanner.goto(end + 1),
                        None => self.scanner.bump(rest.len()),
                    }
                }
            }
            Some(b'?') => {
                // Processing instruction, skipped
                match self.scanner.find_str("?>") {
                    Some(end) => self.scanner.goto(end + 2),
                    None => match self.scanner.find_byte(b'>') {
                        Some(end) => self.scanner.goto(end + 1),
                        None => self.scanner.bump(rest.len()),
                    },
                }
            }
            Some(b) if is_name_start_char(b) => match parse_start_tag(rest) {
                Some(tag) => {
                    let len = tag.len;
                    self.handle_start_tag(tag);
                    self.scanner.bump(len);
                }
                None => self.literal_angle(),
            },
            _ => self.literal_angle(),
        }
    }

    /// A `<` that opens nothing is ordinary text.
    fn literal_angle(&mut self) {
        self.queue.push_back(Event::Characters("<".to_string()));
        self.scanner.bump(1);
    }
}

impl Iterator for TagNormalizer<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            if self.scanner.is_eof() {
                if self.drained {
                    return None;
                }
                self.drained = true;
                self.close_remaining();
                continue;
            }
            self.token_position = self.scanner.position();
            if self.scanner.peek() == Some(b'<') {
                self.scan_markup();
            } else {
                self.scan_text();
            }
        }
    }
}

/// A successfully parsed start tag.
struct ParsedTag<'t> {
    name: &'t str,
    /// Raw attribute name/value pairs; values still carry entity
    /// references.
    attrs: Vec<(&'t str, &'t str)>,
    self_closing: bool,
    /// Bytes consumed, including the angle brackets.
    len: usize,
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while matches!(bytes.get(pos), Some(&(b' ' | b'\t' | b'\n' | b'\r'))) {
        pos += 1;
    }
    pos
}

fn scan_name(bytes: &[u8], start: usize) -> Option<usize> {
    if !is_name_start_char(*bytes.get(start)?) {
        return None;
    }
    let mut pos = start + 1;
    while matches!(bytes.get(pos), Some(&b) if is_name_char(b)) {
        pos += 1;
    }
    Some(pos)
}

/// Try to parse a complete start tag at the beginning of `rest` (which
/// starts with `<`). Tolerates unquoted and bare attributes; gives up on
/// a nested `<`, an unterminated quote or end of input, in which case
/// the caller treats the `<` as text.
fn parse_start_tag(rest: &str) -> Option<ParsedTag<'_>> {
    let bytes = rest.as_bytes();
    let name_end = scan_name(bytes, 1)?;
    let name = &rest[1..name_end];
    let mut attrs: Vec<(&str, &str)> = Vec::new();
    let mut pos = name_end;

    loop {
        pos = skip_ws(bytes, pos);
        match *bytes.get(pos)? {
            b'>' => {
                return Some(ParsedTag {
                    name,
                    attrs,
                    self_closing: false,
                    len: pos + 1,
                });
            }
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'>') {
                    return Some(ParsedTag {
                        name,
                        attrs,
                        self_closing: true,
                        len: pos + 2,
                    });
                }
                // Stray slash inside the tag
                pos += 1;
            }
            b'<' => return None,
            b if is_name_start_char(b) => {
                let attr_end = scan_name(bytes, pos)?;
                let attr_name = &rest[pos..attr_end];
                pos = skip_ws(bytes, attr_end);
                if bytes.get(pos) == Some(&b'=') {
                    pos = skip_ws(bytes, pos + 1);
                    match *bytes.get(pos)? {
                        quote @ (b'"' | b'\'') => {
                            let value_start = pos + 1;
                            let value_end =
                                memchr::memchr(quote, &bytes[value_start..])? + value_start;
                            attrs.push((attr_name, &rest[value_start..value_end]));
                            pos = value_end + 1;
                        }
                        b'<' => return None,
                        _ => {
                            // Unquoted value, ends at whitespace or tag end
                            let value_start = pos;
                            while matches!(bytes.get(pos), Some(&b)
                                if !matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'<'))
                            {
                                // A '/' only terminates the value as part of '/>'
                                if bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'>') {
                                    break;
                                }
                                pos += 1;
                            }
                            attrs.push((attr_name, &rest[value_start..pos]));
                        }
                    }
                } else {
                    // Bare attribute, no value
                    attrs.push((attr_name, ""));
                }
            }
            _ => {
                // Junk byte inside the tag, skip it
                pos += 1;
            }
        }
    }
}

/// Try to parse an end tag at the beginning of `rest` (which starts with
/// `</`). Returns the raw name and the bytes consumed.
fn parse_end_tag(rest: &str) -> Option<(&str, usize)> {
    let bytes = rest.as_bytes();
    let name_end = scan_name(bytes, 2)?;
    let name = &rest[2..name_end];
    let mut pos = skip_ws(bytes, name_end);
    loop {
        match *bytes.get(pos)? {
            b'>' => return Some((name, pos + 1)),
            b'<' => return None,
            _ => pos += 1,
        }
    }
}

/// Pump the full normalized event stream for `text` into a sink.
pub fn saxify(text: &str, sink: &mut dyn SaxSink) -> Result<()> {
    for event in TagNormalizer::new(text) {
        event.feed(sink)?;
    }
    Ok(())
}
