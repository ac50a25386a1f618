//! Markup text generation
//!
//! Renders an event stream into markup text. Start tags are buffered so
//! an element with no content collapses to one self-closed tag; a child
//! start, non-empty text or a processing instruction forces the pending
//! tag open. Namespace declarations arrive as prefix-mapping events and
//! are written as `xmlns` attributes on the next start tag; an
//! attribute carrying a namespace URI with no known prefix gets a
//! synthesized one, declared inline.
//!
//! The stable variant sorts attributes by qualified name so logically
//! identical content renders byte-for-byte identically.

use crate::core::entities::{escape_text, write_attribute};
use crate::core::events::SaxSink;
use crate::core::name::{Attributes, QName};
use crate::Result;
use std::collections::HashMap;

/// Event-stream to text renderer.
pub struct XmlGenerator {
    out: String,
    /// Saved uri -> prefix contexts, one per open prefix mapping.
    contexts: Vec<HashMap<String, Option<String>>>,
    /// Active uri -> prefix mapping; `None` marks the default namespace.
    current: HashMap<String, Option<String>>,
    /// Declarations awaiting the next start tag.
    undeclared: Vec<(Option<String>, String)>,
    generated: u32,
    /// Buffered start tag, still eligible for self-closing.
    pending: Option<(QName, Attributes)>,
    sort_attrs: bool,
}

impl XmlGenerator {
    /// A generator preserving attribute production order.
    pub fn new() -> Self {
        XmlGenerator {
            out: String::new(),
            contexts: Vec::new(),
            current: HashMap::new(),
            undeclared: Vec::new(),
            generated: 0,
            pending: None,
            sort_attrs: false,
        }
    }

    /// A generator sorting attributes by name for reproducible output.
    pub fn stable() -> Self {
        XmlGenerator {
            sort_attrs: true,
            ..XmlGenerator::new()
        }
    }

    /// The text rendered so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Finish and return the rendered text. A still-buffered start tag
    /// is written open rather than dropped.
    pub fn into_string(mut self) -> String {
        self.process_pending();
        self.out
    }

    fn process_pending(&mut self) {
        if let Some((name, attrs)) = self.pending.take() {
            self.write_start_tag(&name, &attrs, false);
        }
    }

    fn fresh_prefix(&mut self) -> String {
        let prefix = format!("ns{}", self.generated);
        self.generated += 1;
        prefix
    }

    /// Resolve an element name against the active context, synthesizing
    /// a prefix (and queueing its declaration) for an unmapped URI.
    fn element_tag(&mut self, name: &QName) -> String {
        match name.uri() {
            None => name.local_name().to_string(),
            Some(uri) => match self.current.get(uri) {
                Some(None) => name.local_name().to_string(),
                Some(Some(prefix)) => format!("{}:{}", prefix, name.local_name()),
                None => {
                    let prefix = self.fresh_prefix();
                    self.current.insert(uri.to_string(), Some(prefix.clone()));
                    self.undeclared.push((Some(prefix.clone()), uri.to_string()));
                    format!("{}:{}", prefix, name.local_name())
                }
            },
        }
    }

    /// Resolve an attribute name. Attributes cannot live in the default
    /// namespace, so a URI mapped only to the default prefix, or not
    /// mapped at all, gets a synthesized prefix declared inline.
    fn attribute_name(&mut self, name: &QName) -> String {
        let uri = match name.uri() {
            None => return name.local_name().to_string(),
            Some(uri) => uri,
        };
        if let Some(Some(prefix)) = self.current.get(uri) {
            return format!("{}:{}", prefix, name.local_name());
        }
        let prefix = self.fresh_prefix();
        self.current.insert(uri.to_string(), Some(prefix.clone()));
        self.out.push_str(" xmlns:");
        self.out.push_str(&prefix);
        self.out.push('=');
        write_attribute(&mut self.out, uri);
        format!("{}:{}", prefix, name.local_name())
    }

    fn write_start_tag(&mut self, name: &QName, attrs: &Attributes, close: bool) {
        let tag = self.element_tag(name);
        self.out.push('<');
        self.out.push_str(&tag);

        for (prefix, uri) in std::mem::take(&mut self.undeclared) {
            match prefix {
                None => self.out.push_str(" xmlns="),
                Some(prefix) => {
                    self.out.push_str(" xmlns:");
                    self.out.push_str(&prefix);
                    self.out.push('=');
                }
            }
            write_attribute(&mut self.out, &uri);
        }

        let entries: Vec<(&QName, &str)> = if self.sort_attrs {
            attrs.sorted()
        } else {
            attrs.iter().collect()
        };
        for (attr, value) in entries {
            let rendered = self.attribute_name(attr);
            self.out.push(' ');
            self.out.push_str(&rendered);
            self.out.push('=');
            write_attribute(&mut self.out, value);
        }

        self.out.push_str(if close { "/>" } else { ">" });
    }

    fn write_end_tag(&mut self, name: &QName) {
        let tag = self.element_tag(name);
        self.out.push_str("</");
        self.out.push_str(&tag);
        self.out.push('>');
    }
}

impl Default for XmlGenerator {
    fn default() -> Self {
        XmlGenerator::new()
    }
}

impl SaxSink for XmlGenerator {
    fn start_document(&mut self) -> Result<()> {
        self.out
            .push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        self.contexts.push(self.current.clone());
        self.current
            .insert(uri.to_string(), prefix.map(str::to_string));
        self.undeclared
            .push((prefix.map(str::to_string), uri.to_string()));
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: Option<&str>) -> Result<()> {
        if let Some(previous) = self.contexts.pop() {
            self.current = previous;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        self.process_pending();
        self.pending = Some((name.clone(), attrs.clone()));
        Ok(())
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        if let Some((pending_name, attrs)) = self.pending.take() {
            self.write_start_tag(&pending_name, &attrs, true);
            return Ok(());
        }
        self.write_end_tag(name);
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        if !text.is_empty() {
            self.process_pending();
            self.out.push_str(&escape_text(text));
        }
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        if !text.is_empty() {
            self.process_pending();
            self.out.push_str(text);
        }
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()> {
        self.process_pending();
        self.out.push_str("<?");
        self.out.push_str(target);
        if let Some(data) = data {
            self.out.push(' ');
            self.out.push_str(data);
        }
        self.out.push_str("?>");
        Ok(())
    }
}
