//! Parse Events and Sinks
//!
//! Events are discrete notifications (element start/end, text, prefix
//! mappings) processed in one forward pass without building a tree. Any
//! stage that consumes them implements [`SaxSink`]; the tolerant
//! normalizer produces them, the import dispatcher and both generators
//! consume them, and adapters such as [`CollapsingSink`] sit in between.

use super::name::{Attributes, QName};
use crate::Result;

/// A parse event.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Start of a document.
    StartDocument,
    /// End of a document.
    EndDocument,
    /// Start of an element, with its attributes.
    StartElement { name: QName, attrs: Attributes },
    /// End of an element.
    EndElement { name: QName },
    /// Character data between tags, entities already decoded.
    Characters(String),
    /// A namespace prefix coming into scope. `prefix` of `None` is the
    /// default namespace.
    StartPrefixMapping {
        prefix: Option<String>,
        uri: String,
    },
    /// A namespace prefix leaving scope.
    EndPrefixMapping { prefix: Option<String> },
    /// Processing instruction: `<?target data?>`.
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
}

impl Event {
    /// Check if this is a start element event.
    #[inline]
    pub fn is_start_element(&self) -> bool {
        matches!(self, Event::StartElement { .. })
    }

    /// Check if this is an end element event.
    #[inline]
    pub fn is_end_element(&self) -> bool {
        matches!(self, Event::EndElement { .. })
    }

    /// Check if this is a characters event.
    #[inline]
    pub fn is_characters(&self) -> bool {
        matches!(self, Event::Characters(_))
    }

    /// The element name, if this is a start or end element event.
    pub fn element_name(&self) -> Option<&QName> {
        match self {
            Event::StartElement { name, .. } | Event::EndElement { name } => Some(name),
            _ => None,
        }
    }

    /// Deliver this event to a sink, calling the matching method.
    pub fn feed(&self, sink: &mut dyn SaxSink) -> Result<()> {
        match self {
            Event::StartDocument => sink.start_document(),
            Event::EndDocument => sink.end_document(),
            Event::StartElement { name, attrs } => sink.start_element(name, attrs),
            Event::EndElement { name } => sink.end_element(name),
            Event::Characters(text) => sink.characters(text),
            Event::StartPrefixMapping { prefix, uri } => {
                sink.start_prefix_mapping(prefix.as_deref(), uri)
            }
            Event::EndPrefixMapping { prefix } => sink.end_prefix_mapping(prefix.as_deref()),
            Event::ProcessingInstruction { target, data } => {
                sink.processing_instruction(target, data.as_deref())
            }
        }
    }
}

/// An event consumer.
///
/// All methods default to accepting no-ops, so implementors only handle
/// the events they care about. Methods are fallible: the import
/// dispatcher uses the error channel to abort a run on validation
/// failures, while generators never fail.
pub trait SaxSink {
    fn start_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_prefix_mapping(&mut self, _prefix: Option<&str>, _uri: &str) -> Result<()> {
        Ok(())
    }

    fn end_prefix_mapping(&mut self, _prefix: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn start_element(&mut self, _name: &QName, _attrs: &Attributes) -> Result<()> {
        Ok(())
    }

    fn end_element(&mut self, _name: &QName) -> Result<()> {
        Ok(())
    }

    fn characters(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }

    /// Whitespace a source reported as ignorable. Generators write it
    /// through unescaped; everything else treats it like characters.
    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        self.characters(text)
    }

    fn processing_instruction(&mut self, _target: &str, _data: Option<&str>) -> Result<()> {
        Ok(())
    }
}

impl<S: SaxSink + ?Sized> SaxSink for &mut S {
    fn start_document(&mut self) -> Result<()> {
        (**self).start_document()
    }

    fn end_document(&mut self) -> Result<()> {
        (**self).end_document()
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        (**self).start_prefix_mapping(prefix, uri)
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) -> Result<()> {
        (**self).end_prefix_mapping(prefix)
    }

    fn start_element(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        (**self).start_element(name, attrs)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        (**self).end_element(name)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        (**self).characters(text)
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        (**self).ignorable_whitespace(text)
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()> {
        (**self).processing_instruction(target, data)
    }
}

/// Adapter that merges adjacent character events into one.
///
/// Tokenizers are free to report text in fragments (entity boundaries,
/// buffer edges). Handlers that build values out of text are much easier
/// to write when each text node arrives as a single event, so the subset
/// pipeline routes everything through this adapter.
pub struct CollapsingSink<S> {
    inner: S,
    buffer: String,
}

impl<S: SaxSink> CollapsingSink<S> {
    pub fn new(inner: S) -> Self {
        CollapsingSink {
            inner,
            buffer: String::new(),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.buffer);
        self.inner.characters(&text)
    }

    /// Flush any buffered text and hand back the wrapped sink.
    pub fn finish(mut self) -> Result<S> {
        self.flush()?;
        Ok(self.inner)
    }
}

impl<S: SaxSink> SaxSink for CollapsingSink<S> {
    fn start_document(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.start_document()
    }

    fn end_document(&mut self) -> Result<()> {
        self.flush()?;
        self.inner.end_document()
    }

    fn start_prefix_mapping(&mut self, prefix: Option<&str>, uri: &str) -> Result<()> {
        self.flush()?;
        self.inner.start_prefix_mapping(prefix, uri)
    }

    fn end_prefix_mapping(&mut self, prefix: Option<&str>) -> Result<()> {
        self.flush()?;
        self.inner.end_prefix_mapping(prefix)
    }

    fn start_element(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        self.flush()?;
        self.inner.start_element(name, attrs)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.flush()?;
        self.inner.end_element(name)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.buffer.push_str(text);
        Ok(())
    }

    fn ignorable_whitespace(&mut self, text: &str) -> Result<()> {
        self.buffer.push_str(text);
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: Option<&str>) -> Result<()> {
        self.flush()?;
        self.inner.processing_instruction(target, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl SaxSink for Recorder {
        fn start_element(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
            self.events.push(Event::StartElement {
                name: name.clone(),
                attrs: attrs.clone(),
            });
            Ok(())
        }

        fn end_element(&mut self, name: &QName) -> Result<()> {
            self.events.push(Event::EndElement { name: name.clone() });
            Ok(())
        }

        fn characters(&mut self, text: &str) -> Result<()> {
            self.events.push(Event::Characters(text.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_feed_dispatches() {
        let mut recorder = Recorder::default();
        let event = Event::StartElement {
            name: QName::new("p"),
            attrs: Attributes::new(),
        };
        event.feed(&mut recorder).unwrap();
        assert_eq!(recorder.events.len(), 1);
        assert!(recorder.events[0].is_start_element());
    }

    #[test]
    fn test_collapsing_merges_adjacent_text() {
        let mut collapsing = CollapsingSink::new(Recorder::default());
        let name = QName::new("p");
        collapsing.start_element(&name, &Attributes::new()).unwrap();
        collapsing.characters("Hello, ").unwrap();
        collapsing.characters("World").unwrap();
        collapsing.characters("!").unwrap();
        collapsing.end_element(&name).unwrap();
        let recorder = collapsing.finish().unwrap();

        assert_eq!(recorder.events.len(), 3);
        assert_eq!(
            recorder.events[1],
            Event::Characters("Hello, World!".to_string())
        );
    }

    #[test]
    fn test_collapsing_empty_text_not_emitted() {
        let mut collapsing = CollapsingSink::new(Recorder::default());
        let name = QName::new("p");
        collapsing.start_element(&name, &Attributes::new()).unwrap();
        collapsing.end_element(&name).unwrap();
        let recorder = collapsing.finish().unwrap();
        assert_eq!(recorder.events.len(), 2);
    }
}
