//! Export: object graphs out to event streams
//!
//! The mirror image of import. An exporter maps exact runtime types to
//! producers: plain functions that receive the typed object and a
//! [`ProducerScope`] bound to the output sink, the export settings and
//! an optional caller context. A producer emits element and text events
//! for its object and calls [`ProducerScope::subexport`] for nested
//! objects, so the event stream mirrors the object graph. Walking a
//! cyclic graph is the caller's lookout.
//!
//! An object whose exact type has no producer falls back to the one
//! optional fallback producer; with neither, the export fails naming
//! the concrete type.

use crate::core::events::SaxSink;
use crate::core::name::{Attributes, QName};
use crate::generator::XmlGenerator;
use crate::{Error, Result};
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// Object-side trait for exportable values.
///
/// Blanket-implemented for every `'static` type, it gives the registry
/// a `dyn`-compatible handle carrying the exact runtime type and its
/// name for error reporting. User types need no derives and no impls.
pub trait Exportable: Any {
    fn as_any(&self) -> &dyn Any;

    /// The concrete type's name, used in error messages.
    fn type_label(&self) -> &'static str;
}

impl<T: Any> Exportable for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn type_label(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type ProducerFn = Box<dyn Fn(&dyn Exportable, &mut ProducerScope<'_>) -> Result<()>>;

/// Settings for one export run.
#[derive(Clone, Copy, Debug)]
pub struct ExportSettings {
    /// Bracket the output with document events (the XML prolog).
    pub as_document: bool,
}

impl ExportSettings {
    /// Export as a full document with prolog.
    pub fn document() -> Self {
        ExportSettings { as_document: true }
    }

    /// Export as a bare fragment.
    pub fn fragment() -> Self {
        ExportSettings { as_document: false }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        ExportSettings::document()
    }
}

/// Type-keyed producer registry.
pub struct Exporter {
    producers: HashMap<TypeId, ProducerFn>,
    fallback: Option<ProducerFn>,
    default_ns: Option<String>,
    namespaces: Vec<(String, String)>,
}

impl Exporter {
    /// Create an exporter; elements produced through the unqualified
    /// helpers land in `default_ns`.
    pub fn new(default_ns: Option<&str>) -> Self {
        Exporter {
            producers: HashMap::new(),
            fallback: None,
            default_ns: default_ns.map(str::to_string),
            namespaces: Vec::new(),
        }
    }

    /// Register the producer for objects of exactly type `T`.
    pub fn register<T, F>(&mut self, produce: F)
    where
        T: Any,
        F: Fn(&T, &mut ProducerScope<'_>) -> Result<()> + 'static,
    {
        let wrapped: ProducerFn = Box::new(move |obj, scope| {
            let typed = obj
                .as_any()
                .downcast_ref::<T>()
                .ok_or(Error::ProducerTypeMismatch(std::any::type_name::<T>()))?;
            produce(typed, scope)
        });
        self.producers.insert(TypeId::of::<T>(), wrapped);
    }

    /// Register the producer used for every type that has none of its
    /// own. Consulted only when the exact-type lookup misses.
    pub fn register_fallback<F>(&mut self, produce: F)
    where
        F: Fn(&dyn Exportable, &mut ProducerScope<'_>) -> Result<()> + 'static,
    {
        self.fallback = Some(Box::new(produce));
    }

    /// Declare a prefix -> URI pair announced at the start of every
    /// export.
    pub fn register_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.push((prefix.to_string(), uri.to_string()));
    }

    /// The namespace unqualified element helpers produce into.
    pub fn default_namespace(&self) -> Option<&str> {
        self.default_ns.as_deref()
    }

    fn producer_for(&self, obj: &dyn Exportable) -> Result<&ProducerFn> {
        self.producers
            .get(&obj.as_any().type_id())
            .or(self.fallback.as_ref())
            .ok_or_else(|| Error::NoProducerForType(obj.type_label()))
    }

    /// Export onto an arbitrary sink.
    pub fn export_to_sax(
        &self,
        obj: &dyn Exportable,
        sink: &mut dyn SaxSink,
        settings: &ExportSettings,
        context: Option<&dyn Any>,
    ) -> Result<()> {
        if settings.as_document {
            sink.start_document()?;
        }
        if let Some(uri) = &self.default_ns {
            sink.start_prefix_mapping(None, uri)?;
        }
        for (prefix, uri) in &self.namespaces {
            sink.start_prefix_mapping(Some(prefix), uri)?;
        }
        let mut scope = ProducerScope {
            exporter: self,
            sink,
            settings,
            context,
        };
        scope.subexport(obj)?;
        if settings.as_document {
            sink.end_document()?;
        }
        Ok(())
    }

    /// Export to markup text, attributes in production order.
    pub fn export_to_string(
        &self,
        obj: &dyn Exportable,
        settings: &ExportSettings,
        context: Option<&dyn Any>,
    ) -> Result<String> {
        let mut generator = XmlGenerator::new();
        self.export_to_sax(obj, &mut generator, settings, context)?;
        Ok(generator.into_string())
    }

    /// Export to markup text with sorted attributes: byte-for-byte
    /// reproducible for logically identical content.
    pub fn export_to_stable_string(
        &self,
        obj: &dyn Exportable,
        settings: &ExportSettings,
        context: Option<&dyn Any>,
    ) -> Result<String> {
        let mut generator = XmlGenerator::stable();
        self.export_to_sax(obj, &mut generator, settings, context)?;
        Ok(generator.into_string())
    }
}

/// A producer's bond to one export run: the output sink, the settings
/// and the caller-supplied context, plus element helpers.
pub struct ProducerScope<'a> {
    exporter: &'a Exporter,
    sink: &'a mut dyn SaxSink,
    settings: &'a ExportSettings,
    context: Option<&'a dyn Any>,
}

impl ProducerScope<'_> {
    /// Start an element in the exporter's default namespace.
    pub fn start_element(&mut self, name: &str, attrs: Attributes) -> Result<()> {
        let qname = self.default_qname(name);
        self.sink.start_element(&qname, &attrs)
    }

    /// End an element in the exporter's default namespace.
    pub fn end_element(&mut self, name: &str) -> Result<()> {
        let qname = self.default_qname(name);
        self.sink.end_element(&qname)
    }

    /// Start an element in the given namespace.
    pub fn start_element_ns(
        &mut self,
        uri: Option<&str>,
        name: &str,
        attrs: Attributes,
    ) -> Result<()> {
        let qname = match uri {
            Some(uri) => QName::in_ns(uri, name),
            None => QName::new(name),
        };
        self.sink.start_element(&qname, &attrs)
    }

    /// End an element in the given namespace.
    pub fn end_element_ns(&mut self, uri: Option<&str>, name: &str) -> Result<()> {
        let qname = match uri {
            Some(uri) => QName::in_ns(uri, name),
            None => QName::new(name),
        };
        self.sink.end_element(&qname)
    }

    /// Emit character data.
    pub fn characters(&mut self, text: &str) -> Result<()> {
        self.sink.characters(text)
    }

    /// Resolve and run the producer for a nested object. The emitted
    /// events mirror the object graph's structure.
    pub fn subexport(&mut self, obj: &dyn Exportable) -> Result<()> {
        let exporter = self.exporter;
        let produce = exporter.producer_for(obj)?;
        produce(obj, self)
    }

    pub fn settings(&self) -> &ExportSettings {
        self.settings
    }

    /// The caller-supplied context object, if any.
    pub fn context(&self) -> Option<&dyn Any> {
        self.context
    }

    /// Raw access to the sink, for events the helpers do not cover.
    pub fn sink(&mut self) -> &mut dyn SaxSink {
        &mut *self.sink
    }

    fn default_qname(&self, name: &str) -> QName {
        match &self.exporter.default_ns {
            Some(uri) => QName::in_ns(uri.clone(), name),
            None => QName::new(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Foo {
        bars: Vec<Bar>,
    }

    struct Bar {
        data: String,
        attr: String,
    }

    fn exporter() -> Exporter {
        let mut exporter = Exporter::new(Some("http://example.com/ns/test"));
        exporter.register::<Foo, _>(|foo, scope| {
            scope.start_element("foo", Attributes::new())?;
            for bar in &foo.bars {
                scope.subexport(bar)?;
            }
            scope.end_element("foo")
        });
        exporter.register::<Bar, _>(|bar, scope| {
            scope.start_element("bar", Attributes::from([("myattr", bar.attr.as_str())]))?;
            scope.characters(&bar.data)?;
            scope.end_element("bar")
        });
        exporter
    }

    fn tree() -> Foo {
        Foo {
            bars: vec![
                Bar {
                    data: "one".to_string(),
                    attr: "a".to_string(),
                },
                Bar {
                    data: "two".to_string(),
                    attr: "b".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_export() {
        let out = exporter()
            .export_to_string(&tree(), &ExportSettings::fragment(), None)
            .unwrap();
        assert_eq!(
            out,
            "<foo xmlns=\"http://example.com/ns/test\">\
             <bar myattr=\"a\">one</bar>\
             <bar myattr=\"b\">two</bar>\
             </foo>"
        );
    }

    #[test]
    fn test_export_as_document() {
        let out = exporter()
            .export_to_string(&tree(), &ExportSettings::document(), None)
            .unwrap();
        assert!(out.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
    }

    #[test]
    fn test_missing_producer_names_type() {
        struct Unknown;
        let err = exporter()
            .export_to_string(&Unknown, &ExportSettings::fragment(), None)
            .unwrap_err();
        match err {
            Error::NoProducerForType(label) => assert!(label.contains("Unknown")),
            other => panic!("expected NoProducerForType, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_producer() {
        struct Mystery;
        let mut exporter = Exporter::new(None);
        exporter.register_fallback(|obj, scope| {
            scope.start_element("unknown", Attributes::from([("type", obj.type_label())]))?;
            scope.end_element("unknown")
        });
        let out = exporter
            .export_to_string(&Mystery, &ExportSettings::fragment(), None)
            .unwrap();
        assert!(out.starts_with("<unknown type=\""));
        assert!(out.contains("Mystery"));
    }

    #[test]
    fn test_exact_match_wins_over_fallback() {
        let mut exporter = Exporter::new(None);
        exporter.register::<u32, _>(|n, scope| {
            scope.start_element("n", Attributes::new())?;
            scope.characters(&n.to_string())?;
            scope.end_element("n")
        });
        exporter.register_fallback(|_, scope| {
            scope.start_element("other", Attributes::new())?;
            scope.end_element("other")
        });
        let n: u32 = 7;
        let out = exporter
            .export_to_string(&n, &ExportSettings::fragment(), None)
            .unwrap();
        assert_eq!(out, "<n>7</n>");

        let f: f64 = 1.5;
        let out = exporter
            .export_to_string(&f, &ExportSettings::fragment(), None)
            .unwrap();
        assert_eq!(out, "<other/>");
    }

    #[test]
    fn test_context_reaches_producers() {
        struct Leaf;
        let mut exporter = Exporter::new(None);
        exporter.register::<Leaf, _>(|_, scope| {
            let suffix = scope
                .context()
                .and_then(|c| c.downcast_ref::<String>())
                .cloned()
                .unwrap_or_default();
            scope.start_element("leaf", Attributes::new())?;
            scope.characters(&suffix)?;
            scope.end_element("leaf")
        });
        let context = "ctx".to_string();
        let out = exporter
            .export_to_string(&Leaf, &ExportSettings::fragment(), Some(&context))
            .unwrap();
        assert_eq!(out, "<leaf>ctx</leaf>");
    }
}
