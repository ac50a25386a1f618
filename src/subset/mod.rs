//! Whitelisted markup subsets
//!
//! Parses chaotic HTML-ish user input against a whitelist of elements,
//! producing a sane result tree. Two strategies compose, text level
//! first:
//!
//! 1. [`TagFilter`] escapes every tag shape and entity reference not on
//!    the allow-list, so unknown markup survives only as literal text.
//! 2. Each element rule declares which child elements it allows; a
//!    known-but-disallowed child is routed to an ignore handler that
//!    swallows its whole subtree, recursively.
//!
//! [`Subset::parse`] runs the full pipeline: filter the text, wrap the
//! event stream in a synthetic root element (so bare text is always
//! inside an element), collapse adjacent character events, and dispatch
//! permissively onto a caller-supplied seed object.

pub mod tagfilter;

pub use tagfilter::TagFilter;

use crate::core::events::{CollapsingSink, SaxSink};
use crate::core::name::{Attributes, QName};
use crate::import::{
    Handler, HandlerFactory, ImportSettings, Importer, Overrides, Scope, Value,
};
use crate::normalizer::TagNormalizer;
use crate::Result;
use std::rc::Rc;

/// One whitelisted element: its allowed attributes, allowed children
/// and the handler that builds its piece of the result tree.
pub struct ElementRule {
    name: String,
    required: Vec<String>,
    optional: Vec<String>,
    children: Vec<String>,
    text_allowed: bool,
    factory: HandlerFactory,
}

impl ElementRule {
    pub fn new(name: &str, factory: HandlerFactory) -> Self {
        ElementRule {
            name: name.to_string(),
            required: Vec::new(),
            optional: Vec::new(),
            children: Vec::new(),
            text_allowed: true,
            factory,
        }
    }

    /// Attributes the element must be able to carry.
    pub fn required_attrs(mut self, attrs: &[&str]) -> Self {
        self.required = attrs.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Attributes the element may carry.
    pub fn optional_attrs(mut self, attrs: &[&str]) -> Self {
        self.optional = attrs.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Child element names allowed inside this element. Everything else
    /// in the subset is ignored when it occurs here.
    pub fn children(mut self, names: &[&str]) -> Self {
        self.children = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Disallow text content inside this element.
    pub fn no_text(mut self) -> Self {
        self.text_allowed = false;
        self
    }
}

/// A whitelist of element rules plus the parse pipeline over them.
pub struct Subset {
    rules: Vec<Rc<ElementRule>>,
    root: String,
}

impl Subset {
    pub fn new() -> Self {
        Subset {
            rules: Vec::new(),
            // The synthetic wrapper element; needs a registered rule
            root: "block".to_string(),
        }
    }

    /// Use a different synthetic root element name.
    pub fn with_root(mut self, name: &str) -> Self {
        self.root = name.to_string();
        self
    }

    pub fn register(&mut self, rule: ElementRule) {
        self.rules.push(Rc::new(rule));
    }

    /// Names of all elements this subset can parse; anything else is
    /// quoted literally by the text filter.
    pub fn parseable_names(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.name.clone()).collect()
    }

    /// The text-level filter derived from the rules.
    pub fn tag_filter(&self) -> TagFilter {
        let mut filter = TagFilter::new().with_html_entities();
        for rule in &self.rules {
            let attrs: Vec<&str> = rule
                .required
                .iter()
                .chain(rule.optional.iter())
                .map(String::as_str)
                .collect();
            filter.register(&rule.name, &attrs);
        }
        filter
    }

    /// Escape all markup this subset cannot parse.
    pub fn filter_tags(&self, text: &str) -> String {
        self.tag_filter().escape_non_elements(text)
    }

    /// Build the importer implementing the tree-level whitelist: each
    /// rule's handler is wrapped to override all subset names outside
    /// its allowed children with the ignore handler.
    pub fn importer(&self) -> Importer {
        let all_names: Rc<Vec<QName>> = Rc::new(
            self.rules
                .iter()
                .map(|rule| QName::new(rule.name.as_str()))
                .collect(),
        );

        let mut importer = Importer::new();
        for rule in &self.rules {
            let ignored: Rc<Vec<QName>> = Rc::new(
                self.rules
                    .iter()
                    .filter(|other| !rule.children.contains(&other.name))
                    .map(|other| QName::new(other.name.as_str()))
                    .collect(),
            );
            let rule = rule.clone();
            let rule_name = rule.name.clone();
            let all_names = all_names.clone();
            let gate: HandlerFactory = Rc::new(move || {
                let inner = (rule.factory)();
                let mut overrides: Overrides = ignored
                    .iter()
                    .map(|name| (name.clone(), ignore_factory(all_names.clone())))
                    .collect();
                // The handler's own overrides shadow the ignore entries
                overrides.extend(inner.overrides());
                Box::new(SubsetGate {
                    inner,
                    overrides,
                    text_allowed: rule.text_allowed,
                }) as Box<dyn Handler>
            });
            importer.register(QName::new(rule_name.as_str()), gate);
        }
        importer
    }

    /// Parse filtered text onto `seed` and return it.
    ///
    /// The always-empty tag set is disabled here: void-style elements
    /// such as `br` are governed by their rules (empty children lists
    /// swallow any accidental content), matching how hand-written input
    /// like `Foo<br>hey</br>Bar` is expected to collapse.
    pub fn parse(&self, text: &str, seed: Value) -> Result<Value> {
        let filtered = self.filter_tags(text);
        let importer = self.importer();
        let mut dispatcher = importer.dispatcher(ImportSettings::permissive(), Some(seed.clone()));
        {
            let mut collapsing = CollapsingSink::new(&mut dispatcher);
            let root = QName::new(self.root.as_str());
            collapsing.start_element(&root, &Attributes::new())?;
            let normalizer = TagNormalizer::new(&filtered).with_empty_tags(Vec::<String>::new());
            for event in normalizer {
                event.feed(&mut collapsing)?;
            }
            collapsing.end_element(&root)?;
        }
        Ok(dispatcher.into_result().unwrap_or(seed))
    }
}

impl Default for Subset {
    fn default() -> Self {
        Subset::new()
    }
}

/// Wraps a rule's handler, adding the ignore overrides for subset names
/// the rule does not allow and enforcing its text policy.
struct SubsetGate {
    inner: Box<dyn Handler>,
    overrides: Overrides,
    text_allowed: bool,
}

impl Handler for SubsetGate {
    fn overrides(&self) -> Overrides {
        self.overrides.clone()
    }

    fn element_allowed(&self, name: &QName) -> bool {
        self.inner.element_allowed(name)
    }

    fn text_allowed(&self, text: &str) -> bool {
        self.text_allowed && self.inner.text_allowed(text)
    }

    fn start_element(
        &mut self,
        name: &QName,
        attrs: &Attributes,
        scope: &mut Scope<'_>,
    ) -> Result<()> {
        self.inner.start_element(name, attrs, scope)
    }

    fn end_element(&mut self, name: &QName, scope: &mut Scope<'_>) -> Result<()> {
        self.inner.end_element(name, scope)
    }

    fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
        self.inner.characters(text, scope)
    }
}

/// Swallows an element and, through its overrides, every subset element
/// below it. Unregistered descendants delegate here and meet no-ops.
struct IgnoreHandler {
    names: Rc<Vec<QName>>,
}

impl Handler for IgnoreHandler {
    fn overrides(&self) -> Overrides {
        self.names
            .iter()
            .map(|name| (name.clone(), ignore_factory(self.names.clone())))
            .collect()
    }
}

fn ignore_factory(names: Rc<Vec<QName>>) -> HandlerFactory {
    Rc::new(move || {
        Box::new(IgnoreHandler {
            names: names.clone(),
        }) as Box<dyn Handler>
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::escape_text;
    use crate::import::{factory, value};

    /// Minimal element node for building result trees in tests.
    struct Elem {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Value>,
    }

    impl Elem {
        fn new(name: &str) -> Elem {
            Elem {
                name: name.to_string(),
                attrs: Vec::new(),
                children: Vec::new(),
            }
        }

        fn to_xml(&self) -> String {
            let mut out = String::new();
            out.push('<');
            out.push_str(&self.name);
            for (name, value) in &self.attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(value);
                out.push('"');
            }
            out.push('>');
            for child in &self.children {
                let child = child.borrow();
                if let Some(elem) = child.downcast_ref::<Elem>() {
                    out.push_str(&elem.to_xml());
                } else if let Some(text) = child.downcast_ref::<String>() {
                    out.push_str(&escape_text(text));
                }
            }
            out.push_str("</");
            out.push_str(&self.name);
            out.push('>');
            out
        }
    }

    fn append_child(parent: &Value, child: Value) {
        parent
            .borrow_mut()
            .downcast_mut::<Elem>()
            .expect("parent is an element")
            .children
            .push(child);
    }

    /// Root-level text lands directly in the seed element.
    struct BlockHandler;
    impl Handler for BlockHandler {
        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let parent = scope.parent().expect("block has a seed");
            append_child(&parent, value(text.to_string()));
            Ok(())
        }
    }

    /// Translates a parsed markup tag into its tree name.
    struct MarkupTextHandler {
        tree_name: &'static str,
    }
    impl Handler for MarkupTextHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            _attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let child = value(Elem::new(self.tree_name));
            let parent = scope.parent().expect("markup has a parent");
            append_child(&parent, child.clone());
            scope.set_result(child);
            Ok(())
        }

        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let node = scope.result().expect("markup result set at start");
            append_child(&node, value(text.to_string()));
            Ok(())
        }
    }

    /// `<a href>` becomes `<link url>`.
    struct AHandler;
    impl Handler for AHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let mut link = Elem::new("link");
            link.attrs.push((
                "url".to_string(),
                attrs.get("href").unwrap_or_default().to_string(),
            ));
            let child = value(link);
            let parent = scope.parent().expect("link has a parent");
            append_child(&parent, child.clone());
            scope.set_result(child);
            Ok(())
        }

        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let node = scope.result().expect("link result set at start");
            append_child(&node, value(text.to_string()));
            Ok(())
        }
    }

    /// `<index>text</index>` becomes `<index name="text"/>`; markup
    /// inside is discarded, text accumulated.
    #[derive(Default)]
    struct IndexHandler {
        text: String,
    }
    impl Handler for IndexHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            _attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let child = value(Elem::new("index"));
            let parent = scope.parent().expect("index has a parent");
            append_child(&parent, child.clone());
            scope.set_result(child);
            Ok(())
        }

        fn characters(&mut self, text: &str, _scope: &mut Scope<'_>) -> Result<()> {
            self.text.push_str(text);
            Ok(())
        }

        fn end_element(&mut self, _name: &QName, scope: &mut Scope<'_>) -> Result<()> {
            if let Some(node) = scope.result() {
                node.borrow_mut()
                    .downcast_mut::<Elem>()
                    .expect("index node")
                    .attrs
                    .push(("name".to_string(), std::mem::take(&mut self.text)));
            }
            Ok(())
        }
    }

    /// `<br>` becomes an empty element; accidental content is dropped.
    struct BrHandler;
    impl Handler for BrHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            _attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let child = value(Elem::new("br"));
            let parent = scope.parent().expect("br has a parent");
            append_child(&parent, child.clone());
            scope.set_result(child);
            Ok(())
        }

        fn characters(&mut self, _text: &str, _scope: &mut Scope<'_>) -> Result<()> {
            // Content inside br is a typo, drop it
            Ok(())
        }
    }

    const MARKUP_TEXT_BR: &[&str] = &["i", "b", "u", "sub", "sup", "br"];
    const MARKUP: &[&str] = &["i", "b", "u", "sub", "sup", "br", "a", "index"];

    fn markup_factory(tree_name: &'static str) -> HandlerFactory {
        factory(move || MarkupTextHandler { tree_name })
    }

    fn paragraph_subset() -> Subset {
        let mut subset = Subset::new();
        for (parsed, tree) in [
            ("i", "em"),
            ("b", "strong"),
            ("u", "underline"),
            ("sub", "sub"),
            ("sup", "super"),
        ] {
            subset.register(ElementRule::new(parsed, markup_factory(tree)).children(MARKUP_TEXT_BR));
        }
        subset.register(
            ElementRule::new("a", factory(|| AHandler))
                .required_attrs(&["href"])
                .children(MARKUP_TEXT_BR),
        );
        subset.register(ElementRule::new("index", factory(IndexHandler::default)));
        subset.register(ElementRule::new("br", factory(|| BrHandler)));
        subset.register(ElementRule::new("block", factory(|| BlockHandler)).children(MARKUP));
        subset
    }

    fn parse(text: &str) -> String {
        let seed = value(Elem::new("p"));
        let result = paragraph_subset().parse(text, seed).unwrap();
        let result = result.borrow();
        result.downcast_ref::<Elem>().unwrap().to_xml()
    }

    #[test]
    fn test_simple_em() {
        assert_eq!(parse("<i>Foo</i>"), "<p><em>Foo</em></p>");
    }

    #[test]
    fn test_close_em() {
        assert_eq!(parse("<i>Foo"), "<p><em>Foo</em></p>");
    }

    #[test]
    fn test_euml_em() {
        assert_eq!(parse("<i>Foo &euml;</i>"), "<p><em>Foo ë</em></p>");
    }

    #[test]
    fn test_nomarkup() {
        assert_eq!(parse("This is simple"), "<p>This is simple</p>");
    }

    #[test]
    fn test_bold_i_markup() {
        assert_eq!(
            parse("This is <b>Bold</b> and this is <i>Italic</i>"),
            "<p>This is <strong>Bold</strong> and this is <em>Italic</em></p>"
        );
    }

    #[test]
    fn test_lots_markup() {
        assert_eq!(
            parse("<i>i</i><b>b</b><u>u</u><sub>sub</sub><sup>sup</sup>"),
            "<p><em>i</em><strong>b</strong><underline>u</underline>\
             <sub>sub</sub><super>sup</super></p>"
        );
    }

    #[test]
    fn test_mixed_markup() {
        assert_eq!(
            parse("<i><b>bold italic</b></i>"),
            "<p><em><strong>bold italic</strong></em></p>"
        );
    }

    #[test]
    fn test_link() {
        assert_eq!(
            parse("<a href=\"http://example.com/\">Example</a>"),
            "<p><link url=\"http://example.com/\">Example</link></p>"
        );
    }

    #[test]
    fn test_link_markup() {
        assert_eq!(
            parse("<a href=\"http://example.com/\">The <b>bold</b> way</a>"),
            "<p><link url=\"http://example.com/\">The <strong>bold</strong> way</link></p>"
        );
    }

    #[test]
    fn test_nested_link_ignored() {
        // A link inside a link is not allowed; its whole subtree is
        // swallowed by the ignore handler
        assert_eq!(
            parse("<a href=\"http://example.com/\">Foo<a href=\"foo\">Bar</a></a>"),
            "<p><link url=\"http://example.com/\">Foo</link></p>"
        );
    }

    #[test]
    fn test_unknown_tag_becomes_text() {
        // The text filter quotes <hoi> before parsing, so it survives
        // as literal text instead of structure
        assert_eq!(
            parse("<a href=\"http://example.com/\">Foo<hoi>Bar</hoi></a>"),
            "<p><link url=\"http://example.com/\">Foo&lt;hoi&gt;Bar&lt;/hoi&gt;</link></p>"
        );
    }

    #[test]
    fn test_index() {
        assert_eq!(parse("<index>Foo</index>"), "<p><index name=\"Foo\"></index></p>");
    }

    #[test]
    fn test_index_markup_discarded() {
        assert_eq!(
            parse("<index>Fo<b>h</b>o</index>"),
            "<p><index name=\"Foo\"></index></p>"
        );
    }

    #[test]
    fn test_br() {
        assert_eq!(parse("Foo<br/>Bar"), "<p>Foo<br></br>Bar</p>");
    }

    #[test]
    fn test_br_with_text_inside() {
        assert_eq!(parse("Foo<br>hey</br>Bar"), "<p>Foo<br></br>Bar</p>");
    }

    #[test]
    fn test_br_with_markup_inside() {
        assert_eq!(parse("Foo<br><i>Hoi</i></br>Bar"), "<p>Foo<br></br>Bar</p>");
    }

    #[test]
    fn test_br_with_nested_markup_inside() {
        assert_eq!(
            parse("Foo<br><i>Hoi<b>Baz</b></i></br>Bar"),
            "<p>Foo<br></br>Bar</p>"
        );
    }
}
