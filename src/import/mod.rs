//! Import: event dispatch into result object graphs
//!
//! The importer owns a base registry of per-element handler factories.
//! A run walks the event stream with a frame stack and a depth counter:
//! each registered element opens a frame whose handler builds part of
//! the result graph, may declare subtree-scoped overrides, and may veto
//! children via its allow policies. Unregistered elements delegate to
//! the innermost open frame, which is how inherited and ignored content
//! works.
//!
//! The registry is static for the importer's lifetime; all run-scoped
//! state (frames, depth, overrides) lives in the dispatcher and is torn
//! down by [`ImportDispatcher::reset`], which a caller must invoke
//! before reusing a dispatcher whose run was aborted.

pub mod handler;
pub mod registry;

pub use handler::{factory, value, Handler, HandlerFactory, Overrides, Scope, Value};
pub use registry::HandlerRegistry;

use crate::core::events::SaxSink;
use crate::core::name::{Attributes, QName};
use crate::normalizer::{Position, TagNormalizer};
use crate::{Error, Result};
use log::debug;
use registry::OverrideLedger;
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

/// How validation failures are treated during a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strictness {
    /// A disallowed element or text aborts the run.
    #[default]
    Strict,
    /// Disallowed content is silently skipped, subtree included.
    Permissive,
}

/// Shared settings handlers can inspect during a run.
#[derive(Clone, Default)]
pub struct ImportSettings {
    strictness: Strictness,
    context: Option<Rc<dyn Any>>,
}

impl ImportSettings {
    pub fn strict() -> Self {
        ImportSettings::default()
    }

    pub fn permissive() -> Self {
        ImportSettings {
            strictness: Strictness::Permissive,
            context: None,
        }
    }

    /// Attach an application-defined context object for handlers.
    pub fn with_context(mut self, context: Rc<dyn Any>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn is_permissive(&self) -> bool {
        self.strictness == Strictness::Permissive
    }

    pub fn context(&self) -> Option<&Rc<dyn Any>> {
        self.context.as_ref()
    }
}

/// Outcome of an allow-policy check.
enum Verdict {
    Accepted,
    Skipped,
    Rejected(Error),
}

fn verdict(allowed: bool, settings: &ImportSettings, reject: impl FnOnce() -> Error) -> Verdict {
    if allowed {
        Verdict::Accepted
    } else if settings.is_permissive() {
        Verdict::Skipped
    } else {
        Verdict::Rejected(reject())
    }
}

/// Per-element activation record.
struct Frame {
    handler: Box<dyn Handler>,
    /// The enclosing frame's result at open time.
    inherited: Option<Value>,
    /// This frame's own result, if the handler set one.
    result: Option<Value>,
    /// Scalar store children fill via `Scope::set_parent_data`.
    data: BTreeMap<String, String>,
    /// Nominal nesting depth at which the frame opened.
    depth: usize,
}

/// An importer: a base handler registry plus run construction.
#[derive(Default)]
pub struct Importer {
    registry: HandlerRegistry,
}

impl Importer {
    pub fn new() -> Self {
        Importer::default()
    }

    /// Register the base handler factory for an element name.
    pub fn register(&mut self, name: QName, factory: HandlerFactory) {
        self.registry.register(name, factory);
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Start a run: a dispatcher to feed events into. `seed` is the
    /// external object everything attaches to; without one, the run's
    /// result is whatever the outermost handler produced.
    pub fn dispatcher(&self, settings: ImportSettings, seed: Option<Value>) -> ImportDispatcher<'_> {
        ImportDispatcher {
            registry: &self.registry,
            settings,
            ledger: OverrideLedger::default(),
            frames: Vec::new(),
            depth: 0,
            muted_below: None,
            seed,
            ambient: None,
            position: None,
        }
    }

    /// Parse text through the tolerant normalizer and return the run's
    /// result.
    pub fn parse_str(
        &self,
        text: &str,
        settings: ImportSettings,
        seed: Option<Value>,
    ) -> Result<Option<Value>> {
        let mut dispatcher = self.dispatcher(settings, seed);
        let mut normalizer = TagNormalizer::new(text);
        while let Some(event) = normalizer.next() {
            dispatcher.set_position(Some(normalizer.position()));
            event.feed(&mut dispatcher)?;
        }
        Ok(dispatcher.into_result())
    }
}

/// One import run: receives events, builds the result graph.
pub struct ImportDispatcher<'r> {
    registry: &'r HandlerRegistry,
    settings: ImportSettings,
    ledger: OverrideLedger,
    frames: Vec<Frame>,
    depth: usize,
    /// When set, every event at or below this depth belongs to a
    /// skipped element's subtree and is suppressed.
    muted_below: Option<usize>,
    seed: Option<Value>,
    /// Result captured from the most recently closed frame.
    ambient: Option<Value>,
    position: Option<Position>,
}

impl ImportDispatcher<'_> {
    /// Record the source location of the next event, for handler
    /// diagnostics.
    pub fn set_position(&mut self, position: Option<Position>) {
        self.position = position;
    }

    /// The run's result so far: the external seed if one was supplied,
    /// else the outermost closed handler's result.
    pub fn result(&self) -> Option<Value> {
        self.seed.clone().or_else(|| self.ambient.clone())
    }

    /// Consume the dispatcher and return the run's result.
    pub fn into_result(self) -> Option<Value> {
        self.seed.or(self.ambient)
    }

    /// True when run-scoped state is still live: frames on the stack or
    /// overrides in effect. An aborted run leaves this set until
    /// [`ImportDispatcher::reset`] is called.
    pub fn needs_reset(&self) -> bool {
        !self.frames.is_empty() || !self.ledger.is_clean()
    }

    /// Tear down all run-scoped state. After an aborted run the
    /// override ledger is inconsistent; calling this restores the
    /// dispatcher (and the base-registry mapping) for reuse.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.ledger.clear();
        self.depth = 0;
        self.muted_below = None;
        self.ambient = None;
        self.position = None;
    }

    fn on_start(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        if self.muted_below.is_some() {
            self.depth += 1;
            return Ok(());
        }

        let resolved = self
            .ledger
            .active(name)
            .or_else(|| self.registry.get(name));

        match resolved {
            None => {
                // Unregistered: delegate to the innermost open frame,
                // subject to its allow policy. With no frame at all the
                // event has nowhere to go and is dropped.
                if let Some(top) = self.frames.len().checked_sub(1) {
                    let allowed = self.frames[top].handler.element_allowed(name);
                    match verdict(allowed, &self.settings, || {
                        Error::ElementNotAllowed(name.clone())
                    }) {
                        Verdict::Accepted => self.call_start(top, name, attrs)?,
                        Verdict::Skipped => {
                            debug!("skipping disallowed element {}", name);
                            self.muted_below = Some(self.depth);
                        }
                        Verdict::Rejected(err) => return Err(err),
                    }
                }
            }
            Some(factory) => {
                let handler = factory();
                self.ledger.push(handler.overrides());
                let inherited = match self.frames.last() {
                    Some(parent) => parent.result.clone().or_else(|| parent.inherited.clone()),
                    None => self.seed.clone(),
                };
                self.frames.push(Frame {
                    handler,
                    inherited,
                    result: None,
                    data: BTreeMap::new(),
                    depth: self.depth,
                });
                let idx = self.frames.len() - 1;
                let allowed = idx == 0 || self.frames[idx - 1].handler.element_allowed(name);
                match verdict(allowed, &self.settings, || {
                    Error::ElementNotAllowed(name.clone())
                }) {
                    Verdict::Accepted => self.call_start(idx, name, attrs)?,
                    Verdict::Skipped => {
                        debug!("skipping disallowed element {}", name);
                        self.muted_below = Some(self.depth);
                    }
                    Verdict::Rejected(err) => return Err(err),
                }
            }
        }

        self.depth += 1;
        Ok(())
    }

    fn on_end(&mut self, name: &QName) -> Result<()> {
        if self.depth == 0 {
            debug!("dropping end element {} below document level", name);
            return Ok(());
        }
        self.depth -= 1;

        if let Some(muted_at) = self.muted_below {
            if self.depth != muted_at {
                // Still inside the skipped subtree
                return Ok(());
            }
            self.muted_below = None;
            // The skipped element owns a frame only if a factory was
            // found for it; close that frame without dispatching,
            // keeping depth and override bookkeeping exact.
            if self.frames.last().map_or(false, |f| f.depth == self.depth) {
                if let Some(frame) = self.frames.pop() {
                    self.ambient = frame.result.or(frame.inherited);
                    self.ledger.pop()?;
                }
            }
            return Ok(());
        }

        let closing = self.frames.last().map_or(false, |f| f.depth == self.depth);
        if closing {
            if let Some(frame) = self.frames.pop() {
                self.ambient = frame.result.clone().or_else(|| frame.inherited.clone());
                self.ledger.pop()?;
                let allowed = self
                    .frames
                    .last()
                    .map_or(true, |parent| parent.handler.element_allowed(name));
                match verdict(allowed, &self.settings, || {
                    Error::ElementNotAllowed(name.clone())
                }) {
                    Verdict::Accepted => self.call_end_popped(frame, name)?,
                    Verdict::Skipped => {}
                    Verdict::Rejected(err) => return Err(err),
                }
            }
        } else if let Some(top) = self.frames.len().checked_sub(1) {
            self.call_end(top, name)?;
        }
        Ok(())
    }

    fn on_characters(&mut self, text: &str) -> Result<()> {
        if self.muted_below.is_some() {
            return Ok(());
        }
        let Some(top) = self.frames.len().checked_sub(1) else {
            return Ok(());
        };
        let allowed = self.frames[top].handler.text_allowed(text);
        match verdict(allowed, &self.settings, || Error::TextNotAllowed) {
            Verdict::Accepted => self.call_characters(top, text),
            Verdict::Skipped => {
                debug!("skipping disallowed text");
                Ok(())
            }
            Verdict::Rejected(err) => Err(err),
        }
    }

    fn call_start(&mut self, idx: usize, name: &QName, attrs: &Attributes) -> Result<()> {
        let settings = &self.settings;
        let position = self.position;
        let (head, tail) = self.frames.split_at_mut(idx);
        let Frame {
            handler,
            inherited,
            result,
            data,
            ..
        } = &mut tail[0];
        let mut scope = Scope {
            inherited: inherited.as_ref(),
            result,
            data,
            parent_data: head.last_mut().map(|f| &mut f.data),
            settings,
            position,
        };
        handler.start_element(name, attrs, &mut scope)
    }

    fn call_end(&mut self, idx: usize, name: &QName) -> Result<()> {
        let settings = &self.settings;
        let position = self.position;
        let (head, tail) = self.frames.split_at_mut(idx);
        let Frame {
            handler,
            inherited,
            result,
            data,
            ..
        } = &mut tail[0];
        let mut scope = Scope {
            inherited: inherited.as_ref(),
            result,
            data,
            parent_data: head.last_mut().map(|f| &mut f.data),
            settings,
            position,
        };
        handler.end_element(name, &mut scope)
    }

    fn call_characters(&mut self, idx: usize, text: &str) -> Result<()> {
        let settings = &self.settings;
        let position = self.position;
        let (head, tail) = self.frames.split_at_mut(idx);
        let Frame {
            handler,
            inherited,
            result,
            data,
            ..
        } = &mut tail[0];
        let mut scope = Scope {
            inherited: inherited.as_ref(),
            result,
            data,
            parent_data: head.last_mut().map(|f| &mut f.data),
            settings,
            position,
        };
        handler.characters(text, &mut scope)
    }

    /// Dispatch `end_element` to a frame that has already been popped;
    /// its parent is whatever is on top of the stack now.
    fn call_end_popped(&mut self, frame: Frame, name: &QName) -> Result<()> {
        let Frame {
            mut handler,
            inherited,
            mut result,
            mut data,
            ..
        } = frame;
        let settings = &self.settings;
        let position = self.position;
        let mut scope = Scope {
            inherited: inherited.as_ref(),
            result: &mut result,
            data: &mut data,
            parent_data: self.frames.last_mut().map(|f| &mut f.data),
            settings,
            position,
        };
        handler.end_element(name, &mut scope)
    }
}

impl SaxSink for ImportDispatcher<'_> {
    fn start_element(&mut self, name: &QName, attrs: &Attributes) -> Result<()> {
        self.on_start(name, attrs)
    }

    fn end_element(&mut self, name: &QName) -> Result<()> {
        self.on_end(name)
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.on_characters(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Doc {
        alpha: Option<Value>,
    }

    #[derive(Default)]
    struct Alpha {
        sub: Vec<Value>,
    }

    struct Beta {
        value: String,
    }

    struct Gamma {
        value: String,
    }

    struct Delta {
        value: String,
        extra: Option<Value>,
    }

    struct AlphaHandler;
    impl Handler for AlphaHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            _attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let alpha = value(Alpha::default());
            if let Some(doc) = scope.parent() {
                if let Some(doc) = doc.borrow_mut().downcast_mut::<Doc>() {
                    doc.alpha = Some(alpha.clone());
                }
            }
            scope.set_result(alpha);
            Ok(())
        }
    }

    struct BetaHandler;
    impl Handler for BetaHandler {
        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let beta = value(Beta {
                value: text.to_string(),
            });
            let parent = scope.parent().expect("beta needs a parent");
            parent
                .borrow_mut()
                .downcast_mut::<Alpha>()
                .expect("beta lives in alpha")
                .sub
                .push(beta.clone());
            scope.set_result(beta);
            Ok(())
        }
    }

    struct GammaHandler;
    impl Handler for GammaHandler {
        fn start_element(
            &mut self,
            _name: &QName,
            attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            let gamma = value(Gamma {
                value: attrs.get("value").unwrap_or_default().to_string(),
            });
            let parent = scope.parent().expect("gamma needs a parent");
            parent
                .borrow_mut()
                .downcast_mut::<Alpha>()
                .expect("gamma lives in alpha")
                .sub
                .push(gamma.clone());
            scope.set_result(gamma);
            Ok(())
        }
    }

    struct DeltaHandler;
    impl Handler for DeltaHandler {
        fn overrides(&self) -> Overrides {
            vec![(QName::new("beta"), factory(|| SubBetaHandler))]
        }

        fn start_element(
            &mut self,
            _name: &QName,
            attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            scope.set_result(value(Delta {
                value: attrs.get("attr").unwrap_or_default().to_string(),
                extra: None,
            }));
            Ok(())
        }

        fn end_element(&mut self, _name: &QName, scope: &mut Scope<'_>) -> Result<()> {
            let delta = scope.result().expect("delta result set at start");
            let parent = scope.parent().expect("delta needs a parent");
            parent
                .borrow_mut()
                .downcast_mut::<Alpha>()
                .expect("delta lives in alpha")
                .sub
                .push(delta);
            Ok(())
        }
    }

    struct SubBetaHandler;
    impl Handler for SubBetaHandler {
        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let parent = scope.parent().expect("sub-beta needs a parent");
            parent
                .borrow_mut()
                .downcast_mut::<Delta>()
                .expect("sub-beta lives in delta")
                .extra = Some(value(Beta {
                value: text.to_string(),
            }));
            Ok(())
        }
    }

    fn importer() -> Importer {
        let mut importer = Importer::new();
        importer.register(QName::new("alpha"), factory(|| AlphaHandler));
        importer.register(QName::new("beta"), factory(|| BetaHandler));
        importer.register(QName::new("gamma"), factory(|| GammaHandler));
        importer.register(QName::new("delta"), factory(|| DeltaHandler));
        importer
    }

    fn sub_values(doc: &Value) -> Vec<Value> {
        let doc = doc.borrow();
        let doc = doc.downcast_ref::<Doc>().expect("doc seed");
        let alpha = doc.alpha.as_ref().expect("alpha imported");
        let alpha = alpha.borrow();
        alpha.downcast_ref::<Alpha>().expect("alpha type").sub.clone()
    }

    #[test]
    fn test_import() {
        let xml = "<alpha>\
                   <beta>One</beta>\
                   <gamma value=\"Two\" />\
                   <beta>Three</beta>\
                   <gamma value=\"Four\" />\
                   <delta attr=\"Five\"><beta>Six</beta></delta>\
                   </alpha>";
        let seed = value(Doc::default());
        let result = importer()
            .parse_str(xml, ImportSettings::strict(), Some(seed))
            .unwrap()
            .unwrap();

        let sub = sub_values(&result);
        assert_eq!(sub.len(), 5);
        assert_eq!(sub[0].borrow().downcast_ref::<Beta>().unwrap().value, "One");
        assert_eq!(sub[1].borrow().downcast_ref::<Gamma>().unwrap().value, "Two");
        assert_eq!(sub[2].borrow().downcast_ref::<Beta>().unwrap().value, "Three");
        assert_eq!(sub[3].borrow().downcast_ref::<Gamma>().unwrap().value, "Four");
        let delta = sub[4].borrow();
        let delta = delta.downcast_ref::<Delta>().unwrap();
        assert_eq!(delta.value, "Five");
        let extra = delta.extra.as_ref().unwrap().clone();
        assert_eq!(extra.borrow().downcast_ref::<Beta>().unwrap().value, "Six");
    }

    #[test]
    fn test_ordered_children() {
        let xml = "<alpha><beta>One</beta><gamma value=\"Two\"/></alpha>";
        let seed = value(Doc::default());
        let result = importer()
            .parse_str(xml, ImportSettings::strict(), Some(seed))
            .unwrap()
            .unwrap();

        let sub = sub_values(&result);
        let values: Vec<String> = sub
            .iter()
            .map(|v| {
                let v = v.borrow();
                if let Some(beta) = v.downcast_ref::<Beta>() {
                    beta.value.clone()
                } else {
                    v.downcast_ref::<Gamma>().unwrap().value.clone()
                }
            })
            .collect();
        assert_eq!(values, vec!["One", "Two"]);
    }

    #[test]
    fn test_override_invisible_to_siblings() {
        // Inside <delta>, beta is overridden to feed delta's extra
        // slot; a beta sibling of delta must use the base handler again.
        let xml = "<alpha>\
                   <delta attr=\"D\"><beta>Inner</beta></delta>\
                   <beta>Outer</beta>\
                   </alpha>";
        let seed = value(Doc::default());
        let result = importer()
            .parse_str(xml, ImportSettings::strict(), Some(seed))
            .unwrap()
            .unwrap();

        let sub = sub_values(&result);
        assert_eq!(sub.len(), 2);
        let delta = sub[0].borrow();
        let delta = delta.downcast_ref::<Delta>().unwrap();
        let extra = delta.extra.as_ref().unwrap().clone();
        assert_eq!(extra.borrow().downcast_ref::<Beta>().unwrap().value, "Inner");
        assert_eq!(sub[1].borrow().downcast_ref::<Beta>().unwrap().value, "Outer");
    }

    #[test]
    fn test_result_without_seed_is_outermost() {
        struct RootHandler;
        impl Handler for RootHandler {
            fn start_element(
                &mut self,
                _name: &QName,
                attrs: &Attributes,
                scope: &mut Scope<'_>,
            ) -> Result<()> {
                scope.set_result(value(attrs.get("id").unwrap_or_default().to_string()));
                Ok(())
            }
        }

        let mut importer = Importer::new();
        importer.register(QName::new("root"), factory(|| RootHandler));
        let result = importer
            .parse_str("<root id=\"r1\"/>", ImportSettings::strict(), None)
            .unwrap()
            .unwrap();
        assert_eq!(result.borrow().downcast_ref::<String>().unwrap(), "r1");
    }

    struct Fussy;
    impl Handler for Fussy {
        fn element_allowed(&self, name: &QName) -> bool {
            name.local_name() != "bad"
        }

        fn text_allowed(&self, _text: &str) -> bool {
            false
        }

        fn start_element(
            &mut self,
            _name: &QName,
            _attrs: &Attributes,
            scope: &mut Scope<'_>,
        ) -> Result<()> {
            scope.set_result(value(Vec::<String>::new()));
            Ok(())
        }
    }

    struct ItemHandler;
    impl Handler for ItemHandler {
        fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
            let parent = scope.parent().expect("item needs a parent");
            parent
                .borrow_mut()
                .downcast_mut::<Vec<String>>()
                .expect("items live in a list")
                .push(text.to_string());
            Ok(())
        }
    }

    fn fussy_importer() -> Importer {
        let mut importer = Importer::new();
        importer.register(QName::new("fussy"), factory(|| Fussy));
        importer.register(QName::new("item"), factory(|| ItemHandler));
        importer.register(QName::new("bad"), factory(|| ItemHandler));
        importer
    }

    #[test]
    fn test_strict_rejects_disallowed_element() {
        let err = fussy_importer()
            .parse_str(
                "<fussy><bad>boom</bad></fussy>",
                ImportSettings::strict(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ElementNotAllowed(name) if name.local_name() == "bad"));
    }

    #[test]
    fn test_permissive_skips_subtree() {
        // The disallowed <bad> and everything inside it, including a
        // registered <item>, vanishes; the sibling <item> survives.
        let result = fussy_importer()
            .parse_str(
                "<fussy><bad><item>lost</item></bad><item>kept</item></fussy>",
                ImportSettings::permissive(),
                None,
            )
            .unwrap()
            .unwrap();
        let items = result.borrow();
        assert_eq!(
            items.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["kept".to_string()]
        );
    }

    #[test]
    fn test_strict_rejects_disallowed_text() {
        let err = fussy_importer()
            .parse_str("<fussy>loose text</fussy>", ImportSettings::strict(), None)
            .unwrap_err();
        assert!(matches!(err, Error::TextNotAllowed));
    }

    #[test]
    fn test_permissive_drops_disallowed_text() {
        let result = fussy_importer()
            .parse_str(
                "<fussy>loose<item>kept</item></fussy>",
                ImportSettings::permissive(),
                None,
            )
            .unwrap()
            .unwrap();
        let items = result.borrow();
        assert_eq!(
            items.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["kept".to_string()]
        );
    }

    #[test]
    fn test_unregistered_elements_delegate() {
        #[derive(Default)]
        struct Collecting {
            seen: Vec<String>,
        }
        impl Handler for Collecting {
            fn start_element(
                &mut self,
                name: &QName,
                _attrs: &Attributes,
                _scope: &mut Scope<'_>,
            ) -> Result<()> {
                self.seen.push(name.local_name().to_string());
                Ok(())
            }

            fn end_element(&mut self, name: &QName, scope: &mut Scope<'_>) -> Result<()> {
                if name.local_name() == "doc" {
                    scope.set_result(value(self.seen.clone()));
                }
                Ok(())
            }
        }

        let mut importer = Importer::new();
        importer.register(QName::new("doc"), factory(Collecting::default));
        let result = importer
            .parse_str(
                "<doc><mystery/><other>x</other></doc>",
                ImportSettings::strict(),
                None,
            )
            .unwrap()
            .unwrap();
        let seen = result.borrow();
        assert_eq!(
            seen.downcast_ref::<Vec<String>>().unwrap(),
            &vec!["doc".to_string(), "mystery".to_string(), "other".to_string()]
        );
    }

    #[test]
    fn test_scalar_data_handed_to_parent() {
        struct Parent;
        impl Handler for Parent {
            fn end_element(&mut self, _name: &QName, scope: &mut Scope<'_>) -> Result<()> {
                let title = scope.take_data("title").unwrap_or_default();
                scope.set_result(value(title));
                Ok(())
            }
        }

        struct TitleHandler;
        impl Handler for TitleHandler {
            fn characters(&mut self, text: &str, scope: &mut Scope<'_>) -> Result<()> {
                scope.set_parent_data("title", text);
                Ok(())
            }
        }

        let mut importer = Importer::new();
        importer.register(QName::new("entry"), factory(|| Parent));
        importer.register(QName::new("title"), factory(|| TitleHandler));
        let result = importer
            .parse_str(
                "<entry><title>A title</title></entry>",
                ImportSettings::strict(),
                None,
            )
            .unwrap()
            .unwrap();
        assert_eq!(result.borrow().downcast_ref::<String>().unwrap(), "A title");
    }

    #[test]
    fn test_reset_restores_aborted_dispatcher() {
        let importer = fussy_importer();
        let mut dispatcher = importer.dispatcher(ImportSettings::strict(), None);
        let fussy = QName::new("fussy");
        dispatcher.start_element(&fussy, &Attributes::new()).unwrap();
        // Aborts mid-run, leaving a frame and its ledger entry behind
        assert!(dispatcher.characters("boom").is_err());
        assert!(dispatcher.needs_reset());

        dispatcher.reset();
        assert!(!dispatcher.needs_reset());
        dispatcher.start_element(&fussy, &Attributes::new()).unwrap();
        dispatcher.end_element(&fussy).unwrap();
        assert!(dispatcher.result().is_some());
    }
}
