//! Import Handlers
//!
//! A handler is the per-element worker of the import dispatcher: one
//! boxed instance per element activation, never reused across runs. It
//! exposes a fixed capability surface (overrides, allow policies and
//! the three event callbacks) and talks to its activation record
//! through a [`Scope`].

use super::ImportSettings;
use crate::core::name::{Attributes, QName};
use crate::normalizer::Position;
use crate::Result;
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// The currency of result object graphs: a shared, mutable, dynamically
/// typed cell. Handlers downcast it to whatever node type they build.
pub type Value = Rc<RefCell<dyn Any>>;

/// Wrap a concrete object as a [`Value`].
pub fn value<T: Any>(inner: T) -> Value {
    Rc::new(RefCell::new(inner))
}

/// Builds a fresh handler for one element activation.
pub type HandlerFactory = Rc<dyn Fn() -> Box<dyn Handler>>;

/// Wrap a closure producing a concrete handler into a factory.
pub fn factory<H, F>(build: F) -> HandlerFactory
where
    H: Handler + 'static,
    F: Fn() -> H + 'static,
{
    Rc::new(move || Box::new(build()) as Box<dyn Handler>)
}

/// Handler-factory bindings a handler introduces for its subtree.
pub type Overrides = Vec<(QName, HandlerFactory)>;

/// Per-element import worker.
///
/// All methods have accepting defaults, so a handler implements only
/// what it needs. `overrides` is consulted exactly once, right after
/// construction.
pub trait Handler {
    /// Subtree-scoped handler bindings, declared once at construction.
    /// They override any registered handler for those names, and can
    /// bind names that are not registered at all.
    fn overrides(&self) -> Overrides {
        Vec::new()
    }

    /// Whether a child element may occur here. Checked by the
    /// dispatcher; what a `false` means depends on the settings'
    /// strictness.
    fn element_allowed(&self, _name: &QName) -> bool {
        true
    }

    /// Whether text content may occur here.
    fn text_allowed(&self, _text: &str) -> bool {
        true
    }

    fn start_element(
        &mut self,
        _name: &QName,
        _attrs: &Attributes,
        _scope: &mut Scope<'_>,
    ) -> Result<()> {
        Ok(())
    }

    fn end_element(&mut self, _name: &QName, _scope: &mut Scope<'_>) -> Result<()> {
        Ok(())
    }

    fn characters(&mut self, _text: &str, _scope: &mut Scope<'_>) -> Result<()> {
        Ok(())
    }
}

/// A handler's view of its activation record during one callback.
pub struct Scope<'a> {
    pub(super) inherited: Option<&'a Value>,
    pub(super) result: &'a mut Option<Value>,
    pub(super) data: &'a mut BTreeMap<String, String>,
    pub(super) parent_data: Option<&'a mut BTreeMap<String, String>>,
    pub(super) settings: &'a ImportSettings,
    pub(super) position: Option<Position>,
}

impl Scope<'_> {
    /// The result object inherited from the enclosing frame: what the
    /// parent was building when this element opened (or the external
    /// seed at the outermost level).
    pub fn parent(&self) -> Option<Value> {
        self.inherited.cloned()
    }

    /// Set this element's own result object.
    pub fn set_result(&mut self, value: Value) {
        *self.result = Some(value);
    }

    /// This element's effective result: its own if set, otherwise the
    /// inherited one; leaf and decorator elements contribute to their
    /// parent's object without setting one of their own.
    pub fn result(&self) -> Option<Value> {
        self.result.clone().or_else(|| self.inherited.cloned())
    }

    /// Store a scalar in the enclosing frame's key/value store. This is
    /// how small text-bearing children hand a value to their parent
    /// without building a child object.
    pub fn set_parent_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if let Some(data) = self.parent_data.as_mut() {
            data.insert(key.into(), value.into());
        }
    }

    /// Read a scalar a child stored in this frame.
    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    /// Remove and return a scalar a child stored in this frame.
    pub fn take_data(&mut self, key: &str) -> Option<String> {
        self.data.remove(key)
    }

    /// The run's shared settings.
    pub fn settings(&self) -> &ImportSettings {
        self.settings
    }

    /// Source location of the event being dispatched, when the run was
    /// fed from text.
    pub fn position(&self) -> Option<Position> {
        self.position
    }
}
