//! Handler Registry and Override Ledger
//!
//! The registry is the static base table mapping qualified names to
//! handler factories; it is never mutated by a run. The ledger is the
//! per-run overlay of subtree-scoped overrides: pushes and pops must
//! pair up exactly, one ledger frame per handler frame, and a pop that
//! has nothing to pop is a programming error, not user input.

use super::handler::{HandlerFactory, Overrides};
use crate::core::name::QName;
use crate::{Error, Result};
use std::collections::HashMap;

/// Base factory table, established once per importer.
#[derive(Default)]
pub struct HandlerRegistry {
    base: HashMap<QName, HandlerFactory>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    /// Register the base factory for an element name.
    pub fn register(&mut self, name: QName, factory: HandlerFactory) {
        self.base.insert(name, factory);
    }

    /// The base factory for a name, if any.
    pub fn get(&self, name: &QName) -> Option<HandlerFactory> {
        self.base.get(name).cloned()
    }

    pub fn contains(&self, name: &QName) -> bool {
        self.base.contains_key(name)
    }

    /// All registered names.
    pub fn names(&self) -> impl Iterator<Item = &QName> {
        self.base.keys()
    }
}

/// Per-run stack of override bindings.
#[derive(Default)]
pub(super) struct OverrideLedger {
    overrides: HashMap<QName, Vec<HandlerFactory>>,
    frames: Vec<Vec<QName>>,
}

impl OverrideLedger {
    /// Push one frame of overrides. Every handler frame pushes exactly
    /// one ledger frame, possibly empty, so pops line up by count.
    pub fn push(&mut self, entries: Overrides) {
        let mut keys = Vec::with_capacity(entries.len());
        for (name, factory) in entries {
            self.overrides.entry(name.clone()).or_default().push(factory);
            keys.push(name);
        }
        self.frames.push(keys);
    }

    /// Pop the most recent frame, undoing exactly what it pushed.
    pub fn pop(&mut self) -> Result<()> {
        let keys = self.frames.pop().ok_or(Error::OverrideUnderflow)?;
        for name in keys.iter().rev() {
            let emptied = {
                let stack = self
                    .overrides
                    .get_mut(name)
                    .ok_or(Error::OverrideUnderflow)?;
                stack.pop().ok_or(Error::OverrideUnderflow)?;
                stack.is_empty()
            };
            if emptied {
                self.overrides.remove(name);
            }
        }
        Ok(())
    }

    /// The topmost override binding for a name, if any.
    pub fn active(&self, name: &QName) -> Option<HandlerFactory> {
        self.overrides
            .get(name)
            .and_then(|stack| stack.last())
            .cloned()
    }

    /// Drop all override state; part of the explicit reset after an
    /// aborted run.
    pub fn clear(&mut self) {
        self.overrides.clear();
        self.frames.clear();
    }

    /// True when no overrides are in effect: the effective mapping
    /// equals the base registry again.
    pub fn is_clean(&self) -> bool {
        self.frames.is_empty() && self.overrides.is_empty()
    }
}
