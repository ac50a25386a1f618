//! tidysax - tolerant markup and object-graph conversion over SAX-style events
//!
//! A layered, event-driven pipeline converting between chaotic markup
//! text and application object graphs:
//!
//! ```text
//! text --> TagNormalizer --> events --> ImportDispatcher --> objects
//!                            (optionally behind a SubsetFilter)
//!
//! objects --> Exporter/producers --> events --> XmlGenerator --> text
//! ```
//!
//! - `normalizer`: tolerant tokenizer; guarantees well-formed events no
//!   matter how malformed the input (auto-close, stray-end discard)
//! - `import`: registry-driven dispatch of events to per-element
//!   handlers with subtree-scoped overrides, building a result graph
//! - `subset`: whitelist policy on top: text-level tag escaping plus
//!   tree-level ignore routing
//! - `export`: type-keyed dispatch of objects to event producers
//! - `generator`: deterministic text rendering, with a stable variant
//!   for byte-for-byte reproducible output
//!
//! Embedders configure exactly two factory maps: element name -> handler
//! for import, runtime type -> producer for export. No global state; all
//! registries are explicit instances scoped to their runs.

pub mod core;
pub mod export;
pub mod generator;
pub mod import;
pub mod normalizer;
pub mod subset;

/// Everything that can abort a run.
///
/// Recoverable malformed-input conditions (stray end tags, unclosed
/// elements) are deliberately absent: the normalizer repairs those and
/// they are never surfaced as failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handler's element-allow policy vetoed a child under strict
    /// settings.
    #[error("element {0} is not allowed here")]
    ElementNotAllowed(QName),

    /// A handler's text-allow policy vetoed character data under strict
    /// settings.
    #[error("text content is not allowed here")]
    TextNotAllowed,

    /// Export-side: the object's exact type has no producer and no
    /// fallback is registered.
    #[error("no producer registered for type {0}")]
    NoProducerForType(&'static str),

    /// A producer received an object of a type it was not registered
    /// for; registry dispatch makes this unreachable in correct use.
    #[error("producer for type {0} received an object of a different type")]
    ProducerTypeMismatch(&'static str),

    /// More overrides were popped than pushed. A correct handler can
    /// never cause this; it indicates unbalanced events fed by hand.
    #[error("override stack popped more entries than were pushed")]
    OverrideUnderflow,

    /// An application handler or producer failed.
    #[error("handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub use crate::core::{Attributes, CollapsingSink, EntityPolicy, Event, QName, SaxSink};
pub use export::{Exportable, Exporter, ExportSettings, ProducerScope};
pub use generator::XmlGenerator;
pub use import::{
    factory, value, Handler, HandlerFactory, ImportDispatcher, ImportSettings, Importer, Overrides,
    Scope, Strictness, Value,
};
pub use normalizer::{saxify, Position, TagNormalizer};
pub use subset::{ElementRule, Subset, TagFilter};
