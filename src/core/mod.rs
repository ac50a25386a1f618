//! Core primitives shared by every pipeline stage
//!
//! This module contains the fundamental building blocks:
//! - Name: qualified names and insertion-ordered attribute maps
//! - Events: the parse event type and the sink trait stages implement
//! - Entities: character-reference decoding with a fixed entity table,
//!   text escaping and minimal-escaping attribute quoting

pub mod entities;
pub mod events;
pub mod name;

pub use entities::{decode_text, escape_text, named_entity, EntityPolicy};
pub use events::{CollapsingSink, Event, SaxSink};
pub use name::{Attributes, QName};
