//! In-memory page model the engine reads and drives: an arena document with
//! shadow roots, frames, form-control state and an event log.

pub mod html;
pub mod node;
pub mod selector;

pub use html::parse_document;
pub use node::{
    Document, DomEvent, Element, ElementRef, EventKind, Frame, FrameworkUpdate, MutationRecord,
    NodeId,
};
pub use selector::Selector;
