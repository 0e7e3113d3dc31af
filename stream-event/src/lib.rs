//! Flow event wire shape: content + state delta + envelope.
//!
//! This crate defines the unit the engine emits to a runner: an [`Event`] with
//! optional [`Content`] (role + parts) and a state delta (changed keys), plus
//! envelope stamping ([`Envelope`], [`EnvelopeState`]) for serialized streams.
//! It does not depend on weft; the engine builds `Event`s and front-ends
//! deserialize them from the wire.

pub mod envelope;
pub mod event;

pub use envelope::{Envelope, EnvelopeState};
pub use event::{Content, Event, Part};
