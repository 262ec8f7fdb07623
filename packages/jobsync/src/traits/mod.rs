//! Seams between the pipeline and the outside world.
//!
//! Source adapters produce raw records, the sink receives writes, and the
//! state store remembers what has already been synced.

pub mod sink;
pub mod source;
pub mod store;
