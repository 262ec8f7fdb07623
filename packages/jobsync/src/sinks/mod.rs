//! Sink implementations.

#[cfg(feature = "feishu")]
pub mod feishu;

#[cfg(feature = "feishu")]
pub use feishu::{BitableSink, FieldMapping};
