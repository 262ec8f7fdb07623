//! Data types shared by every pipeline stage.

pub mod config;
pub mod record;
pub mod summary;
