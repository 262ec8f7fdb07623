//! The ingestion pipeline: normalize → identify/classify → sync, driven by
//! the orchestrator.

pub mod dates;
pub mod identity;
pub mod normalize;
pub mod orchestrator;
pub mod status;
pub mod sync;
pub mod vocab;
