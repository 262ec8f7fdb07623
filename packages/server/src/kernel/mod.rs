// Pipeline wiring and scheduled tasks
pub mod deps;
pub mod scheduled_tasks;

pub use deps::*;
pub use scheduled_tasks::*;
