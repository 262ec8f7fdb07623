// HTTP server setup (Axum health endpoint)
pub mod app;
pub mod routes;

pub use app::*;
