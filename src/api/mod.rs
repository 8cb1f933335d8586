//! Operational HTTP surface; does not serve feeds

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::{AppState, Probe};
