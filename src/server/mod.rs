//! HTTP surface for inspecting and discarding locks.

pub mod locks;
pub mod router;
pub mod services;

pub use locks::{AppState, LockDetail, LockSummary, SharedState};
pub use router::{ServeOptions, build_router, build_state, start_server};
pub use services::Services;
