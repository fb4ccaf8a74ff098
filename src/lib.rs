pub mod config;
pub mod errors;
pub mod events;
pub mod locking;
pub mod logging;
pub mod recovery;
pub mod server;
pub mod vcs;
