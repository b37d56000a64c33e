pub mod config;
pub mod error;
pub mod inflight;
pub mod server;
pub mod shutdown;
