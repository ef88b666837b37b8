//! HTTP and WebSocket surface for the pulse daemon.

pub mod server;
pub mod ws;

pub use server::{start_api_server, AppState};
