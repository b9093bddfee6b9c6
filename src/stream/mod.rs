//! Capture of long-lived streaming connections.

pub mod connector;
pub mod session;

pub use connector::{pump, run_stream, shutdown_signal};
pub use session::{Handshake, StreamConfig, StreamSession, StreamStats};
