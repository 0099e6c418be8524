//! Daemon side: Unix-socket control plane plus the frame pipeline thread.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

pub use pipeline::replay;
pub use server::{client_request, run_daemon};
