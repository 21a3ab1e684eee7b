//! Daemon startup and the client-side subcommands.

mod lifecycle;

pub use lifecycle::{call, check_status, run_daemon};
