//! Session core for Bot Monitor.
//!
//! Owns the shared shell, the bounded log history and the viewer fan-out,
//! and wires the process manager's logs and controls into them. The
//! transport layer talks to everything through [`Monitor`].

pub mod control;
pub mod fanout;
pub mod monitor;
pub mod orchestrator;
pub mod shell_session;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use fanout::{FanoutMessage, Subscription};
pub use monitor::{Monitor, MonitorConfig};
