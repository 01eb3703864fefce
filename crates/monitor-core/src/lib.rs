//! Domain types and pure logic for the bot monitor.
//!
//! Holds the log event model, the bounded history buffer, the path-marker
//! convention used to track the shared shell's working directory, the
//! process-control capability contract, settings, and error types. Nothing
//! in this crate spawns tasks or touches the network.

pub mod decode;
pub mod error;
pub mod events;
pub mod history;
pub mod marker;
pub mod process;
pub mod settings;
pub mod time_utils;

pub use error::{MonitorError, Result};
pub use events::{LogEvent, LogKind};
pub use history::HistoryBuffer;
