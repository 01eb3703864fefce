//! PM2 adapters for the bot monitor.
//!
//! [`control::Pm2Control`] drives the `pm2` CLI to start, stop, restart and
//! describe processes. [`log_tail::LogTailer`] follows the per-process log
//! files PM2 writes and pushes new output into a channel.

pub mod control;
pub mod log_tail;

pub use control::Pm2Control;
pub use log_tail::{LogTailer, TailHandle};
