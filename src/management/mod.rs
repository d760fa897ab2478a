//! Line-oriented TCP interface for inspecting and editing the store

mod command;
mod server;

pub use command::{render_json, render_stats, ManagementCommand, END_MARKER, ERROR_REPLY, HELP_TEXT};
pub use server::ManagementServer;
