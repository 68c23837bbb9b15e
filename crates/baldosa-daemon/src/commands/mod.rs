//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category.

pub mod tiles;
pub mod users;
