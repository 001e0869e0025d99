//! Command implementations.
//!
//! Each subcommand is implemented in its own module. Commands that talk to
//! the pen split into a `cmd_*` entry point, which resolves and opens the
//! device, and a helper generic over the session's channels.

pub(crate) mod completions;
pub(crate) mod delete;
pub(crate) mod devices;
pub(crate) mod download;
pub(crate) mod info;
