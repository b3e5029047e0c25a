//! This module contains in-memory stand-ins for the server's collaborators: an engine without
//!  reliability, a socket backed by queues, and a handler that records every callback. They are
//!  used for testing the server itself, but they are also exported for application testing.
//!
//! Making test utilities part of the crate's regular (non-#[cfg(test)]) code is the compromise
//!  that allows using them from other crates' tests.

pub mod memory_socket;
pub mod passthrough_engine;
pub mod recording_handler;
