//! Code shared between the Tayori server and client.
//!
//! - `protocol`: WebSocket frames exchanged by both sides
//! - `logger`: tracing subscriber setup for the binaries
//! - `time`: wall-clock helpers with a clock abstraction for tests

pub mod logger;
pub mod protocol;
pub mod time;
