//! Tayori server: real-time presence and message delivery over WebSocket.
//!
//! Layering follows the dependency rule `ui -> usecase -> domain <- infrastructure`:
//!
//! - `domain`: value objects, entities and the traits the outer layers implement
//! - `usecase`: connect / disconnect, presence broadcast, send pipeline, rooms, heartbeat
//! - `infrastructure`: sharded connection registry, room router, dedup cache, WebSocket pusher
//! - `ui`: axum handlers and the server runner
//! - `config`: runtime settings assembled by the binary

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;
