//! DevTools WebSocket transport layer.
//!
//! Internal module handling the single WebSocket connection to a remote
//! browser endpoint: command/response correlation and event routing.

mod connection;

pub use connection::{Connection, EventWatch};
