//! WebSocket Session Management
//!
//! This module contains the logic for running a voice interview over a
//! browser WebSocket. It is structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `provider`: Runs the upstream realtime agent connection and its sync session.

pub mod protocol;
mod provider;
pub mod session;

pub use session::ws_handler;
