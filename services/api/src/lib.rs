//! Interview API Library Crate
//!
//! This library contains the web service around the interview sync layer:
//! configuration, application state, routing, and the WebSocket bridge
//! between the browser and the realtime agent. The `api` binary is a thin
//! wrapper around this library.

pub mod audio_utils;
pub mod config;
pub mod router;
pub mod state;
pub mod ws;
