//! Event synchronization for live interview sessions.
//!
//! This crate sits between a realtime agent channel and the UI. It rebuilds
//! streamed tool calls, works out whether the agent is speaking from both the
//! event stream and the remote audio, and holds the interview's completion
//! back until the agent has gone quiet.
//!
//! `SyncSession` is the synchronous core; `runtime` wraps it in a tokio task
//! fed by the Session Lifecycle Manager.

pub mod audio_tap;
pub mod call_buffer;
pub mod completion;
pub mod error;
pub mod event;
pub mod invocation;
pub mod presentation;
pub mod runtime;
pub mod session;
pub mod vad;
pub mod watchdog;

pub use completion::{COMPLETE_INTERVIEW, CompletionReason, CompletionRecord};
pub use event::{InboundEvent, OutboundEvent};
pub use presentation::{Arbitration, PresentationState};
pub use runtime::{EventSink, SessionHandle, SessionInput};
pub use session::{SyncConfig, SyncSession, UiSnapshot};
