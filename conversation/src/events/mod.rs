//! Observer events for story sessions.
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐ emit ┌──────────────┐ mpsc ┌──────────────┐
//! │ Coordinator  │─────▶│ EventEmitter │─────▶│   Observer   │
//! │ (one/session)│      │ (seq, latch) │      │  (transport) │
//! └──────────────┘      └──────────────┘      └──────────────┘
//! ```
//!
//! Events are emitted after the state change they describe, in the order the
//! changes happen. The channel is unbounded so a slow observer never stalls a
//! session or forces batching.

pub mod emitter;
pub mod types;

pub use emitter::{EventEmitter, EventReceiver};
pub use types::{EventKind, StoryEvent};
