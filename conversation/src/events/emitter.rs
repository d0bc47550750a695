//! Per-session event emitter.
//!
//! The emitter owns the only sender of a session's observer channel and
//! stamps each event with the next sequence number. Once a terminal event
//! (`completed` or `failed`) is sent the emitter latches closed and drops
//! anything that follows.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::{EventKind, StoryEvent};
use crate::session::SessionId;

/// Receiving half of a session's observer channel.
pub type EventReceiver = mpsc::UnboundedReceiver<StoryEvent>;

/// Ordered, single-producer event emitter for one session.
#[derive(Debug)]
pub struct EventEmitter {
    session_id: SessionId,
    sender: mpsc::UnboundedSender<StoryEvent>,
    next_seq: u64,
    closed: bool,
}

impl EventEmitter {
    /// Create an emitter and its observer receiver.
    pub fn channel(session_id: SessionId) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                session_id,
                sender,
                next_seq: 1,
                closed: false,
            },
            receiver,
        )
    }

    /// Emit one event. Returns false if it was dropped after a terminal event.
    ///
    /// A departed observer does not stop the session; the event is logged and
    /// still consumes its sequence number.
    pub fn emit(&mut self, kind: EventKind) -> bool {
        if self.closed {
            debug!(
                session_id = %self.session_id,
                event_type = kind.event_type(),
                "dropping event after terminal event"
            );
            return false;
        }
        let terminal = kind.is_terminal();
        let event = StoryEvent {
            seq: self.next_seq,
            session_id: self.session_id,
            timestamp: Utc::now(),
            kind,
        };
        self.next_seq += 1;
        debug!(
            session_id = %self.session_id,
            seq = event.seq,
            event_type = event.event_type(),
            "emit"
        );
        if self.sender.send(event).is_err() {
            debug!(session_id = %self.session_id, "observer channel closed");
        }
        if terminal {
            self.closed = true;
        }
        true
    }

    /// Whether a terminal event has been emitted.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.next_seq - 1
    }
}
