/*! Notifications handled by the dispatch loop.

Timers, the variable server, and signal handlers never act on the
controller directly. They post an [`Event`] and the single dispatch thread
handles it when it comes off the queue.
 */

use std::fmt;
use std::fmt::Display;
use std::sync::mpsc;

use crate::varserver::{NotifyKind, SessionId, VarHandle};

/// Sending side of the event queue.
pub type EventSender = mpsc::Sender<Event>;
/// Receiving side of the event queue.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Something the controller must act on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// A periodic channel's timer expired.
    Tick(u8),
    /// A peer asked for a variable to be recalculated.
    Calc(VarHandle),
    /// A peer asked for the status to be printed.
    Print(SessionId),
    /// A notification class the controller does not handle.
    Unsupported(NotifyKind, VarHandle),
    /// Stop the dispatch loop.
    Shutdown,
}

impl Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Event::Tick(ch) => write!(f, "timer expiry (channel {})", ch),
            Event::Calc(handle) => write!(f, "calc request ({})", handle),
            Event::Print(session) => write!(f, "print request ({})", session),
            Event::Unsupported(kind, handle) => write!(f, "{} notification ({})", kind, handle),
            Event::Shutdown => write!(f, "shutdown request"),
        }
    }
}

/// Create an empty event queue.
pub fn queue() -> (EventSender, EventReceiver) {
    mpsc::channel()
}
