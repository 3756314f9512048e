/*! Interface to the variable server.

Readings are published through named variables held by a variable server.
The controller only needs the narrow API in [`VarServer`]: resolving names,
setting values, subscribing to notifications, and print sessions.

[`MemoryVarServer`] keeps the variables in this process. Peers act through
its `request_*` methods, which post [`Event`]s to the controller's queue only
for handles that subscribed to that notification class.
 */

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fmt::{Debug, Display};
use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::event::{Event, EventSender};

/// Variable server result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Handle to a variable held by the server.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct VarHandle(u32);

impl Display for VarHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "var #{}", self.0)
    }
}

/// Identifies a peer's print request.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct SessionId(u32);

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "session #{}", self.0)
    }
}

/// Notification classes a variable can be subscribed to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NotifyKind {
    /// Recalculate the value on request.
    Calc,
    /// Print the value on request.
    Print,
    /// The value was changed.
    Modified,
    /// Validate a proposed value.
    Validate,
}

impl Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NotifyKind::Calc => write!(f, "calc"),
            NotifyKind::Print => write!(f, "print"),
            NotifyKind::Modified => write!(f, "modified"),
            NotifyKind::Validate => write!(f, "validate"),
        }
    }
}

/// Variable server errors.
#[derive(Debug)]
pub enum Error {
    /// The connection to the server was closed.
    Closed,
    /// The handle does not refer to a variable.
    NoSuchVariable(VarHandle),
    /// The session is not open.
    NoSuchSession(SessionId),
    /// Writing print output failed.
    IO(io::Error),
    /// The server's state was poisoned by a panicking thread.
    Poisoned,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            Closed => write!(f, "variable server connection closed"),
            NoSuchVariable(handle) => write!(f, "{} does not exist", handle),
            NoSuchSession(session) => write!(f, "{} is not open", session),
            IO(ref e) => write!(f, "print session I/O error: {}", e),
            Poisoned => write!(f, "variable server state poisoned"),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IO(e)
    }
}

/// Operations the controller needs from the variable server.
pub trait VarServer: Debug {
    /// Resolve a variable name to a handle.
    fn find_by_name(&self, name: &str) -> Option<VarHandle>;

    /// Set a variable's value.
    fn set(&self, handle: VarHandle, value: u16) -> Result<()>;

    /// Subscribe to a class of notifications for a variable.
    fn notify(&self, handle: VarHandle, kind: NotifyKind) -> Result<()>;

    /// Open the output side of a peer's print request.
    fn open_print_session(&self, session: SessionId) -> Result<Box<dyn Write>>;

    /// Finish a print session, handing the output to the peer.
    fn close_print_session(&self, session: SessionId, sink: Box<dyn Write>) -> Result<()>;

    /// Release the connection to the server.
    fn close(&self);
}

/// Where finished print sessions go.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PrintTarget {
    /// Kept for retrieval with [`MemoryVarServer::take_output`].
    Capture,
    /// Written to standard output.
    Stdout,
}

#[derive(Debug)]
struct Variable {
    name: String,
    value: Option<u16>,
    sets: usize,
    subscriptions: HashSet<NotifyKind>,
}

#[derive(Debug)]
struct Registry {
    names: HashMap<String, VarHandle>,
    vars: Vec<Variable>,
    sessions: HashMap<SessionId, Arc<Mutex<Vec<u8>>>>,
    outputs: HashMap<SessionId, String>,
    next_session: u32,
    print_target: PrintTarget,
    closed: bool,
}

impl Registry {
    fn variable(&self, handle: VarHandle) -> Result<&Variable> {
        self.vars.get(handle.0 as usize)
            .ok_or(Error::NoSuchVariable(handle))
    }

    fn variable_mut(&mut self, handle: VarHandle) -> Result<&mut Variable> {
        self.vars.get_mut(handle.0 as usize)
            .ok_or(Error::NoSuchVariable(handle))
    }

    fn open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// Writer collecting one print session's output.
struct SessionBuffer {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for SessionBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut buffer = self.buffer.lock()
            .map_err(|_e| io::Error::new(io::ErrorKind::Other, "print session poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Variable server kept in this process.
#[derive(Clone)]
pub struct MemoryVarServer {
    registry: Arc<Mutex<Registry>>,
    events: EventSender,
}

impl MemoryVarServer {
    /// Create an empty server delivering notifications to `events`.
    pub fn new(events: EventSender) -> MemoryVarServer {
        MemoryVarServer {
            registry: Arc::new(Mutex::new(Registry {
                names: HashMap::new(),
                vars: Vec::new(),
                sessions: HashMap::new(),
                outputs: HashMap::new(),
                next_session: 0,
                print_target: PrintTarget::Capture,
                closed: false,
            })),
            events,
        }
    }

    /// Send finished print sessions to standard output instead of keeping them.
    pub fn print_to_stdout(self) -> Self {
        if let Ok(mut registry) = self.registry.lock() {
            registry.print_target = PrintTarget::Stdout;
        }
        self
    }

    /// Create a variable, returning the existing handle if the name is taken.
    pub fn declare(&self, name: &str) -> Result<VarHandle> {
        let mut registry = self.registry()?;
        registry.open()?;
        if let Some(handle) = registry.names.get(name) {
            return Ok(*handle);
        }

        let handle = VarHandle(registry.vars.len() as u32);
        registry.vars.push(Variable {
            name: name.to_string(),
            value: None,
            sets: 0,
            subscriptions: HashSet::new(),
        });
        registry.names.insert(name.to_string(), handle);

        Ok(handle)
    }

    /// Returns a variable's current value.
    pub fn value(&self, handle: VarHandle) -> Option<u16> {
        let registry = self.registry().ok()?;
        registry.variable(handle).ok()?.value
    }

    /// Returns the number of times a variable has been set.
    pub fn set_count(&self, handle: VarHandle) -> usize {
        match self.registry() {
            Ok(registry) => registry.variable(handle).map(|v| v.sets).unwrap_or(0),
            Err(_) => 0,
        }
    }

    /// Returns true if the variable is subscribed to `kind` notifications.
    pub fn is_subscribed(&self, handle: VarHandle, kind: NotifyKind) -> bool {
        match self.registry() {
            Ok(registry) => registry.variable(handle)
                .map(|v| v.subscriptions.contains(&kind))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Returns true once the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.registry().map(|r| r.closed).unwrap_or(true)
    }

    /** Ask for a variable to be recalculated.

    Returns true if a subscriber was notified.
     */
    pub fn request_calc(&self, handle: VarHandle) -> bool {
        self.request(NotifyKind::Calc, handle).is_some()
    }

    /** Ask for a variable to be printed.

    Returns the session the output will be delivered under, if a subscriber was notified.
     */
    pub fn request_print(&self, handle: VarHandle) -> Option<SessionId> {
        match self.request(NotifyKind::Print, handle)? {
            Event::Print(session) => Some(session),
            _ => None,
        }
    }

    /// Deliver a notification of any class, returning the event posted.
    pub fn request(&self, kind: NotifyKind, handle: VarHandle) -> Option<Event> {
        let event = {
            let mut registry = self.registry().ok()?;
            registry.open().ok()?;
            if !registry.variable(handle).ok()?.subscriptions.contains(&kind) {
                debug!("no subscriber for {} notification on {}", kind, handle);
                return None;
            }

            match kind {
                NotifyKind::Calc => Event::Calc(handle),
                NotifyKind::Print => {
                    let session = SessionId(registry.next_session);
                    registry.next_session += 1;
                    Event::Print(session)
                },
                other => Event::Unsupported(other, handle),
            }
        };

        self.events.send(event).ok()?;
        Some(event)
    }

    /// Take the output of a finished print session.
    pub fn take_output(&self, session: SessionId) -> Option<String> {
        self.registry().ok()?.outputs.remove(&session)
    }

    fn registry(&self) -> Result<MutexGuard<'_, Registry>> {
        self.registry.lock()
            .map_err(|_e| Error::Poisoned)
    }
}

impl VarServer for MemoryVarServer {
    fn find_by_name(&self, name: &str) -> Option<VarHandle> {
        let registry = self.registry().ok()?;
        registry.open().ok()?;
        registry.names.get(name).copied()
    }

    fn set(&self, handle: VarHandle, value: u16) -> Result<()> {
        let mut registry = self.registry()?;
        registry.open()?;
        let var = registry.variable_mut(handle)?;
        var.value = Some(value);
        var.sets += 1;

        Ok(())
    }

    fn notify(&self, handle: VarHandle, kind: NotifyKind) -> Result<()> {
        let mut registry = self.registry()?;
        registry.open()?;
        let var = registry.variable_mut(handle)?;
        var.subscriptions.insert(kind);
        debug!("subscribed '{}' to {} notifications", var.name, kind);

        Ok(())
    }

    fn open_print_session(&self, session: SessionId) -> Result<Box<dyn Write>> {
        let mut registry = self.registry()?;
        registry.open()?;
        let buffer = Arc::new(Mutex::new(Vec::new()));
        registry.sessions.insert(session, Arc::clone(&buffer));

        Ok(Box::new(SessionBuffer { buffer }))
    }

    fn close_print_session(&self, session: SessionId, mut sink: Box<dyn Write>) -> Result<()> {
        sink.flush()?;
        drop(sink);

        let mut registry = self.registry()?;
        let buffer = registry.sessions.remove(&session)
            .ok_or(Error::NoSuchSession(session))?;
        let bytes = buffer.lock().map_err(|_e| Error::Poisoned)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        drop(bytes);

        match registry.print_target {
            PrintTarget::Capture => {
                registry.outputs.insert(session, text);
            },
            PrintTarget::Stdout => {
                let stdout = io::stdout();
                let mut out = stdout.lock();
                out.write_all(text.as_bytes())?;
                out.flush()?;
            },
        }

        Ok(())
    }

    fn close(&self) {
        match self.registry() {
            Ok(mut registry) if !registry.closed => {
                registry.closed = true;
                registry.sessions.clear();
                info!("variable server connection closed");
            },
            Ok(_) => (),
            Err(e) => warn!("could not close variable server: {}", e),
        }
    }
}

impl Debug for MemoryVarServer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoryVarServer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    #[test]
    fn names_resolve_to_declared_handles() {
        let (tx, _rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let a0 = vars.declare("/HW/ADS7830/A0").unwrap();
        let a1 = vars.declare("/HW/ADS7830/A1").unwrap();

        assert_ne!(a0, a1);
        assert_eq!(vars.declare("/HW/ADS7830/A0").unwrap(), a0);
        assert_eq!(vars.find_by_name("/HW/ADS7830/A1"), Some(a1));
        assert_eq!(vars.find_by_name("/HW/ADS7830/A9"), None);
    }

    #[test]
    fn set_updates_value() {
        let (tx, _rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let a0 = vars.declare("/HW/ADS7830/A0").unwrap();

        assert_eq!(vars.value(a0), None);
        vars.set(a0, 200).unwrap();
        vars.set(a0, 201).unwrap();
        assert_eq!(vars.value(a0), Some(201));
        assert_eq!(vars.set_count(a0), 2);
        assert!(matches!(vars.set(VarHandle(42), 1), Err(Error::NoSuchVariable(_))));
    }

    #[test]
    fn requests_reach_only_subscribers() {
        let (tx, rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let a0 = vars.declare("/HW/ADS7830/A0").unwrap();
        let info = vars.declare("/HW/ADS7830/INFO").unwrap();

        assert!(!vars.request_calc(a0));
        assert!(vars.request_print(info).is_none());
        assert!(rx.try_recv().is_err());

        vars.notify(a0, NotifyKind::Calc).unwrap();
        vars.notify(info, NotifyKind::Print).unwrap();
        assert!(vars.request_calc(a0));
        assert_eq!(rx.try_recv().unwrap(), Event::Calc(a0));

        let session = vars.request_print(info).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::Print(session));
        assert!(vars.request_print(a0).is_none());
    }

    #[test]
    fn other_notification_classes_are_forwarded() {
        let (tx, rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let a0 = vars.declare("/HW/ADS7830/A0").unwrap();
        vars.notify(a0, NotifyKind::Modified).unwrap();

        assert!(vars.request(NotifyKind::Modified, a0).is_some());
        assert_eq!(rx.try_recv().unwrap(), Event::Unsupported(NotifyKind::Modified, a0));
    }

    #[test]
    fn print_session_output_is_captured() {
        let (tx, _rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let info = vars.declare("/HW/ADS7830/INFO").unwrap();
        vars.notify(info, NotifyKind::Print).unwrap();
        let session = vars.request_print(info).unwrap();

        let mut sink = vars.open_print_session(session).unwrap();
        writeln!(sink, "hello").unwrap();
        vars.close_print_session(session, sink).unwrap();

        assert_eq!(vars.take_output(session).as_deref(), Some("hello\n"));
        assert_eq!(vars.take_output(session), None);
    }

    #[test]
    fn closed_server_rejects_operations() {
        let (tx, _rx) = event::queue();
        let vars = MemoryVarServer::new(tx);
        let a0 = vars.declare("/HW/ADS7830/A0").unwrap();
        vars.notify(a0, NotifyKind::Calc).unwrap();

        vars.close();
        assert!(vars.is_closed());
        assert!(matches!(vars.set(a0, 1), Err(Error::Closed)));
        assert_eq!(vars.find_by_name("/HW/ADS7830/A0"), None);
        assert!(!vars.request_calc(a0));
    }
}
