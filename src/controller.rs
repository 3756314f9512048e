/*! The sampling controller and its dispatch loop.

The controller owns the converter, the channel table, and the connection to
the variable server. [`Controller::run`] takes one [`Event`] at a time off
the queue and handles it to completion before waiting again, so nothing in
here needs locking.
 */

use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::channel::{Channel, ChannelTable};
use crate::event::{Event, EventReceiver};
use crate::hw::ADS7830;
use crate::hw::bus;
use crate::status;
use crate::varserver;
use crate::varserver::{NotifyKind, SessionId, VarHandle, VarServer};

type Result<T> = std::result::Result<T, DispatchError>;

/// Reasons an event could not be handled.
#[derive(Debug)]
pub enum DispatchError {
    /// No channel has the given index.
    NoChannel(u8),
    /// No channel is bound to the given variable.
    NoVariable(VarHandle),
    /// No variable has the given name.
    NoName(String),
    /// The channel is not bound to a variable.
    Unbound(u8),
    /// The notification class is not handled.
    NotSupported(NotifyKind),
    /// Reading the converter failed.
    Bus(bus::Error),
    /// The variable server refused a request.
    VarServer(varserver::Error),
    /// Writing status output failed.
    IO(io::Error),
}

impl DispatchError {
    /// Returns true for events that named something that does not exist.
    pub fn is_not_found(&self) -> bool {
        use DispatchError::*;
        matches!(self, NoChannel(_) | NoVariable(_) | NoName(_))
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use DispatchError::*;
        match self {
            Bus(ref e) => Some(e),
            VarServer(ref e) => Some(e),
            IO(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DispatchError::*;
        match self {
            NoChannel(ch) => write!(f, "channel {} not found", ch),
            NoVariable(handle) => write!(f, "channel for {} not found", handle),
            NoName(ref name) => write!(f, "variable '{}' not found", name),
            Unbound(ch) => write!(f, "channel {} is not bound to a variable", ch),
            NotSupported(kind) => write!(f, "{} notifications not supported", kind),
            Bus(ref e) => write!(f, "ADC read failed: {}", e),
            VarServer(ref e) => write!(f, "variable server error: {}", e),
            IO(ref e) => write!(f, "status output failed: {}", e),
        }
    }
}

impl From<bus::Error> for DispatchError {
    fn from(e: bus::Error) -> Self {
        match e {
            bus::Error::NoSuchChannel(ch) => DispatchError::NoChannel(ch),
            e => DispatchError::Bus(e),
        }
    }
}

impl From<varserver::Error> for DispatchError {
    fn from(e: varserver::Error) -> Self {
        DispatchError::VarServer(e)
    }
}

impl From<io::Error> for DispatchError {
    fn from(e: io::Error) -> Self {
        DispatchError::IO(e)
    }
}

/// Settings shown in the status output.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Configuration file the settings came from.
    pub config_path: PathBuf,
    /// Whether verbose output was requested.
    pub verbose: bool,
}

/// Controller state for one converter.
#[derive(Debug)]
pub struct Controller {
    settings: Settings,
    adc: ADS7830,
    vars: Box<dyn VarServer>,
    channels: ChannelTable,
    events: EventReceiver,
    running: bool,
}

impl Controller {
    /// Create a controller handling events from `events`.
    pub fn new(settings: Settings,
               adc: ADS7830,
               vars: Box<dyn VarServer>,
               channels: ChannelTable,
               events: EventReceiver) -> Controller
    {
        Controller {
            settings,
            adc,
            vars,
            channels,
            events,
            running: false,
        }
    }

    /// Returns the controller's settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns the converter.
    pub fn adc(&self) -> &ADS7830 {
        &self.adc
    }

    /// Returns the channel at `index`.
    pub fn channel(&self, index: u8) -> Option<&Channel> {
        self.channels.get(index)
    }

    /// Returns true while the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Subscribe the named variable to status print requests.
    pub fn subscribe_status(&self, name: &str) -> Result<VarHandle> {
        let handle = self.vars.find_by_name(name)
            .ok_or_else(|| DispatchError::NoName(name.to_string()))?;
        self.vars.notify(handle, NotifyKind::Print)?;
        info!("status available through '{}'", name);

        Ok(handle)
    }

    /// Handle events until asked to shut down.
    pub fn run(&mut self) {
        self.running = true;
        info!("controller running");

        while self.running {
            let event = match self.events.recv() {
                Ok(event) => event,
                Err(_) => {
                    warn!("event sources are gone; stopping");
                    break;
                },
            };

            if let Err(e) = self.handle_event(event) {
                report(event, &e);
            }
        }

        self.running = false;
        info!("controller stopped");
    }

    /// Handle a single event.
    pub fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Tick(ch) => self.sample_channel(ch),
            Event::Calc(handle) => {
                let ch = self.find_channel(handle)?;
                self.sample_channel(ch)
            },
            Event::Print(session) => self.print_status(session),
            Event::Unsupported(kind, _handle) => Err(DispatchError::NotSupported(kind)),
            Event::Shutdown => {
                info!("shutdown requested");
                self.running = false;
                Ok(())
            },
        }
    }

    /// Returns the index of the channel bound to `handle`.
    pub fn find_channel(&self, handle: VarHandle) -> Result<u8> {
        self.channels.find(handle)
            .ok_or(DispatchError::NoVariable(handle))
    }

    /// Read a channel and publish the sample to its variable.
    pub fn sample_channel(&mut self, ch: u8) -> Result<()> {
        let handle = self.channels.get(ch)
            .ok_or(DispatchError::NoChannel(ch))?
            .handle()
            .ok_or(DispatchError::Unbound(ch))?;

        let raw = self.adc.read(ch)?;
        self.vars.set(handle, u16::from(raw))?;
        debug!("A{} = {}", ch, raw);

        Ok(())
    }

    /// Read a channel without publishing it.
    pub fn read(&mut self, ch: u8) -> bus::Result<u8> {
        self.adc.read(ch)
    }

    fn print_status(&mut self, session: SessionId) -> Result<()> {
        let mut sink = self.vars.open_print_session(session)?;
        let rendered = status::render(self, sink.as_mut());
        self.vars.close_print_session(session, sink)?;

        rendered.map_err(DispatchError::IO)
    }
}

/// Log a failed event at a level matching how unusual the failure is.
fn report(event: Event, e: &DispatchError) {
    match e {
        DispatchError::Unbound(_) => debug!("{}: {}", event, e),
        DispatchError::NotSupported(_) => warn!("{}: {}", event, e),
        e if e.is_not_found() => warn!("{}: {}", event, e),
        _ => error!("{}: {}", event, e),
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.vars.close();
    }
}
