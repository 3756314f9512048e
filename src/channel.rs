/*! The table of analog input channels.

The table always has one slot per converter input. It is filled once from
the configuration by [`ChannelTable::populate`]; afterwards only the
dispatch loop reads it.
 */

use std::convert::TryFrom;
use std::fmt;
use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::hw::ads7830::NUM_CHANNELS;
use crate::timer::{self, TimerHandle, TimerManager};
use crate::varserver::{NotifyKind, VarHandle, VarServer};

/// Sampling mode requested in the configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Mode {
    /// Sample on a timer.
    Timer,
    /// Sample when asked to recalculate.
    Calc,
}

impl TryFrom<&str> for Mode {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "timer" => Ok(Mode::Timer),
            "calc" => Ok(Mode::Calc),
            _ => Err(format!("'{}' is not a sampling mode", s)),
        }
    }
}

/// A channel as described by the configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelDefinition {
    /// Channel index; only 0 through 7 are usable.
    pub index: i64,
    /// Name of the variable to publish to.
    pub var: Option<String>,
    /// Requested sampling mode.
    pub mode: Option<Mode>,
    /// Sampling interval in milliseconds.
    pub interval_ms: Option<u32>,
}

/// How a channel gets sampled.
#[derive(Debug)]
pub enum SamplingMode {
    /// Sampled when its variable is asked to recalculate.
    OnDemand,
    /// Sampled each time its timer expires.
    Periodic(TimerHandle),
}

impl SamplingMode {
    /// Returns the sampling interval of a periodic channel.
    pub fn interval(&self) -> Option<Duration> {
        match self {
            SamplingMode::OnDemand => None,
            SamplingMode::Periodic(ref timer) => Some(timer.interval()),
        }
    }
}

/// One analog input.
#[derive(Debug)]
pub struct Channel {
    index: u8,
    name: Option<String>,
    handle: Option<VarHandle>,
    mode: SamplingMode,
}

impl Channel {
    fn unbound(index: u8) -> Channel {
        Channel {
            index,
            name: None,
            handle: None,
            mode: SamplingMode::OnDemand,
        }
    }

    /// Returns the channel index.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Returns the name of the variable the channel publishes to.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the handle of the bound variable, if it resolved.
    pub fn handle(&self) -> Option<VarHandle> {
        self.handle
    }

    /// Returns the channel's sampling mode.
    pub fn mode(&self) -> &SamplingMode {
        &self.mode
    }

    /// Returns the sampling interval of a periodic channel.
    pub fn interval(&self) -> Option<Duration> {
        self.mode.interval()
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "A{} ({})", self.index, self.name().unwrap_or("unbound"))
    }
}

/// All of the converter's channels, addressed by index.
#[derive(Debug)]
pub struct ChannelTable {
    slots: [Channel; NUM_CHANNELS],
}

impl ChannelTable {
    /// Create a table of unbound, on-demand channels.
    pub fn new() -> ChannelTable {
        ChannelTable {
            slots: [
                Channel::unbound(0), Channel::unbound(1),
                Channel::unbound(2), Channel::unbound(3),
                Channel::unbound(4), Channel::unbound(5),
                Channel::unbound(6), Channel::unbound(7),
            ],
        }
    }

    /** Build the table from channel definitions.

    Each definition binds its variable if the name resolves. A non-zero
    interval makes the channel periodic and arms a timer; otherwise the
    bound variable is subscribed to recalculation requests.
    Definitions with an index outside the table are skipped.
     */
    pub fn populate<'a, T>(definitions: T, vars: &dyn VarServer, timers: &TimerManager) -> ChannelTable
    where
        T: IntoIterator<Item = &'a ChannelDefinition>,
    {
        let mut table = ChannelTable::new();
        let mut defined = [false; NUM_CHANNELS];

        for def in definitions {
            let index = match u8::try_from(def.index) {
                Ok(index) if (index as usize) < NUM_CHANNELS => index,
                _ => {
                    warn!("skipping channel definition with invalid index {}", def.index);
                    continue;
                },
            };

            if defined[index as usize] {
                warn!("channel {} defined more than once; using the last definition", index);
            }
            defined[index as usize] = true;

            table.slots[index as usize] = Self::define(index, def, vars, timers);
        }

        table
    }

    fn define(index: u8, def: &ChannelDefinition, vars: &dyn VarServer, timers: &TimerManager) -> Channel {
        let handle = def.var.as_ref().and_then(|name| {
            let handle = vars.find_by_name(name);
            if handle.is_none() {
                warn!("channel {}: variable '{}' not found", index, name);
            }
            handle
        });

        let interval_ms = def.interval_ms.unwrap_or(0);
        match def.mode {
            Some(Mode::Timer) if interval_ms == 0 =>
                warn!("channel {}: timer mode without an interval; sampling on demand", index),
            Some(Mode::Calc) if interval_ms != 0 =>
                warn!("channel {}: interval given for calc mode; sampling every {} ms", index, interval_ms),
            _ => (),
        }

        let mode = if interval_ms != 0 {
            match timers.arm(index, timer::interval_from_millis(interval_ms)) {
                Ok(timer) => SamplingMode::Periodic(timer),
                Err(e) => {
                    error!("channel {}: {}; sampling on demand instead", index, e);
                    SamplingMode::OnDemand
                },
            }
        } else {
            SamplingMode::OnDemand
        };

        if let SamplingMode::OnDemand = mode {
            match handle {
                Some(handle) => {
                    if let Err(e) = vars.notify(handle, NotifyKind::Calc) {
                        warn!("channel {}: could not subscribe to calc requests: {}", index, e);
                    }
                },
                None => debug!("channel {}: unbound; not subscribing to calc requests", index),
            }
        }

        Channel {
            index,
            name: def.var.clone(),
            handle,
            mode,
        }
    }

    /// Returns the channel at `index`.
    pub fn get(&self, index: u8) -> Option<&Channel> {
        self.slots.get(index as usize)
    }

    /// Returns the index of the channel bound to `handle`.
    pub fn find(&self, handle: VarHandle) -> Option<u8> {
        self.slots.iter()
            .find(|ch| ch.handle == Some(handle))
            .map(|ch| ch.index)
    }

    /// Returns an iterator over all channels in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.slots.iter()
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        ChannelTable::new()
    }
}
