/*! Periodic sampling timers.

Each periodic channel gets one timer. A timer does nothing but post
[`Event::Tick`] to the dispatch queue; the first tick comes one full interval
after arming. Dropping the [`TimerHandle`] disarms the timer.
 */

use std::fmt;
use std::fmt::Display;
use std::io;
use std::sync::mpsc;
use std::sync::mpsc::{RecvTimeoutError, Sender};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::event::{Event, EventSender};

type Result<T> = std::result::Result<T, Error>;

/// Errors arming a timer.
#[derive(Debug)]
pub enum Error {
    /// The interval was zero.
    ZeroInterval(u8),
    /// The timer thread could not be started.
    Spawn(io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ZeroInterval(ch) => write!(f, "channel {} timer needs a non-zero interval", ch),
            Error::Spawn(ref e) => write!(f, "could not start timer thread: {}", e),
        }
    }
}

/// Splits a millisecond interval into whole seconds and the sub-second remainder.
pub fn interval_from_millis(millis: u32) -> Duration {
    let secs = u64::from(millis / 1000);
    let msecs = millis % 1000;
    Duration::new(secs, msecs * 1_000_000)
}

/// Creates timers delivering to one event queue.
#[derive(Clone, Debug)]
pub struct TimerManager {
    events: EventSender,
}

impl TimerManager {
    /// Create a timer manager posting to `events`.
    pub fn new(events: EventSender) -> TimerManager {
        TimerManager {
            events,
        }
    }

    /// Arm a timer posting a tick for `channel` every `interval`.
    pub fn arm(&self, channel: u8, interval: Duration) -> Result<TimerHandle> {
        if interval == Duration::from_secs(0) {
            return Err(Error::ZeroInterval(channel));
        }

        let (disarm_tx, disarm_rx) = mpsc::channel::<()>();
        let events = self.events.clone();

        let thread = thread::Builder::new()
            .name(format!("adc-timer-{}", channel))
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match disarm_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            trace!("channel {} timer expired", channel);
                            if events.send(Event::Tick(channel)).is_err() {
                                // nobody is listening anymore
                                break;
                            }

                            deadline += interval;
                            let now = Instant::now();
                            if deadline <= now {
                                deadline = now + interval;
                            }
                        },
                        _ => break,
                    }
                }
            })
            .map_err(Error::Spawn)?;

        debug!("armed {} ms timer for channel {}", interval.as_millis(), channel);

        Ok(TimerHandle {
            channel,
            interval,
            disarm: Some(disarm_tx),
            thread: Some(thread),
        })
    }
}

/// An armed periodic timer.
pub struct TimerHandle {
    channel: u8,
    interval: Duration,
    disarm: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Returns the channel the timer ticks for.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Returns the timer's period.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // Hanging up the disarm channel wakes the timer thread.
        self.disarm.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("channel {} timer thread panicked", self.channel);
            }
        }
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("channel", &self.channel)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;

    #[test]
    fn interval_split() {
        assert_eq!(interval_from_millis(1000), Duration::from_secs(1));
        assert_eq!(interval_from_millis(2500), Duration::from_millis(2500));
        assert_eq!(interval_from_millis(100), Duration::from_millis(100));
        assert_eq!(interval_from_millis(0), Duration::from_secs(0));
    }

    #[test]
    fn zero_interval_rejected() {
        let (tx, _rx) = event::queue();
        let timers = TimerManager::new(tx);
        assert!(matches!(timers.arm(2, Duration::from_secs(0)), Err(Error::ZeroInterval(2))));
    }

    #[test]
    fn no_tick_before_first_interval() {
        let (tx, rx) = event::queue();
        let timers = TimerManager::new(tx);
        let armed_at = Instant::now();
        let _timer = timers.arm(3, Duration::from_millis(300)).unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(150)).is_err());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Event::Tick(3));
        assert!(armed_at.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn ticks_repeat() {
        let (tx, rx) = event::queue();
        let timers = TimerManager::new(tx);
        let _timer = timers.arm(1, Duration::from_millis(20)).unwrap();

        for _ in 0..3 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Event::Tick(1));
        }
    }

    #[test]
    fn independent_timers_interleave() {
        let (tx, rx) = event::queue();
        let timers = TimerManager::new(tx);
        let _t0 = timers.arm(0, Duration::from_millis(10)).unwrap();
        let _t7 = timers.arm(7, Duration::from_millis(15)).unwrap();

        let mut seen = [false; 8];
        let start = Instant::now();
        while !(seen[0] && seen[7]) && start.elapsed() < Duration::from_secs(5) {
            if let Ok(Event::Tick(ch)) = rx.recv_timeout(Duration::from_millis(100)) {
                seen[ch as usize] = true;
            }
        }
        assert!(seen[0] && seen[7]);
    }

    #[test]
    fn dropping_handle_disarms() {
        let (tx, rx) = event::queue();
        let timers = TimerManager::new(tx);
        let timer = timers.arm(4, Duration::from_secs(10)).unwrap();
        assert_eq!(timer.channel(), 4);
        assert_eq!(timer.interval(), Duration::from_secs(10));
        drop(timer);
        drop(timers);

        // Every sender is gone once the thread has exited.
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)), Err(RecvTimeoutError::Disconnected));
    }
}
