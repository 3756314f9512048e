//! Process signal handling.

use std::io;
use std::os::raw::c_int;
use std::thread;

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use ads7830d::event::{Event, EventSender};
use ads7830d::varserver::{MemoryVarServer, VarServer};

/** Start the thread that turns signals into events.

SIGINT and SIGTERM request a shutdown. SIGUSR1 requests a status print
through `info_var`.
 */
pub fn install(events: EventSender, vars: MemoryVarServer, info_var: String) -> io::Result<()> {
    let mut signals = Signals::new(&[SIGINT, SIGTERM, SIGUSR1])?;

    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                handle(signal, &events, &vars, &info_var);
            }
        })?;

    Ok(())
}

/// Act on one signal, returning the event posted for it.
pub fn handle(signal: c_int,
              events: &EventSender,
              vars: &MemoryVarServer,
              info_var: &str) -> Option<Event>
{
    match signal {
        SIGUSR1 => {
            let session = vars.find_by_name(info_var)
                .and_then(|handle| vars.request_print(handle));
            match session {
                Some(session) => Some(Event::Print(session)),
                None => {
                    warn!("status print requested but '{}' is not subscribed", info_var);
                    None
                },
            }
        },
        SIGINT | SIGTERM => {
            info!("received signal {}; shutting down", signal);
            match events.send(Event::Shutdown) {
                Ok(()) => Some(Event::Shutdown),
                Err(_) => {
                    warn!("controller already stopped");
                    None
                },
            }
        },
        _ => None,
    }
}
