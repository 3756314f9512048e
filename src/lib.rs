/*! Sampling daemon for the TI ADS7830 8-channel ADC.

Each of the converter's channels is published through a named variable on a
variable server. Channels are sampled either on a timer or when a peer asks
for the variable to be recalculated; peers can also ask for a status
printout.

The pieces fit together as follows:

- [`input`] reads the configuration,
- [`channel::ChannelTable::populate`] binds channels to variables and arms
  [`timer`]s,
- [`controller::Controller::run`] waits on the [`event`] queue and samples
  channels through [`hw`],
- [`status::render`] formats the status printout.

The `ads7830d` binary serves its variables from a
[`varserver::MemoryVarServer`] inside its own process. Other processes cannot
read the published values or ask for recalculation, so on-demand channels are
only sampled for the status printout; send the daemon SIGUSR1 to print it.
Talking to an external variable server means implementing
[`varserver::VarServer`] for it.
 */

#![warn(missing_docs)]

pub mod channel;
pub mod controller;
pub mod event;
pub mod hw;
pub mod input;
pub mod logging;
pub mod status;
pub mod timer;
pub mod varserver;
