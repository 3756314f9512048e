//! Human-readable controller status.

use std::io;
use std::io::Write;

use tracing::warn;

use crate::controller::Controller;
use crate::hw::ads7830::{self, NUM_CHANNELS};

/** Write a status snapshot to `sink`.

Every channel is sampled afresh, whatever its sampling mode. A channel that
cannot be read is shown with a zero sample and the rest are still listed.
Intervals are padded to four digits; longer ones widen their line.

# Examples
```text
ADS7830 Status:
Configuration File: /etc/ads7830.json
Device: /dev/i2c-1
Address: 0x4b
Exclusive: false
Verbose: false
Channels:
	A0: /HW/ADS7830/A0 ------- 128 1.66V
	A1: /HW/ADS7830/A1  100 ms 012 0.16V
	A2: /HW/ADS7830/A2 15000 ms 200 2.59V
```
 */
pub fn render(controller: &mut Controller, sink: &mut dyn Write) -> io::Result<()> {
    writeln!(sink, "ADS7830 Status:")?;
    writeln!(sink, "Configuration File: {}", controller.settings().config_path.display())?;
    writeln!(sink, "Device: {}", controller.adc().bus().device())?;
    writeln!(sink, "Address: 0x{:02x}", controller.adc().address())?;
    writeln!(sink, "Exclusive: {}", controller.adc().bus().is_exclusive())?;
    writeln!(sink, "Verbose: {}", controller.settings().verbose)?;
    writeln!(sink, "Channels:")?;

    for ch in 0..NUM_CHANNELS as u8 {
        let (name, interval) = match controller.channel(ch) {
            Some(channel) => (channel.name().unwrap_or("(unbound)").to_string(), channel.interval()),
            None => ("(unbound)".to_string(), None),
        };

        let raw = controller.read(ch).unwrap_or_else(|e| {
            warn!("status: could not read channel {}: {}", ch, e);
            0
        });
        let volts = ads7830::to_voltage(raw);

        match interval {
            Some(interval) => writeln!(sink, "\tA{}: {} {:4} ms {:03} {:.2}V",
                                       ch, name, interval.as_millis(), raw, volts)?,
            None => writeln!(sink, "\tA{}: {} ------- {:03} {:.2}V",
                             ch, name, raw, volts)?,
        }
    }

    Ok(())
}
