//! Support for the TI ADS7830 8-bit, 8-channel ADC.

use super::bus::{Bus, Error, Result};

/// Number of analog inputs on the chip.
pub const NUM_CHANNELS: usize = 8;

/// Full-scale voltage of a sample.
pub const REFERENCE_VOLTS: f64 = 3.3;

/// Channel-select field for each logical channel (single-ended inputs).
const CHANNEL_SELECT: [u8; NUM_CHANNELS] = [0, 4, 1, 5, 2, 6, 3, 7];

/// Command byte fields.
mod command {
    /// Single-ended (SD) input selection.
    pub const SINGLE_ENDED: u8 = 0x80;
    /// Power-down field (PD1:PD0 = 01): A/D converter on, internal reference off.
    pub const AD_ON_REF_OFF: u8 = 0x04;
    /// Position of the channel-select field.
    pub const SELECT_SHIFT: u8 = 4;
}

/// Returns the command byte selecting `channel` as a single-ended input.
pub fn command_byte(channel: u8) -> Result<u8> {
    let select = CHANNEL_SELECT.get(channel as usize)
        .ok_or(Error::NoSuchChannel(channel))?;

    Ok(command::SINGLE_ENDED | command::AD_ON_REF_OFF | (select << command::SELECT_SHIFT))
}

/// Scale a raw sample to volts.
pub fn to_voltage(raw: u8) -> f64 {
    f64::from(raw) / 255.0 * REFERENCE_VOLTS
}

/// Driver for the ADS7830.
#[derive(Debug)]
pub struct ADS7830 {
    address: u8,
    bus: Bus,
}

impl ADS7830 {
    /// Create a new driver for the chip at `address` on `bus`.
    pub fn new(bus: Bus, address: u8) -> ADS7830 {
        ADS7830 {
            address,
            bus,
        }
    }

    /// Returns the chip's bus address.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Returns the bus the chip is on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /** Sample a channel.

    Selects the channel with one command byte and reads back one conversion result.
    A channel outside [0, 7] is rejected before any bus traffic.
     */
    pub fn read(&mut self, channel: u8) -> Result<u8> {
        let cmd = command_byte(channel)?;
        let address = u16::from(self.address);

        self.bus.with_connection(|conn| {
            conn.set_address(address)?;

            let written = conn.write(&[cmd])?;
            if written != 1 {
                return Err(Error::Incomplete { expected: 1, actual: written });
            }

            let mut out = [0; 1];
            let read = conn.read(&mut out)?;
            if read != 1 {
                return Err(Error::Incomplete { expected: 1, actual: read });
            }

            Ok(out[0])
        })
    }
}
