//! Drivers for the sampled hardware.

pub mod ads7830;
pub mod bus;

pub use ads7830::ADS7830;
pub use bus::Bus;
