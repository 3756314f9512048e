//! Reading the daemon's configuration.

use std::fmt::Debug;
use std::path::PathBuf;

use crate::channel::ChannelDefinition;

pub mod error;
pub mod json;

pub use error::Error;

type Result<T> = std::result::Result<T, error::Error>;

/// Variable subscribed to status print requests unless configured otherwise.
pub const DEFAULT_INFO_VAR: &str = "/HW/ADS7830/INFO";

/// Settings for one converter, as read from a configuration source.
#[derive(Clone, Debug)]
pub struct Config {
    /// Where the configuration came from.
    pub source: PathBuf,
    /// I2C bus device path.
    pub device: String,
    /// Converter address on the bus.
    pub address: u8,
    /// Variable subscribed to status print requests.
    pub info_var: String,
    /// Channel definitions in the order given.
    pub channels: Vec<ChannelDefinition>,
    /// The configuration document, formatted for display.
    pub document: String,
}

/// Configuration reader producing converter settings from an input source.
pub trait ConfigReader: Debug {
    /// Read and validate the configuration.
    fn read(&self) -> Result<Config>;
}
