/*! Access to the I2C bus the converter is attached to.

A [`Bus`] hides whether the daemon holds the bus device open for its whole
lifetime or opens it for each transaction. Callers only ever see
[`Bus::with_connection`].
 */

use std::fmt;
use std::fmt::Display;
use std::path::Path;

use rppal::i2c;
use rppal::i2c::I2c;

/// Bus access result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Produces a fresh connection to the bus.
pub type Opener = Box<dyn Fn() -> Result<Box<dyn Transport>>>;

/// Errors from talking to a device on the bus.
#[derive(Debug)]
pub enum Error {
    /// Device path does not name an I2C bus.
    InvalidDevice(String),
    /// Opening the bus device failed.
    Open(i2c::Error),
    /// Selecting the target address failed.
    Address(i2c::Error),
    /// Writing to the target failed.
    Write(i2c::Error),
    /// Reading from the target failed.
    Read(i2c::Error),
    /// Fewer bytes were moved than the transaction needed.
    Incomplete {
        /// Bytes the transaction needed.
        expected: usize,
        /// Bytes actually transferred.
        actual: usize,
    },
    /// Channel index outside the converter's inputs.
    NoSuchChannel(u8),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        use Error::*;
        match self {
            Open(ref e) | Address(ref e) | Write(ref e) | Read(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            InvalidDevice(ref path) => write!(f, "'{}' is not an I2C bus device", path),
            Open(ref e) => write!(f, "could not open I2C bus: {}", e),
            Address(ref e) => write!(f, "failed to set peripheral address: {}", e),
            Write(ref e) => write!(f, "failed to write command: {}", e),
            Read(ref e) => write!(f, "failed to read sample: {}", e),
            Incomplete { expected, actual } =>
                write!(f, "short transfer ({} of {} bytes)", actual, expected),
            NoSuchChannel(ch) => write!(f, "channel {} not found", ch),
        }
    }
}

/// One open connection to the bus.
pub trait Transport {
    /// Direct subsequent transfers at the peripheral with the given address.
    fn set_address(&mut self, address: u16) -> Result<()>;

    /// Write bytes to the selected peripheral.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Read bytes from the selected peripheral.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl Transport for I2c {
    fn set_address(&mut self, address: u16) -> Result<()> {
        self.set_slave_address(address)
            .map_err(Error::Address)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        I2c::write(self, buf)
            .map_err(Error::Write)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        I2c::read(self, buf)
            .map_err(Error::Read)
    }
}

/// Returns the bus number of a `/dev/i2c-N` device path.
pub fn bus_number(device: &str) -> Result<u8> {
    Path::new(device)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("i2c-"))
        .and_then(|num| num.parse::<u8>().ok())
        .ok_or_else(|| Error::InvalidDevice(device.to_string()))
}

/// The bus, held either for the daemon's lifetime or per transaction.
pub struct Bus {
    device: String,
    opener: Opener,
    held: Option<Box<dyn Transport>>,
}

impl Bus {
    /** Set up access to a Linux I2C bus device.

    With `exclusive` set the device is opened right away and held until the
    `Bus` is dropped, so an unavailable bus is reported here.
    Otherwise every transaction opens and closes the device.
     */
    pub fn open(device: &str, exclusive: bool) -> Result<Bus> {
        let bus_no = bus_number(device)?;
        let opener: Opener = Box::new(move || {
            let i2c = I2c::with_bus(bus_no).map_err(Error::Open)?;
            Ok(Box::new(i2c) as Box<dyn Transport>)
        });

        Bus::with_opener(device, exclusive, opener)
    }

    /// Set up access to a bus using the given way of opening it.
    pub fn with_opener(device: &str, exclusive: bool, opener: Opener) -> Result<Bus> {
        let held = if exclusive {
            Some(opener()?)
        } else {
            None
        };

        Ok(Bus {
            device: device.to_string(),
            opener,
            held,
        })
    }

    /// Returns the bus device path.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns true if the connection is held open between transactions.
    pub fn is_exclusive(&self) -> bool {
        self.held.is_some()
    }

    /// Run `op` against a connection to the bus.
    ///
    /// A connection opened for this call is closed before returning.
    pub fn with_connection<F, T>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Transport) -> Result<T>
    {
        match self.held {
            Some(ref mut conn) => op(conn.as_mut()),
            None => {
                let mut conn = (self.opener)()?;
                op(conn.as_mut())
            },
        }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bus")
            .field("device", &self.device)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

/// Scriptable stand-in for the bus, for tests.
#[cfg(test)]
pub mod mock {
    use std::cell::RefCell;
    use std::collections::{HashMap, HashSet};
    use std::io;
    use std::rc::Rc;

    use rppal::i2c;

    use super::{Bus, Error, Opener, Result, Transport};

    /// A command written to a peripheral.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Transaction {
        /// Peripheral the command went to.
        pub address: u16,
        /// The command byte.
        pub command: u8,
    }

    #[derive(Debug, Default)]
    struct State {
        opens: usize,
        fail_open: bool,
        fail_address: bool,
        fail_write: bool,
        short_write: bool,
        short_read: bool,
        transactions: Vec<Transaction>,
        values: HashMap<u8, u8>,
        failing: HashSet<u8>,
    }

    /// Shared handle onto a simulated bus.
    #[derive(Clone, Debug, Default)]
    pub struct MockBus {
        state: Rc<RefCell<State>>,
    }

    impl MockBus {
        /// Create a bus answering every read with zero.
        pub fn new() -> MockBus {
            MockBus::default()
        }

        /// Answer `command` with `value`.
        pub fn respond(&self, command: u8, value: u8) {
            self.state.borrow_mut().values.insert(command, value);
        }

        /// Make reads following `command` fail.
        pub fn fail_on(&self, command: u8) {
            self.state.borrow_mut().failing.insert(command);
        }

        /// Make opening the bus fail.
        pub fn fail_open(&self) {
            self.state.borrow_mut().fail_open = true;
        }

        /// Make selecting the peripheral fail.
        pub fn fail_address(&self) {
            self.state.borrow_mut().fail_address = true;
        }

        /// Make every write fail.
        pub fn fail_write(&self) {
            self.state.borrow_mut().fail_write = true;
        }

        /// Accept writes without transferring anything.
        pub fn short_write(&self) {
            self.state.borrow_mut().short_write = true;
        }

        /// Complete reads without transferring anything.
        pub fn short_read(&self) {
            self.state.borrow_mut().short_read = true;
        }

        /// Returns how many times the bus was opened.
        pub fn opens(&self) -> usize {
            self.state.borrow().opens
        }

        /// Returns every command written so far.
        pub fn transactions(&self) -> Vec<Transaction> {
            self.state.borrow().transactions.clone()
        }

        /// Returns an opener handing out connections to this bus.
        pub fn opener(&self) -> Opener {
            let state = Rc::clone(&self.state);
            Box::new(move || {
                let mut s = state.borrow_mut();
                if s.fail_open {
                    let e = io::Error::new(io::ErrorKind::NotFound, "no such bus");
                    return Err(Error::Open(i2c::Error::Io(e)));
                }
                s.opens += 1;

                Ok(Box::new(MockTransport {
                    state: Rc::clone(&state),
                    address: None,
                    command: None,
                }) as Box<dyn Transport>)
            })
        }

        /// Returns a [`Bus`] on this mock.
        pub fn bus(&self, exclusive: bool) -> Bus {
            Bus::with_opener("/dev/i2c-1", exclusive, self.opener())
                .expect("mock bus should open")
        }
    }

    struct MockTransport {
        state: Rc<RefCell<State>>,
        address: Option<u16>,
        command: Option<u8>,
    }

    impl Transport for MockTransport {
        fn set_address(&mut self, address: u16) -> Result<()> {
            if self.state.borrow().fail_address {
                return Err(Error::Address(i2c::Error::InvalidSlaveAddress(address)));
            }
            self.address = Some(address);
            Ok(())
        }

        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            let address = self.address
                .ok_or_else(|| Error::Address(i2c::Error::InvalidSlaveAddress(0)))?;
            let mut state = self.state.borrow_mut();
            if state.fail_write {
                let e = io::Error::new(io::ErrorKind::Other, "remote I/O error");
                return Err(Error::Write(i2c::Error::Io(e)));
            }
            if state.short_write {
                return Ok(0);
            }
            for &command in buf {
                state.transactions.push(Transaction { address, command });
                self.command = Some(command);
            }
            Ok(buf.len())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let state = self.state.borrow();
            if state.short_read {
                return Ok(0);
            }
            let command = self.command.unwrap_or(0);
            if state.failing.contains(&command) {
                let e = io::Error::new(io::ErrorKind::Other, "remote I/O error");
                return Err(Error::Read(i2c::Error::Io(e)));
            }
            let value = state.values.get(&command).copied().unwrap_or(0);
            for b in buf.iter_mut() {
                *b = value;
            }
            Ok(buf.len())
        }
    }
}
