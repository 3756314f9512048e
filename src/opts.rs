//! Runtime configuration options.

use std::env;
use std::fmt;
use std::fmt::Display;
use std::path::Path;

use ads7830d::input::ConfigReader;
use ads7830d::input::json::JSONConfigParser;
use getopts::Options;

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug)]
pub enum Error {
    /// An option is missing its required argument.
    ArgumentMissing(&'static str),
    /// Parsing command line failed.
    CLI(getopts::Fail),
    /// User requested to see help, not run the program.
    Help(String),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::CLI(ref e) => Some(e),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            ArgumentMissing(arg) => write!(f, "missing argument: {}", arg),
            CLI(ref e) => write!(f, "{}", e),
            Help(ref help_msg) => write!(f, "Program help:\n{}", help_msg),
        }
    }
}

impl From<getopts::Fail> for Error {
    fn from(e: getopts::Fail) -> Error {
        Error::CLI(e)
    }
}

#[derive(Debug)]
pub struct Configuration {
    config_reader: Box<dyn ConfigReader>,
    verbose: bool,
    output: bool,
    exclusive: bool,
}

impl Configuration {
    pub fn get_config_reader(&self) -> &dyn ConfigReader {
        self.config_reader.as_ref()
    }

    /// Echo the configuration and log at debug level.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Print the status once startup completes.
    pub fn output(&self) -> bool {
        self.output
    }

    /// Hold the bus open for the daemon's lifetime.
    pub fn exclusive(&self) -> bool {
        self.exclusive
    }
}

fn create_options() -> Options {
    let mut opts = Options::new();
    opts.optflag("v", "verbose", "echo the configuration and log verbosely");
    opts.optflag("o", "output", "print the status after startup");
    opts.optflag("x", "exclusive", "keep the I2C bus open instead of opening it per read");
    opts.optflag("h", "help", "show help");

    opts
}

pub fn parse() -> Result<Configuration> {
    let cli_args: Vec<String> = env::args().collect();
    parse_args(&cli_args)
}

fn parse_args(cli_args: &[String]) -> Result<Configuration> {
    let opts = create_options();
    let program = cli_args.get(0).map(String::as_str).unwrap_or("ads7830d");
    let matches = opts.parse(cli_args.iter().skip(1))?;

    if matches.opt_present("h") {
        let brief = format!("Usage: {} [ options ] <config file>", program);
        Err(Error::Help(opts.usage(&brief)))
    } else {
        let config_path = matches.free.get(0)
            .ok_or(Error::ArgumentMissing("config file"))?;
        let config_reader = Box::new(JSONConfigParser::new(Path::new(config_path)));

        Ok(Configuration {
            config_reader,
            verbose: matches.opt_present("v"),
            output: matches.opt_present("o"),
            exclusive: matches.opt_present("x"),
        })
    }
}
