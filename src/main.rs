//! ADS7830 sampling daemon

use std::error::Error;
use std::io;
use std::iter;
use std::process;

use tracing::{error, info, warn};

use ads7830d::channel::ChannelTable;
use ads7830d::controller::{Controller, Settings};
use ads7830d::event;
use ads7830d::hw::{ADS7830, Bus};
use ads7830d::logging;
use ads7830d::status;
use ads7830d::timer::TimerManager;
use ads7830d::varserver::MemoryVarServer;

mod opts;
mod signals;

fn main() {
    let configuration = match opts::parse() {
        Ok(configuration) => configuration,
        Err(e) => {
            use opts::Error::*;
            match e {
                Help(ref msg) => println!("{}", msg),
                _ => println!("Initialization failed.\n{}", e),
            };
            process::exit(1);
        },
    };

    logging::init(configuration.verbose());

    if let Err(e) = run(&configuration) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(configuration: &opts::Configuration) -> Result<(), Box<dyn Error>> {
    let config = configuration.get_config_reader().read()?;
    info!("loaded configuration from {}", config.source.display());
    if configuration.verbose() {
        println!("{}", config.document);
    }

    let bus = Bus::open(&config.device, configuration.exclusive())?;
    let adc = ADS7830::new(bus, config.address);

    let (events_tx, events_rx) = event::queue();

    // Variables are served from this process, so every configured name exists.
    let vars = MemoryVarServer::new(events_tx.clone()).print_to_stdout();
    let names = config.channels.iter()
        .filter_map(|def| def.var.as_ref())
        .chain(iter::once(&config.info_var));
    for name in names {
        vars.declare(name)?;
    }

    // Before any timer starts, so no signal meets the default action once sampling runs.
    signals::install(events_tx.clone(), vars.clone(), config.info_var.clone())?;

    let timers = TimerManager::new(events_tx);
    let channels = ChannelTable::populate(&config.channels, &vars, &timers);

    let settings = Settings {
        config_path: config.source.clone(),
        verbose: configuration.verbose(),
    };
    let mut controller = Controller::new(settings, adc, Box::new(vars), channels, events_rx);

    if let Err(e) = controller.subscribe_status(&config.info_var) {
        warn!("status printing unavailable: {}", e);
    }

    if configuration.output() {
        status::render(&mut controller, &mut io::stdout())?;
    }

    controller.run();

    Ok(())
}
