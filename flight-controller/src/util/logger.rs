use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::util::time::get_current_system_time_ms;

/// Console backend for the host build; the board build routes `log` to its own UART logger.
struct ConsoleLogger;

static CONSOLE_LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{:>8} {:<5} [{}] {}",
            get_current_system_time_ms(),
            record.level(),
            record.target(),
            record.args()
        );
        match record.level() {
            Level::Error | Level::Warn => eprintln!("{}", line),
            _ => println!("{}", line),
        }
    }

    fn flush(&self) {}
}

pub fn initialize_default() {
    initialize(LevelFilter::Info);
}

pub fn initialize(level: LevelFilter) {
    // A logger may already be installed by an embedding application or another test.
    if log::set_logger(&CONSOLE_LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
