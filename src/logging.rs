use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::LoggingSettings;
use crate::error::RelayError;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}";

/// Builds the console configuration used when no log4rs file is given.
pub fn console_config(level: LevelFilter) -> Result<Config, RelayError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(level))
        .map_err(|e| RelayError::Logging(e.to_string()))
}

pub fn parse_level(level: &str) -> Result<LevelFilter, RelayError> {
    LevelFilter::from_str(level).map_err(|_| RelayError::Logging(format!("unknown log level '{}'", level)))
}

pub fn init(settings: &LoggingSettings) -> Result<(), RelayError> {
    if let Some(ref file) = settings.file {
        return log4rs::init_file(file, Default::default())
            .map_err(|e| RelayError::Logging(format!("{}: {}", file.display(), e)));
    }
    let config = console_config(parse_level(&settings.level)?)?;
    log4rs::init_config(config)
        .map(|_| ())
        .map_err(|e| RelayError::Logging(e.to_string()))
}
