pub mod config;
pub mod console;
pub mod observer;

pub use config::{ConfigError, MonitorConfig};
pub use console::{parse_command, Console, ConsoleCommand};
