//! Configuration parsing for niri-layout-notify
//!
//! This crate handles parsing the optional KDL configuration file that
//! tunes logging, connection retries and the notification payload.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{load_config, parse_config, parse_config_str};
