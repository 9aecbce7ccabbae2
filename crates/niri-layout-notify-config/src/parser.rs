//! KDL configuration parser

use std::path::Path;

use crate::error::ConfigError;
use crate::model::*;

/// Load the configuration at `path`, falling back to defaults if the file
/// does not exist
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(
            "No configuration file at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    parse_config(path)
}

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl carries its own miette version, so rebuild the span from offset/len
        let offset = e.span.offset();
        let len = e.span.len();
        let span = miette::SourceSpan::from((offset, len));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    let mut config = Config::default();

    for node in doc.nodes() {
        match node.name().value() {
            "global" => {
                config.global = parse_global(node)?;
            }
            "notification" => {
                config.notification = parse_notification(node)?;
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    Ok(config)
}

fn parse_global(node: &kdl::KdlNode) -> Result<GlobalConfig, ConfigError> {
    let mut global = GlobalConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "log-level" => {
                    global.log_level = string_arg(child)?
                        .parse::<LogLevel>()
                        .map_err(|message| ConfigError::Invalid { message })?;
                }
                "log-target" => {
                    global.log_target = string_arg(child)?
                        .parse::<LogTarget>()
                        .map_err(|message| ConfigError::Invalid { message })?;
                }
                "connect-retries" => {
                    let value = int_arg(child)?;
                    global.connect_retries =
                        u32::try_from(value).map_err(|_| ConfigError::Invalid {
                            message: format!(
                                "connect-retries must be a non-negative integer, got {}",
                                value
                            ),
                        })?;
                }
                name => {
                    tracing::warn!("Unknown global config option: {}", name);
                }
            }
        }
    }

    Ok(global)
}

fn parse_notification(node: &kdl::KdlNode) -> Result<NotificationConfig, ConfigError> {
    let mut notification = NotificationConfig::default();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "app-name" => notification.app_name = string_arg(child)?.to_string(),
                "summary" => notification.summary = string_arg(child)?.to_string(),
                "icon" => {
                    notification.icon = shellexpand::tilde(string_arg(child)?).into_owned();
                }
                "timeout-ms" => {
                    let value = int_arg(child)?;
                    notification.timeout_ms = i32::try_from(value)
                        .ok()
                        .filter(|ms| *ms >= -1)
                        .ok_or_else(|| ConfigError::Invalid {
                            message: format!(
                                "timeout-ms must be -1, 0 or a positive number of milliseconds, got {}",
                                value
                            ),
                        })?;
                }
                name => {
                    tracing::warn!("Unknown notification config option: {}", name);
                }
            }
        }
    }

    Ok(notification)
}

/// First argument of `node` as a string
fn string_arg(node: &kdl::KdlNode) -> Result<&str, ConfigError> {
    let entry = node.entries().first().ok_or_else(|| ConfigError::MissingValue {
        node: node.name().value().to_string(),
    })?;

    entry.value().as_string().ok_or_else(|| ConfigError::Invalid {
        message: format!("`{}` expects a string", node.name().value()),
    })
}

/// First argument of `node` as an integer
fn int_arg(node: &kdl::KdlNode) -> Result<i64, ConfigError> {
    let entry = node.entries().first().ok_or_else(|| ConfigError::MissingValue {
        node: node.name().value().to_string(),
    })?;

    entry.value().as_i64().ok_or_else(|| ConfigError::Invalid {
        message: format!("`{}` expects an integer", node.name().value()),
    })
}
