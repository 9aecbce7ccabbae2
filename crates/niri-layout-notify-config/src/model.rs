//! Configuration data model

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub global: GlobalConfig,
    pub notification: NotificationConfig,
}

/// Global settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    pub log_target: LogTarget,
    /// Extra attempts made when the initial socket connection fails.
    ///
    /// `0` means a single attempt.
    pub connect_retries: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Where log output goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogTarget {
    /// The systemd journal, falling back to stderr when journald is unreachable
    #[default]
    Journal,
    Stderr,
}

impl LogTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Stderr => "stderr",
        }
    }
}

impl std::str::FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "journal" | "journald" => Ok(Self::Journal),
            "stderr" => Ok(Self::Stderr),
            _ => Err(format!("Unknown log target: {}", s)),
        }
    }
}

/// Fields of the `org.freedesktop.Notifications.Notify` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    /// Application name reported to the notification server
    pub app_name: String,
    /// Notification title; the layout name becomes the body
    pub summary: String,
    /// Icon name or path, empty for none
    pub icon: String,
    /// Expiry in milliseconds (`-1` lets the server decide, `0` never expires)
    pub timeout_ms: i32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            app_name: "nirinotify".to_string(),
            summary: "Layout Changed".to_string(),
            icon: String::new(),
            timeout_ms: 5000,
        }
    }
}
