//! Tracing setup
//!
//! The configuration file is read under a temporary stderr subscriber so that
//! parser warnings are not lost. The process-wide subscriber is installed
//! afterwards, once the configured level and target are known. `RUST_LOG`
//! overrides the configured level in both.

use anyhow::Result;
use niri_layout_notify_config::{GlobalConfig, LogLevel, LogTarget};
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Level used while the configuration is being read
const BOOTSTRAP_LEVEL: LogLevel = LogLevel::Info;

fn rust_log() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV).ok()
}

/// `env` directives if they parse, otherwise `level`
fn filter(env: Option<&str>, level: LogLevel) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(level.as_filter_str()))
}

/// Run `f` with a stderr subscriber active on this thread
///
/// Used for config loading, before `init` can pick the real target.
pub fn with_bootstrap<T>(f: impl FnOnce() -> T) -> T {
    let dispatch = bootstrap(std::io::stderr, rust_log().as_deref());
    tracing::dispatcher::with_default(&dispatch, f)
}

fn bootstrap<W>(make_writer: W, env: Option<&str>) -> Dispatch
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_writer(make_writer)
        .with_env_filter(filter(env, BOOTSTRAP_LEVEL))
        .finish();
    Dispatch::new(subscriber)
}

/// Install the global subscriber for `global.log_target`
///
/// The journal target falls back to stderr when journald cannot be reached.
pub fn init(global: &GlobalConfig) -> Result<()> {
    let filter = filter(rust_log().as_deref(), global.log_level);

    match global.log_target {
        LogTarget::Stderr => init_stderr(filter)?,
        LogTarget::Journal => match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .try_init()?;
            }
            Err(e) => {
                init_stderr(filter)?;
                tracing::warn!(error = %e, "systemd journal unavailable, logging to stderr");
            }
        },
    }

    Ok(())
}

fn init_stderr(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
