//! Desktop notifications over the freedesktop notification service
//!
//! `DbusNotifier` calls `org.freedesktop.Notifications.Notify` on the user's
//! session bus. The bus connection is opened on first use and cached; a
//! failed call drops it so the next notification reconnects.

use std::collections::HashMap;

use niri_layout_notify_config::NotificationConfig;
use thiserror::Error;
use tracing::debug;
use zbus::zvariant::Value;

const NOTIFICATIONS_DESTINATION: &str = "org.freedesktop.Notifications";
const NOTIFICATIONS_PATH: &str = "/org/freedesktop/Notifications";
const NOTIFICATIONS_INTERFACE: &str = "org.freedesktop.Notifications";

/// Errors from delivering a notification
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Could not connect to the session bus
    #[error("Failed to connect to session bus: {0}")]
    BusUnavailable(#[source] zbus::Error),

    /// The `Notify` call failed or returned an unexpected reply
    #[error("Failed to send notification: {0}")]
    CallFailed(#[source] zbus::Error),
}

/// Receives the name of each newly active keyboard layout
#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn notify(&mut self, layout: &str) -> Result<(), NotifyError>;
}

/// Arguments of one `Notify` call, in D-Bus signature order `susssasa{sv}i`
type NotifyArgs<'a> = (
    &'a str,
    u32,
    &'a str,
    &'a str,
    &'a str,
    Vec<&'a str>,
    HashMap<&'a str, Value<'a>>,
    i32,
);

/// Sends notifications through the session D-Bus
#[derive(Debug)]
pub struct DbusNotifier {
    config: NotificationConfig,
    connection: Option<zbus::Connection>,
}

impl DbusNotifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    fn args<'a>(&'a self, body: &'a str) -> NotifyArgs<'a> {
        (
            self.config.app_name.as_str(),
            0,
            self.config.icon.as_str(),
            self.config.summary.as_str(),
            body,
            Vec::new(),
            HashMap::new(),
            self.config.timeout_ms,
        )
    }

    async fn connection(&mut self) -> Result<zbus::Connection, NotifyError> {
        if let Some(connection) = &self.connection {
            return Ok(connection.clone());
        }

        let connection = zbus::Connection::session()
            .await
            .map_err(NotifyError::BusUnavailable)?;
        self.connection = Some(connection.clone());
        Ok(connection)
    }
}

impl Notifier for DbusNotifier {
    async fn notify(&mut self, layout: &str) -> Result<(), NotifyError> {
        let connection = self.connection().await?;

        let result = connection
            .call_method(
                Some(NOTIFICATIONS_DESTINATION),
                NOTIFICATIONS_PATH,
                Some(NOTIFICATIONS_INTERFACE),
                "Notify",
                &self.args(layout),
            )
            .await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                // Reconnect on the next notification
                self.connection = None;
                return Err(NotifyError::CallFailed(e));
            }
        };

        let id: u32 = reply
            .body()
            .deserialize()
            .map_err(NotifyError::CallFailed)?;
        debug!(id, layout, "Notification delivered");

        Ok(())
    }
}
