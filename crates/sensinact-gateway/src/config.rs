use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

const QUEUE_CAPACITY: usize = 4096;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);
const NOTIFICATION_CAPACITY: usize = 1024;
const THREAD_NAME: &str = "sensinact-gateway";

/// The gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Maximum number of commands waiting to be executed.
    pub queue_capacity: usize,
    /// How long to wait for the worker thread during deactivation.
    #[serde(rename = "shutdown_timeout_ms", with = "millis")]
    pub shutdown_timeout: Duration,
    /// Name of the worker thread.
    pub thread_name: String,
    /// Number of notifications buffered for each subscriber.
    pub notification_capacity: usize,
    /// Whether the `sensiNact` system provider is created at startup.
    pub system_provider: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayConfig {
    /// Creates a [`GatewayConfig`] with default values.
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            queue_capacity: QUEUE_CAPACITY,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            thread_name: THREAD_NAME.into(),
            notification_capacity: NOTIFICATION_CAPACITY,
            system_provider: true,
        }
    }

    /// Loads a [`GatewayConfig`] from `JSON`.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// An error is returned when the `JSON` is malformed or the loaded
    /// configuration is invalid.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::new(
                ErrorKind::Configuration,
                format!("Invalid gateway configuration: {e}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the maximum number of queued commands.
    #[must_use]
    #[inline]
    pub const fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the deactivation timeout.
    #[must_use]
    #[inline]
    pub const fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Sets the name of the worker thread.
    #[must_use]
    #[inline]
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Sets the number of notifications buffered for each subscriber.
    #[must_use]
    #[inline]
    pub const fn notification_capacity(mut self, notification_capacity: usize) -> Self {
        self.notification_capacity = notification_capacity;
        self
    }

    /// Enables or disables the `sensiNact` system provider.
    #[must_use]
    #[inline]
    pub const fn system_provider(mut self, system_provider: bool) -> Self {
        self.system_provider = system_provider;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.queue_capacity == 0 {
            return Err(Error::new(
                ErrorKind::Configuration,
                "The command queue capacity must be greater than zero",
            ));
        }

        if self.notification_capacity == 0 {
            return Err(Error::new(
                ErrorKind::Configuration,
                "The notification capacity must be greater than zero",
            ));
        }

        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        duration: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
