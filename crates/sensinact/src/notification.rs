use alloc::string::String;

use core::fmt;

use serde::Serialize;

use crate::timed::Timestamp;
use crate::value::Value;

/// The location of a provider, service or resource in the twin graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct Address {
    /// Package URI of the provider model.
    pub model_package_uri: String,
    /// Provider model.
    pub model: String,
    /// Provider name.
    pub provider: String,
    /// Service name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Resource name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Address {
    /// Creates the [`Address`] of a provider.
    #[must_use]
    #[inline]
    pub fn provider(
        model_package_uri: impl Into<String>,
        model: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            model_package_uri: model_package_uri.into(),
            model: model.into(),
            provider: provider.into(),
            service: None,
            resource: None,
        }
    }

    /// Narrows an [`Address`] to a service.
    #[must_use]
    #[inline]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Narrows an [`Address`] to a resource.
    #[must_use]
    #[inline]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.provider)?;
        if let Some(service) = &self.service {
            write!(f, "/{service}")?;
        }
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

/// A change applied to the twin graph.
///
/// Notifications are accumulated while a command runs and published once
/// the command completes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// A provider has been created.
    ProviderAdded {
        /// Provider address.
        address: Address,
        /// Instant of the change.
        timestamp: Timestamp,
    },
    /// A provider has been deleted.
    ProviderRemoved {
        /// Provider address.
        address: Address,
        /// Instant of the change.
        timestamp: Timestamp,
    },
    /// A service instance has been created on a provider.
    ServiceAdded {
        /// Service address.
        address: Address,
        /// Instant of the change.
        timestamp: Timestamp,
    },
    /// A resource value has changed.
    ValueChanged {
        /// Resource address.
        address: Address,
        /// Previous value.
        old: Option<Value>,
        /// New value.
        new: Option<Value>,
        /// Instant of the new value.
        timestamp: Timestamp,
    },
    /// A resource metadata entry has changed.
    MetadataChanged {
        /// Resource address.
        address: Address,
        /// Metadata key.
        key: String,
        /// Previous metadata value.
        old: Option<Value>,
        /// New metadata value.
        new: Option<Value>,
        /// Instant of the new metadata value.
        timestamp: Timestamp,
    },
    /// A provider has been linked to another one.
    ProvidersLinked {
        /// Parent provider address.
        parent: Address,
        /// Child provider name.
        child: String,
        /// Instant of the change.
        timestamp: Timestamp,
    },
    /// A provider has been unlinked from another one.
    ProvidersUnlinked {
        /// Parent provider address.
        parent: Address,
        /// Child provider name.
        child: String,
        /// Instant of the change.
        timestamp: Timestamp,
    },
}

impl Notification {
    /// Returns the address of the element that has changed.
    #[must_use]
    pub const fn address(&self) -> &Address {
        match self {
            Self::ProviderAdded { address, .. }
            | Self::ProviderRemoved { address, .. }
            | Self::ServiceAdded { address, .. }
            | Self::ValueChanged { address, .. }
            | Self::MetadataChanged { address, .. } => address,
            Self::ProvidersLinked { parent, .. } | Self::ProvidersUnlinked { parent, .. } => {
                parent
            }
        }
    }

    /// Returns the instant of the change.
    #[must_use]
    pub const fn timestamp(&self) -> Timestamp {
        match self {
            Self::ProviderAdded { timestamp, .. }
            | Self::ProviderRemoved { timestamp, .. }
            | Self::ServiceAdded { timestamp, .. }
            | Self::ValueChanged { timestamp, .. }
            | Self::MetadataChanged { timestamp, .. }
            | Self::ProvidersLinked { timestamp, .. }
            | Self::ProvidersUnlinked { timestamp, .. } => *timestamp,
        }
    }
}
