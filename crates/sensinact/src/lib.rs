//! The data interface of the `sensinact` digital twin.
//!
//! This crate provides the plain types exchanged between the twin engine and
//! its consumers:
//!
//! - Dynamic resource values along with their declared types and the
//!   conversions among them.
//! - Timed values, which pair a value with the instant it was last known
//!   to be correct, and the levels used to read them.
//! - Resource descriptions, such as the resource kind, its mutability and
//!   the policies applied to external getters and setters.
//! - Immutable point-in-time snapshots of providers, services and resources,
//!   together with the filters used to select them.
//! - Notifications emitted whenever the twin graph changes.
//!
//! All structures are serializable, so a northbound consumer can forward
//! them as they are. The `deserialize` feature, enabled by default, makes
//! them deserializable too.
//!
//! This crate can be compiled for both `std` and `no_std` environments.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![no_std]

extern crate alloc;

/// Notifications describing the changes applied to the twin graph.
pub mod notification;
/// Resource descriptions.
pub mod resource;
/// Point-in-time views of providers, services and resources.
pub mod snapshot;
/// Timed values and reading levels.
pub mod timed;
/// Dynamic values and their declared types.
pub mod value;

/// The package URI prefix used when a model is created without an explicit
/// package URI.
pub const DEFAULT_PACKAGE_URI_PREFIX: &str = "https://eclipse.org/sensinact/";

/// Builds the default package URI of a model.
#[must_use]
#[inline]
pub fn default_package_uri(model: &str) -> alloc::string::String {
    alloc::format!("{DEFAULT_PACKAGE_URI_PREFIX}{model}")
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
#[cfg(feature = "deserialize")]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
