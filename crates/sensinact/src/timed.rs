use chrono::{DateTime, Utc};

use serde::Serialize;

use crate::value::{FromValue, Value, ValueError};

/// An instant on the UTC time-line.
pub type Timestamp = DateTime<Utc>;

/// A value paired with the instant it was last known to be correct.
///
/// A timestamp is present if and only if a value has been committed at least
/// once. A committed value might be absent, which describes a resource
/// explicitly set to nothing, while the absence of both fields describes
/// a value that was never set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct TimedValue<T = Value> {
    /// The value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    /// The instant associated with the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl<T> Default for TimedValue<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> TimedValue<T> {
    /// Creates an empty [`TimedValue`], describing a value that was
    /// never set.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            value: None,
            timestamp: None,
        }
    }

    /// Creates a [`TimedValue`].
    #[must_use]
    pub const fn new(value: T, timestamp: Timestamp) -> Self {
        Self {
            value: Some(value),
            timestamp: Some(timestamp),
        }
    }

    /// Creates a [`TimedValue`] from its optional parts.
    #[must_use]
    pub const fn from_parts(value: Option<T>, timestamp: Option<Timestamp>) -> Self {
        Self { value, timestamp }
    }

    /// Checks whether neither a value nor a timestamp is present.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.value.is_none() && self.timestamp.is_none()
    }

    /// Returns a reference to the value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Maps the value and keeps the timestamp.
    #[must_use]
    #[inline]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TimedValue<U> {
        TimedValue {
            value: self.value.map(f),
            timestamp: self.timestamp,
        }
    }
}

impl TimedValue<Value> {
    /// Reads the value as the given type.
    ///
    /// # Errors
    ///
    /// An error is returned when the stored value does not describe the
    /// requested type.
    pub fn typed<T: FromValue>(self) -> Result<TimedValue<T>, ValueError> {
        let value = self.value.as_ref().map(T::from_value).transpose()?;
        Ok(TimedValue {
            value,
            timestamp: self.timestamp,
        })
    }
}

/// The level used when reading a resource value.
///
/// It determines whether an external getter is invoked or the cached value
/// is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "UPPERCASE")]
pub enum GetLevel {
    /// Only the cached value is returned.
    Weak,
    /// The cached value is returned unless it has expired.
    #[default]
    Normal,
    /// The external getter is always invoked.
    Strong,
}
