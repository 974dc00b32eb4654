use alloc::string::String;

use core::time::Duration;

use serde::Serialize;

use crate::value::DataType;

/// The kind of a resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    /// An operation that can only be triggered.
    Action,
    /// A configuration property.
    Property,
    /// A measured value.
    #[default]
    Sensor,
    /// A value describing the state of the provider.
    StateVariable,
}

impl ResourceType {
    /// Checks whether the resource is an action.
    #[must_use]
    pub const fn is_action(self) -> bool {
        matches!(self, Self::Action)
    }
}

/// How a resource value is expected to change over time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    /// The value never changes.
    Fixed,
    /// The value is updated by the provider.
    #[default]
    Updatable,
    /// The value can be modified by a caller.
    Modifiable,
}

/// What to do when an external getter produces no value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NullAction {
    /// The twin is left untouched and the cached value is returned.
    #[default]
    Ignore,
    /// The twin is set to no value only if it currently holds a value.
    UpdateIfPresent,
    /// The twin is always set to no value.
    Update,
}

/// How a resource value is obtained from and written to the outside world.
///
/// Resources without this description, such as the administrative ones,
/// never invoke external handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ResourceMetadata {
    /// Reads may invoke an external getter.
    pub external_get: bool,
    /// Writes invoke an external setter.
    pub external_set: bool,
    /// How long a pulled value stays valid for [`GetLevel::Normal`] reads.
    ///
    /// [`GetLevel::Normal`]: crate::timed::GetLevel::Normal
    pub external_get_cache: Duration,
}

impl ResourceMetadata {
    /// Creates a [`ResourceMetadata`] without external handlers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            external_get: false,
            external_set: false,
            external_get_cache: Duration::ZERO,
        }
    }

    /// Enables the external getter.
    #[must_use]
    pub const fn external_get(mut self, cache: Duration) -> Self {
        self.external_get = true;
        self.external_get_cache = cache;
        self
    }

    /// Enables the external setter.
    #[must_use]
    pub const fn external_set(mut self) -> Self {
        self.external_set = true;
        self
    }
}

/// A named and typed action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ActionParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter type.
    pub data_type: DataType,
}

impl ActionParameter {
    /// Creates an [`ActionParameter`].
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{NullAction, ResourceMetadata, ResourceType, ValueType};

    #[test]
    fn resource_metadata() {
        assert_eq!(ResourceMetadata::new(), ResourceMetadata::default());

        let metadata = ResourceMetadata::new()
            .external_get(Duration::from_secs(1))
            .external_set();

        assert_eq!(
            metadata,
            ResourceMetadata {
                external_get: true,
                external_set: true,
                external_get_cache: Duration::from_secs(1),
            }
        );
    }

    #[test]
    fn resource_enums_serde() {
        assert_eq!(serialize(ResourceType::StateVariable), json!("STATE_VARIABLE"));
        assert_eq!(serialize(ValueType::Modifiable), json!("MODIFIABLE"));
        assert_eq!(
            deserialize::<NullAction>(json!("UPDATE_IF_PRESENT")),
            NullAction::UpdateIfPresent
        );
        assert!(ResourceType::Action.is_action());
        assert!(!ResourceType::default().is_action());
    }
}
