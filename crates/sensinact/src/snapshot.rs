use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use core::fmt;

use hashbrown::DefaultHashBuilder;

use indexmap::map::IndexMap;

use serde::Serialize;

use crate::resource::{ResourceType, ValueType};
use crate::timed::{TimedValue, Timestamp};
use crate::value::{DataType, Value};

/// Name of the administrative service owned by every provider.
pub const ADMIN_SERVICE: &str = "admin";
/// Name of the administrative resource holding the provider location.
pub const LOCATION_RESOURCE: &str = "location";

/// Resource metadata, keyed by name.
///
/// The `timestamp` entry always describes the instant of the resource value.
pub type Metadata = IndexMap<String, Option<Value>, DefaultHashBuilder>;

/// A read-only view shared by all snapshots.
pub trait Snapshot {
    /// Name of the snapshotted element.
    fn name(&self) -> &str;

    /// Instant at which the snapshot was taken.
    fn snapshot_time(&self) -> Timestamp;
}

/// A point-in-time view of a resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ResourceSnapshot {
    /// Name of the owning provider.
    pub provider: String,
    /// Name of the owning service.
    pub service: String,
    /// Resource name.
    pub name: String,
    /// Resource kind.
    pub resource_type: ResourceType,
    /// Resource mutability.
    pub value_type: ValueType,
    /// Declared resource type.
    pub data_type: DataType,
    /// Resource value, empty when the value was never set.
    pub value: TimedValue,
    /// Resource metadata.
    pub metadata: Metadata,
    /// Instant at which the snapshot was taken.
    pub snapshot_time: Timestamp,
}

impl ResourceSnapshot {
    /// Checks whether the resource value has ever been set.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        self.value.timestamp.is_some()
    }
}

impl Snapshot for ResourceSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_time(&self) -> Timestamp {
        self.snapshot_time
    }
}

/// A point-in-time view of a service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ServiceSnapshot {
    /// Name of the owning provider.
    pub provider: String,
    /// Service name.
    pub name: String,
    /// Service resources.
    pub resources: Vec<ResourceSnapshot>,
    /// Instant at which the snapshot was taken.
    pub snapshot_time: Timestamp,
}

impl ServiceSnapshot {
    /// Returns the [`ResourceSnapshot`] with the given name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceSnapshot> {
        self.resources.iter().find(|resource| resource.name == name)
    }
}

impl Snapshot for ServiceSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_time(&self) -> Timestamp {
        self.snapshot_time
    }
}

/// A point-in-time view of a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "deserialize", derive(serde::Deserialize))]
pub struct ProviderSnapshot {
    /// Package URI of the provider model.
    pub model_package_uri: String,
    /// Provider model.
    pub model: String,
    /// Provider name.
    pub name: String,
    /// Provider services.
    pub services: Vec<ServiceSnapshot>,
    /// Instant at which the snapshot was taken.
    pub snapshot_time: Timestamp,
}

impl ProviderSnapshot {
    /// Returns the [`ServiceSnapshot`] with the given name.
    #[must_use]
    pub fn service(&self, name: &str) -> Option<&ServiceSnapshot> {
        self.services.iter().find(|service| service.name == name)
    }

    /// Returns the [`ResourceSnapshot`] with the given service and
    /// resource names.
    #[must_use]
    pub fn resource(&self, service: &str, resource: &str) -> Option<&ResourceSnapshot> {
        self.service(service)
            .and_then(|service| service.resource(resource))
    }

    /// Returns the provider location, if known.
    #[must_use]
    pub fn location(&self) -> Option<&Value> {
        self.resource(ADMIN_SERVICE, LOCATION_RESOURCE)
            .and_then(|resource| resource.value.value())
    }

    /// Removes all services without resources.
    pub fn filter_empty_services(&mut self) {
        self.services.retain(|service| !service.resources.is_empty());
    }
}

impl Snapshot for ProviderSnapshot {
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot_time(&self) -> Timestamp {
        self.snapshot_time
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;
type GeoPredicate = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Selects the providers, services and resources of a filtered snapshot.
///
/// Every predicate is optional and an absent predicate accepts everything.
/// Predicates are applied in order: providers, provider location, services
/// and resources. A resource is kept only when its service and provider
/// are kept as well.
#[derive(Default)]
pub struct SnapshotFilter {
    geo: Option<GeoPredicate>,
    provider: Option<Predicate<ProviderSnapshot>>,
    service: Option<Predicate<ServiceSnapshot>>,
    resource: Option<Predicate<ResourceSnapshot>>,
}

impl fmt::Debug for SnapshotFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotFilter")
            .field("geo", &self.geo.is_some())
            .field("provider", &self.provider.is_some())
            .field("service", &self.service.is_some())
            .field("resource", &self.resource.is_some())
            .finish()
    }
}

impl SnapshotFilter {
    /// Creates a [`SnapshotFilter`] accepting everything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            geo: None,
            provider: None,
            service: None,
            resource: None,
        }
    }

    /// Sets a predicate on the provider location.
    ///
    /// The predicate receives [`None`] when the location is unknown.
    #[must_use]
    #[inline]
    pub fn geo(mut self, predicate: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static) -> Self {
        self.geo = Some(Box::new(predicate));
        self
    }

    /// Sets a predicate on providers.
    ///
    /// The provider snapshot does not contain its services yet when the
    /// predicate is evaluated.
    #[must_use]
    #[inline]
    pub fn provider(
        mut self,
        predicate: impl Fn(&ProviderSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.provider = Some(Box::new(predicate));
        self
    }

    /// Sets a predicate on services.
    ///
    /// The service snapshot does not contain its resources yet when the
    /// predicate is evaluated.
    #[must_use]
    #[inline]
    pub fn service(
        mut self,
        predicate: impl Fn(&ServiceSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.service = Some(Box::new(predicate));
        self
    }

    /// Sets a predicate on resources.
    #[must_use]
    #[inline]
    pub fn resource(
        mut self,
        predicate: impl Fn(&ResourceSnapshot) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.resource = Some(Box::new(predicate));
        self
    }

    /// Evaluates the provider predicate.
    #[must_use]
    pub fn accepts_provider(&self, provider: &ProviderSnapshot) -> bool {
        self.provider.as_ref().is_none_or(|accept| accept(provider))
    }

    /// Evaluates the location predicate.
    #[must_use]
    pub fn accepts_location(&self, location: Option<&Value>) -> bool {
        self.geo.as_ref().is_none_or(|accept| accept(location))
    }

    /// Evaluates the service predicate.
    #[must_use]
    pub fn accepts_service(&self, service: &ServiceSnapshot) -> bool {
        self.service.as_ref().is_none_or(|accept| accept(service))
    }

    /// Evaluates the resource predicate.
    #[must_use]
    pub fn accepts_resource(&self, resource: &ResourceSnapshot) -> bool {
        self.resource.as_ref().is_none_or(|accept| accept(resource))
    }

    /// Checks whether a location predicate is set.
    #[must_use]
    pub const fn has_geo(&self) -> bool {
        self.geo.is_some()
    }

    /// Checks whether a service or a resource predicate is set.
    #[must_use]
    pub const fn narrows_content(&self) -> bool {
        self.service.is_some() || self.resource.is_some()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;

    use chrono::DateTime;

    use serde_json::json;

    use crate::resource::{ResourceType, ValueType};
    use crate::timed::{TimedValue, Timestamp};
    use crate::value::{DataType, Value};

    use super::{
        ADMIN_SERVICE, LOCATION_RESOURCE, Metadata, ProviderSnapshot, ResourceSnapshot,
        ServiceSnapshot, SnapshotFilter,
    };

    fn instant() -> Timestamp {
        DateTime::from_timestamp_millis(1_000).unwrap()
    }

    fn resource(service: &str, name: &str, value: TimedValue) -> ResourceSnapshot {
        ResourceSnapshot {
            provider: "provider".into(),
            service: service.into(),
            name: name.into(),
            resource_type: ResourceType::Sensor,
            value_type: ValueType::Updatable,
            data_type: DataType::Any,
            value,
            metadata: Metadata::default(),
            snapshot_time: instant(),
        }
    }

    fn service(name: &str, resources: Vec<ResourceSnapshot>) -> ServiceSnapshot {
        ServiceSnapshot {
            provider: "provider".into(),
            name: name.into(),
            resources,
            snapshot_time: instant(),
        }
    }

    fn provider() -> ProviderSnapshot {
        let location = json!({ "type": "Point", "coordinates": [7.6, 45.0] });
        ProviderSnapshot {
            model_package_uri: crate::default_package_uri("model"),
            model: "model".into(),
            name: "provider".into(),
            services: vec![
                service(
                    ADMIN_SERVICE,
                    vec![resource(
                        ADMIN_SERVICE,
                        LOCATION_RESOURCE,
                        TimedValue::new(Value::Json(location), instant()),
                    )],
                ),
                service("empty", Vec::new()),
            ],
            snapshot_time: instant(),
        }
    }

    #[test]
    fn provider_snapshot_lookup() {
        let mut snapshot = provider();

        assert!(snapshot.service("empty").is_some());
        assert!(snapshot.resource(ADMIN_SERVICE, LOCATION_RESOURCE).unwrap().is_set());
        assert_eq!(
            snapshot.location(),
            Some(&Value::Json(
                json!({ "type": "Point", "coordinates": [7.6, 45.0] })
            ))
        );

        snapshot.filter_empty_services();
        assert_eq!(
            snapshot
                .services
                .iter()
                .map(|service| service.name.to_string())
                .collect::<Vec<_>>(),
            vec![ADMIN_SERVICE.to_string()]
        );
    }

    #[test]
    fn snapshot_filter() {
        let snapshot = provider();

        // No predicates.
        let filter = SnapshotFilter::new();
        assert!(filter.accepts_provider(&snapshot));
        assert!(filter.accepts_location(None));
        assert!(!filter.narrows_content());

        let filter = SnapshotFilter::new()
            .provider(|provider| provider.model == "model")
            .geo(|location| location.is_some())
            .service(|service| service.name == ADMIN_SERVICE);

        assert!(filter.accepts_provider(&snapshot));
        assert!(filter.accepts_location(snapshot.location()));
        assert!(!filter.accepts_location(None));
        assert!(filter.accepts_service(&snapshot.services[0]));
        assert!(!filter.accepts_service(&snapshot.services[1]));
        assert!(filter.narrows_content());
        assert!(filter.has_geo());
    }
}
