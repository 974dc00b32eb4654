use chrono::Utc;

use sensinact::snapshot::{
    ADMIN_SERVICE, LOCATION_RESOURCE, ProviderSnapshot, ResourceSnapshot, ServiceSnapshot,
    SnapshotFilter,
};
use sensinact::timed::Timestamp;

use crate::model::{ResourceDefinition, ServiceDefinition};
use crate::nexus::{ModelNexus, ProviderNode};

impl ModelNexus {
    /// Takes a snapshot of every provider accepted by the filter.
    pub(crate) fn filtered_snapshot(&self, filter: &SnapshotFilter) -> Vec<ProviderSnapshot> {
        let snapshot_time = Utc::now();
        self.providers()
            .filter_map(|provider| self.snapshot_filtered(provider, filter, snapshot_time))
            .collect()
    }

    pub(crate) fn snapshot_provider(&self, provider: &str) -> Option<ProviderSnapshot> {
        let provider = self.provider(provider)?;
        self.snapshot_filtered(provider, &SnapshotFilter::new(), Utc::now())
    }

    pub(crate) fn snapshot_service(&self, provider: &str, service: &str) -> Option<ServiceSnapshot> {
        let provider = self.provider(provider)?;
        let definition = self.service_definition(&provider.model, service).ok()?;
        let mut snapshot = service_shell(provider, definition, Utc::now());
        snapshot.resources = definition
            .resources
            .values()
            .map(|resource| self.snapshot_one(provider, service, resource, snapshot.snapshot_time))
            .collect();
        Some(snapshot)
    }

    pub(crate) fn snapshot_resource(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Option<ResourceSnapshot> {
        let provider = self.provider(provider)?;
        let definition = self
            .resource_definition(&provider.model, service, resource)
            .ok()?;
        Some(self.snapshot_one(provider, service, definition, Utc::now()))
    }

    // Predicates run from the outermost element to the innermost one, so a
    // rejected provider or service is never expanded.
    fn snapshot_filtered(
        &self,
        provider: &ProviderNode,
        filter: &SnapshotFilter,
        snapshot_time: Timestamp,
    ) -> Option<ProviderSnapshot> {
        let mut snapshot = ProviderSnapshot {
            model_package_uri: provider.model_package_uri.clone(),
            model: provider.model.clone(),
            name: provider.name.clone(),
            services: Vec::new(),
            snapshot_time,
        };
        if !filter.accepts_provider(&snapshot) {
            return None;
        }

        if filter.has_geo() {
            let location = provider
                .resource(ADMIN_SERVICE, LOCATION_RESOURCE)
                .and_then(|node| node.value.value());
            if !filter.accepts_location(location) {
                return None;
            }
        }

        let model = self.model(&provider.model)?;
        for service in model.services.values() {
            let mut service_snapshot = service_shell(provider, service, snapshot_time);
            if !filter.accepts_service(&service_snapshot) {
                continue;
            }

            service_snapshot.resources = service
                .resources
                .values()
                .map(|resource| self.snapshot_one(provider, &service.name, resource, snapshot_time))
                .filter(|resource| filter.accepts_resource(resource))
                .collect();
            snapshot.services.push(service_snapshot);
        }

        snapshot.filter_empty_services();
        if snapshot.services.is_empty() && filter.narrows_content() {
            return None;
        }
        Some(snapshot)
    }

    fn snapshot_one(
        &self,
        provider: &ProviderNode,
        service: &str,
        definition: &ResourceDefinition,
        snapshot_time: Timestamp,
    ) -> ResourceSnapshot {
        ResourceSnapshot {
            provider: provider.name.clone(),
            service: service.into(),
            name: definition.name.clone(),
            resource_type: definition.resource_type,
            value_type: definition.value_type,
            data_type: definition.data_type,
            value: provider
                .resource(service, &definition.name)
                .map(|node| node.value.clone())
                .unwrap_or_default(),
            metadata: self
                .resource_metadata(&provider.name, service, &definition.name)
                .unwrap_or_default(),
            snapshot_time,
        }
    }
}

fn service_shell(
    provider: &ProviderNode,
    definition: &ServiceDefinition,
    snapshot_time: Timestamp,
) -> ServiceSnapshot {
    ServiceSnapshot {
        provider: provider.name.clone(),
        name: definition.name.clone(),
        resources: Vec::new(),
        snapshot_time,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use sensinact::snapshot::{ADMIN_SERVICE, LOCATION_RESOURCE, Snapshot, SnapshotFilter};
    use sensinact::value::{DataType, Value};

    use crate::model::{ModelBuilder, ResourceBuilder, ServiceBuilder};
    use crate::nexus::ModelNexus;

    fn nexus() -> ModelNexus {
        let mut nexus = ModelNexus::new(false);
        let _ = nexus
            .create_model(
                ModelBuilder::new("weather").with_service(
                    ServiceBuilder::new("sensors")
                        .with_resource(ResourceBuilder::new("temperature").with_type(DataType::Float))
                        .with_resource(ResourceBuilder::new("humidity").with_type(DataType::Int)),
                ),
            )
            .unwrap();

        for (name, temperature, longitude) in [("north", 4.5, 2.3), ("south", 21.0, 5.4)] {
            let _ = nexus.create_provider(None, "weather", name, None).unwrap();
            let now = chrono::Utc::now();
            nexus
                .handle_data_update(
                    name,
                    "sensors",
                    "temperature",
                    Some(Value::Float(temperature)),
                    now,
                )
                .unwrap();
            nexus
                .handle_data_update(
                    name,
                    ADMIN_SERVICE,
                    LOCATION_RESOURCE,
                    Some(Value::Json(json!({
                        "type": "Point",
                        "coordinates": [longitude, 45.0],
                    }))),
                    now,
                )
                .unwrap();
        }
        nexus
    }

    #[test]
    fn full_snapshot() {
        let nexus = nexus();
        let snapshot = nexus.filtered_snapshot(&SnapshotFilter::new());

        assert_eq!(
            snapshot.iter().map(Snapshot::name).collect::<Vec<_>>(),
            vec!["north", "south"]
        );

        let north = &snapshot[0];
        assert_eq!(north.model, "weather");
        assert_eq!(
            north.resource("sensors", "temperature").map(|r| &r.value.value),
            Some(&Some(Value::Float(4.5)))
        );
        // Unset resources are part of the snapshot.
        assert!(!north.resource("sensors", "humidity").unwrap().is_set());
        assert!(north.location().is_some());
    }

    #[test]
    fn filters() {
        let nexus = nexus();

        // Provider and geographic filters.
        let filter = SnapshotFilter::new()
            .provider(|provider| provider.name != "north")
            .geo(|location| location.is_some());
        let snapshot = nexus.filtered_snapshot(&filter);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "south");

        // Location east of longitude 5.
        let filter = SnapshotFilter::new().geo(|location| {
            location
                .map(Value::to_json)
                .and_then(|json| json["coordinates"][0].as_f64())
                .is_some_and(|longitude| longitude > 5.0)
        });
        assert_eq!(nexus.filtered_snapshot(&filter)[0].name, "south");

        // Resource filter on values: empty services are pruned and
        // providers without services are dropped.
        let filter = SnapshotFilter::new().resource(|resource| {
            resource
                .value
                .value
                .as_ref()
                .and_then(|value| value.to_json().as_f64())
                .is_some_and(|temperature| temperature > 10.0)
        });
        let snapshot = nexus.filtered_snapshot(&filter);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "south");
        assert_eq!(snapshot[0].services.len(), 1);
        assert_eq!(snapshot[0].services[0].resources.len(), 1);

        // Service filter.
        let filter = SnapshotFilter::new().service(|service| service.name == ADMIN_SERVICE);
        let snapshot = nexus.filtered_snapshot(&filter);
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|provider| provider.service("sensors").is_none()));
    }

    #[test]
    fn single_snapshots() {
        let nexus = nexus();

        let service = nexus.snapshot_service("north", "sensors").unwrap();
        assert_eq!(service.resources.len(), 2);
        assert_eq!(service.provider, "north");

        let resource = nexus
            .snapshot_resource("south", "sensors", "temperature")
            .unwrap();
        assert_eq!(resource.value.value, Some(Value::Float(21.0)));
        assert!(resource.metadata.contains_key("timestamp"));

        assert!(nexus.snapshot_provider("east").is_none());
        assert!(nexus.snapshot_service("north", "missing").is_none());
        assert!(nexus.snapshot_resource("north", "sensors", "missing").is_none());
    }
}
