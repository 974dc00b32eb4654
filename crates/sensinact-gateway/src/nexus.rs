use chrono::{TimeDelta, Utc};

use indexmap::map::{Entry, IndexMap};
use indexmap::set::IndexSet;

use tracing::{debug, error, warn};

use sensinact::notification::{Address, Notification};
use sensinact::resource::{NullAction, ResourceMetadata, ValueType};
use sensinact::snapshot::{ADMIN_SERVICE, Metadata};
use sensinact::timed::{TimedValue, Timestamp};
use sensinact::value::Value;

use crate::error::{Error, ErrorKind, Result};
use crate::model::{
    FRIENDLY_NAME_RESOURCE, MODEL_URI_RESOURCE, ModelBuilder, ModelDefinition, ResourceBuilder,
    ResourceDefinition, ServiceBuilder, ServiceDefinition,
};
use crate::whiteboard::{
    ActCall, GetCall, RegistryKey, Requirement, SetCall, Target, Whiteboard, WhiteboardService,
    no_handler,
};

/// Name of the provider describing the gateway itself.
pub(crate) const SYSTEM_PROVIDER: &str = "sensiNact";
const SYSTEM_MODEL: &str = "sensinact";
const SYSTEM_SERVICE: &str = "system";
const SYSTEM_VERSION: f64 = 0.1;

/// Metadata entry holding the instant of the resource value.
pub(crate) const TIMESTAMP_METADATA: &str = "timestamp";

fn not_found(description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::NotFound, description)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ResourceNode {
    pub(crate) value: TimedValue,
    pub(crate) metadata: IndexMap<String, TimedValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ServiceNode {
    pub(crate) resources: IndexMap<String, ResourceNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProviderNode {
    pub(crate) model_package_uri: String,
    pub(crate) model: String,
    pub(crate) name: String,
    pub(crate) created: Timestamp,
    // Service instances are created on their first update.
    pub(crate) services: IndexMap<String, ServiceNode>,
    pub(crate) links: IndexSet<String>,
}

impl ProviderNode {
    pub(crate) fn address(&self) -> Address {
        Address::provider(&self.model_package_uri, &self.model, &self.name)
    }

    pub(crate) fn resource(&self, service: &str, resource: &str) -> Option<&ResourceNode> {
        self.services.get(service)?.resources.get(resource)
    }
}

/// The live twin graph along with the model registry and the handlers
/// serving external resources.
///
/// The nexus is owned by the gateway thread, so every access is already
/// serialized.
#[derive(Debug, Default)]
pub(crate) struct ModelNexus {
    models: IndexMap<String, ModelDefinition>,
    providers: IndexMap<String, ProviderNode>,
    whiteboard: Whiteboard,
    notifications: Vec<Notification>,
}

impl ModelNexus {
    pub(crate) fn new(system_provider: bool) -> Self {
        let mut nexus = Self::default();
        if system_provider {
            if let Err(e) = nexus.create_system_provider() {
                error!("Impossible to create the `{SYSTEM_PROVIDER}` provider: {e}");
            }
            let _ = nexus.take_notifications();
        }
        nexus
    }

    fn create_system_provider(&mut self) -> Result<()> {
        let started = Utc::now();
        let model = ModelBuilder::new(SYSTEM_MODEL)
            .with_created(started)
            .with_service(
                ServiceBuilder::new(SYSTEM_SERVICE)
                    .with_resource(
                        ResourceBuilder::new("version")
                            .with_initial_value(SYSTEM_VERSION)
                            .with_value_type(ValueType::Fixed),
                    )
                    .with_resource(
                        ResourceBuilder::new("started")
                            .with_initial_value(started)
                            .with_value_type(ValueType::Fixed),
                    ),
            );

        let _ = self.create_model(model)?;
        let _ = self.create_provider(None, SYSTEM_MODEL, SYSTEM_PROVIDER, Some(started))?;
        Ok(())
    }

    pub(crate) fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    // Models

    pub(crate) fn create_model(&mut self, model: ModelBuilder) -> Result<&ModelDefinition> {
        if self.models.contains_key(model.name()) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("There is an existing model with name `{}`", model.name()),
            ));
        }

        let definition = model.definition()?;
        let definition: &ModelDefinition = self
            .models
            .entry(definition.name.clone())
            .or_insert(definition);
        Ok(definition)
    }

    pub(crate) fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    pub(crate) fn models(&self) -> impl Iterator<Item = &ModelDefinition> {
        self.models.values()
    }

    pub(crate) fn model_definition(&self, name: &str) -> Result<&ModelDefinition> {
        self.models
            .get(name)
            .ok_or_else(|| not_found(format!("No model with name `{name}`")))
    }

    fn model_definition_mut(&mut self, name: &str) -> Result<&mut ModelDefinition> {
        self.models
            .get_mut(name)
            .ok_or_else(|| not_found(format!("No model with name `{name}`")))
    }

    pub(crate) fn service_definition(&self, model: &str, service: &str) -> Result<&ServiceDefinition> {
        self.model_definition(model)?
            .services
            .get(service)
            .ok_or_else(|| {
                not_found(format!(
                    "No service with name `{service}` in model `{model}`"
                ))
            })
    }

    pub(crate) fn resource_definition(
        &self,
        model: &str,
        service: &str,
        resource: &str,
    ) -> Result<&ResourceDefinition> {
        self.service_definition(model, service)?
            .resources
            .get(resource)
            .ok_or_else(|| {
                not_found(format!(
                    "No resource with name `{resource}` in service `{service}` of model `{model}`"
                ))
            })
    }

    pub(crate) fn create_service(
        &mut self,
        model: &str,
        service: ServiceBuilder,
    ) -> Result<&ServiceDefinition> {
        let service = service.definition(Utc::now())?;
        let definition = self.model_definition_mut(model)?;
        match definition.services.entry(service.name.clone()) {
            Entry::Occupied(_) => Err(Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "There is an existing service with name `{}` in model `{model}`",
                    service.name
                ),
            )),
            Entry::Vacant(entry) => Ok(&*entry.insert(service)),
        }
    }

    pub(crate) fn create_resource(
        &mut self,
        model: &str,
        service: &str,
        resource: ResourceBuilder,
    ) -> Result<&ResourceDefinition> {
        if service == ADMIN_SERVICE {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("The `{ADMIN_SERVICE}` service cannot be modified"),
            ));
        }

        let resource = resource.definition()?;
        let definition = self
            .model_definition_mut(model)?
            .services
            .get_mut(service)
            .ok_or_else(|| {
                not_found(format!(
                    "No service with name `{service}` in model `{model}`"
                ))
            })?;

        match definition.resources.entry(resource.name.clone()) {
            Entry::Occupied(_) => Err(Error::new(
                ErrorKind::AlreadyExists,
                format!(
                    "There is an existing resource with name `{}` in service `{service}`",
                    resource.name
                ),
            )),
            Entry::Vacant(entry) => Ok(&*entry.insert(resource)),
        }
    }

    pub(crate) fn delete_model(&mut self, name: &str) -> Result<()> {
        let _ = self.model_definition(name)?;
        if self.providers.values().any(|provider| provider.model == name) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("The model `{name}` still has providers"),
            ));
        }
        let _ = self.models.shift_remove(name);
        Ok(())
    }

    pub(crate) fn delete_service(&mut self, model: &str, service: &str) -> Result<()> {
        if service == ADMIN_SERVICE {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("The `{ADMIN_SERVICE}` service cannot be deleted"),
            ));
        }

        let _ = self.service_definition(model, service)?;
        let _ = self
            .model_definition_mut(model)?
            .services
            .shift_remove(service);

        for provider in self.providers.values_mut().filter(|p| p.model == model) {
            let _ = provider.services.shift_remove(service);
        }
        Ok(())
    }

    pub(crate) fn delete_resource(&mut self, model: &str, service: &str, resource: &str) -> Result<()> {
        if service == ADMIN_SERVICE {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("The resources of the `{ADMIN_SERVICE}` service cannot be deleted"),
            ));
        }

        let _ = self.resource_definition(model, service, resource)?;
        if let Some(definition) = self
            .model_definition_mut(model)?
            .services
            .get_mut(service)
        {
            let _ = definition.resources.shift_remove(resource);
        }

        for provider in self.providers.values_mut().filter(|p| p.model == model) {
            if let Some(instance) = provider.services.get_mut(service) {
                let _ = instance.resources.shift_remove(resource);
            }
        }
        Ok(())
    }

    // Providers

    pub(crate) fn provider(&self, name: &str) -> Option<&ProviderNode> {
        self.providers.get(name)
    }

    pub(crate) fn provider_node(&self, name: &str) -> Result<&ProviderNode> {
        self.providers
            .get(name)
            .ok_or_else(|| not_found(format!("No provider with name `{name}`")))
    }

    pub(crate) fn providers(&self) -> impl Iterator<Item = &ProviderNode> {
        self.providers.values()
    }

    pub(crate) fn find_provider(
        &self,
        package_uri: Option<&str>,
        model: Option<&str>,
        name: &str,
    ) -> Option<&ProviderNode> {
        self.providers.get(name).filter(|provider| {
            package_uri.is_none_or(|uri| provider.model_package_uri == uri)
                && model.is_none_or(|model| provider.model == model)
        })
    }

    pub(crate) fn create_provider(
        &mut self,
        package_uri: Option<&str>,
        model: &str,
        name: &str,
        created: Option<Timestamp>,
    ) -> Result<&ProviderNode> {
        if name.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "A provider name must not be empty",
            ));
        }

        if let Some(existing) = self.providers.get(name) {
            let description = if existing.model == model {
                format!("Provider `{name}` already exists with model `{model}`")
            } else {
                format!(
                    "Provider `{name}` already exists with a different model `{}`",
                    existing.model
                )
            };
            return Err(Error::new(ErrorKind::AlreadyExists, description));
        }

        let definition = self.model_definition(model)?;
        if let Some(uri) = package_uri.filter(|uri| *uri != definition.package_uri) {
            return Err(not_found(format!(
                "No model with name `{model}` in package `{uri}`"
            )));
        }

        let created = created.unwrap_or_else(Utc::now);
        let model_package_uri = definition.package_uri.clone();

        let mut initial_values = Vec::new();
        for service in definition.services.values() {
            for resource in service.resources.values() {
                if let Some(value) = &resource.initial_value {
                    initial_values.push((service.name.clone(), resource.name.clone(), value.clone()));
                }
            }
        }

        let provider = ProviderNode {
            model_package_uri: model_package_uri.clone(),
            model: model.into(),
            name: name.into(),
            created,
            services: IndexMap::new(),
            links: IndexSet::new(),
        };
        self.notifications.push(Notification::ProviderAdded {
            address: provider.address(),
            timestamp: created,
        });
        let _ = self.providers.insert(name.into(), provider);

        self.commit(
            name,
            ADMIN_SERVICE,
            FRIENDLY_NAME_RESOURCE,
            Some(Value::from(name)),
            created,
        );
        self.commit(
            name,
            ADMIN_SERVICE,
            MODEL_URI_RESOURCE,
            Some(Value::from(model_package_uri)),
            created,
        );
        for (service, resource, value) in initial_values {
            self.commit(name, &service, &resource, Some(value), created);
        }

        self.provider_node(name)
    }

    pub(crate) fn delete_provider(&mut self, model: &str, name: &str) -> bool {
        match self.providers.get(name) {
            None => return false,
            Some(provider) if provider.model != model => {
                warn!(
                    "Provider `{name}` has model `{}`, not `{model}`: nothing deleted",
                    provider.model
                );
                return false;
            }
            Some(_) => {}
        }

        let Some(provider) = self.providers.shift_remove(name) else {
            return false;
        };

        for other in self.providers.values_mut() {
            let _ = other.links.shift_remove(name);
        }

        self.notifications.push(Notification::ProviderRemoved {
            address: provider.address(),
            timestamp: Utc::now(),
        });
        true
    }

    pub(crate) fn link_providers(&mut self, parent: &str, child: &str) -> Result<()> {
        self.check_link(parent, child)?;
        if parent == child {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Provider `{parent}` cannot be linked to itself"),
            ));
        }

        let mut address = None;
        if let Some(provider) = self.providers.get_mut(parent) {
            if provider.links.insert(child.into()) {
                address = Some(provider.address());
            }
        }
        if let Some(provider) = self.providers.get_mut(child) {
            let _ = provider.links.insert(parent.into());
        }

        if let Some(parent) = address {
            self.notifications.push(Notification::ProvidersLinked {
                parent,
                child: child.into(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub(crate) fn unlink_providers(&mut self, parent: &str, child: &str) -> Result<()> {
        self.check_link(parent, child)?;

        let mut address = None;
        if let Some(provider) = self.providers.get_mut(parent) {
            if provider.links.shift_remove(child) {
                address = Some(provider.address());
            }
        }
        if let Some(provider) = self.providers.get_mut(child) {
            let _ = provider.links.shift_remove(parent);
        }

        if let Some(parent) = address {
            self.notifications.push(Notification::ProvidersUnlinked {
                parent,
                child: child.into(),
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    fn check_link(&self, parent: &str, child: &str) -> Result<()> {
        if !self.providers.contains_key(parent) {
            return Err(not_found(format!("No parent provider `{parent}`")));
        }
        if !self.providers.contains_key(child) {
            return Err(not_found(format!("No child provider `{child}`")));
        }
        Ok(())
    }

    // Values

    pub(crate) fn definition_of(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<&ResourceDefinition> {
        let node = self.provider_node(provider)?;
        self.resource_definition(&node.model, service, resource)
    }

    pub(crate) fn resource_node(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Option<&ResourceNode> {
        self.providers.get(provider)?.resource(service, resource)
    }

    // Creates the service instance when missing.
    fn resource_node_mut(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        timestamp: Timestamp,
    ) -> Option<(&mut ResourceNode, Address)> {
        let node = self.providers.get_mut(provider)?;
        let address = node.address().service(service);
        let instance = match node.services.entry(service.to_owned()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                self.notifications.push(Notification::ServiceAdded {
                    address: address.clone(),
                    timestamp,
                });
                entry.insert(ServiceNode::default())
            }
        };
        Some((
            instance.resources.entry(resource.to_owned()).or_default(),
            address.resource(resource),
        ))
    }

    fn commit(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        value: Option<Value>,
        timestamp: Timestamp,
    ) {
        let Some((node, address)) = self.resource_node_mut(provider, service, resource, timestamp)
        else {
            return;
        };
        let old = std::mem::replace(
            &mut node.value,
            TimedValue::from_parts(value.clone(), Some(timestamp)),
        )
        .value;

        self.notifications.push(Notification::ValueChanged {
            address,
            old,
            new: value,
            timestamp,
        });
    }

    pub(crate) fn resource_value(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<TimedValue> {
        let _ = self.definition_of(provider, service, resource)?;
        Ok(self
            .resource_node(provider, service, resource)
            .map(|node| node.value.clone())
            .unwrap_or_default())
    }

    /// Commits a value coming from the twin itself rather than from an
    /// external handler.
    ///
    /// An update older than the current value by more than a millisecond
    /// is dropped.
    pub(crate) fn handle_data_update(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        value: Option<Value>,
        timestamp: Timestamp,
    ) -> Result<()> {
        let definition = self.definition_of(provider, service, resource)?;
        if definition.resource_type.is_action() {
            return Err(Error::new(
                ErrorKind::UnsupportedOperation,
                format!("Resource `{provider}/{service}/{resource}` is an ACTION and has no value"),
            ));
        }
        let value = value
            .map(|value| value.convert(definition.data_type))
            .transpose()?;

        let previous = self
            .resource_node(provider, service, resource)
            .and_then(|node| node.value.timestamp);
        // An update at the latest representable instant is never stale.
        let stale_before = timestamp.checked_add_signed(TimeDelta::milliseconds(1));
        if previous.zip(stale_before).is_some_and(|(previous, limit)| previous > limit) {
            debug!(
                "Dropping the update of `{provider}/{service}/{resource}` at `{timestamp}`: the current value is more recent"
            );
            return Ok(());
        }

        self.commit(provider, service, resource, value, timestamp);
        Ok(())
    }

    // Metadata

    pub(crate) fn resource_metadata(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<Metadata> {
        let definition = self.definition_of(provider, service, resource)?;
        let node = self.resource_node(provider, service, resource);

        let mut metadata = Metadata::default();
        let _ = metadata.insert(
            TIMESTAMP_METADATA.into(),
            node.and_then(|node| node.value.timestamp)
                .map(Value::Timestamp),
        );

        if let Some(ResourceMetadata {
            external_get,
            external_set,
            external_get_cache,
        }) = definition.metadata
        {
            let _ = metadata.insert("externalGet".into(), Some(Value::Bool(external_get)));
            let _ = metadata.insert("externalSet".into(), Some(Value::Bool(external_set)));
            let cache = i64::try_from(external_get_cache.as_millis()).unwrap_or(i64::MAX);
            let _ = metadata.insert("externalGetCacheMs".into(), Some(Value::Int(cache)));
        }

        for (key, value) in &definition.default_metadata {
            let _ = metadata.insert(key.clone(), Some(value.clone()));
        }

        if let Some(node) = node {
            for (key, value) in &node.metadata {
                let _ = metadata.insert(key.clone(), value.value.clone());
            }
        }

        Ok(metadata)
    }

    pub(crate) fn metadata_value(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
        key: &str,
    ) -> Result<TimedValue> {
        let metadata = self.resource_metadata(provider, service, resource)?;
        let node = self.resource_node(provider, service, resource);

        if let Some(value) = node.and_then(|node| node.metadata.get(key)) {
            return Ok(value.clone());
        }

        let Some(value) = metadata.get(key) else {
            return Err(Error::new(
                ErrorKind::MetadataNotFound,
                format!("Resource metadata `{key}` not found on `{provider}/{service}/{resource}`"),
            ));
        };

        let timestamp = if key == TIMESTAMP_METADATA {
            node.and_then(|node| node.value.timestamp)
        } else {
            self.providers.get(provider).map(|node| node.created)
        };
        Ok(TimedValue::from_parts(value.clone(), timestamp))
    }

    pub(crate) fn set_metadata_value(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        key: &str,
        value: Option<Value>,
        timestamp: Timestamp,
    ) -> Result<()> {
        if key.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "A metadata key must not be empty",
            ));
        }
        if key == TIMESTAMP_METADATA {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("The `{TIMESTAMP_METADATA}` metadata follows the resource value"),
            ));
        }
        let _ = self.definition_of(provider, service, resource)?;

        let Some((node, address)) = self.resource_node_mut(provider, service, resource, timestamp)
        else {
            return Ok(());
        };
        let old = node
            .metadata
            .insert(
                key.into(),
                TimedValue::from_parts(value.clone(), Some(timestamp)),
            )
            .and_then(|old| old.value);

        self.notifications.push(Notification::MetadataChanged {
            address,
            key: key.into(),
            old,
            new: value,
            timestamp,
        });
        Ok(())
    }

    // External handlers

    fn target(&self, provider: &str, service: &str, resource: &str) -> Result<Target> {
        let node = self.provider_node(provider)?;
        Ok(Target {
            model_package_uri: node.model_package_uri.clone(),
            model: node.model.clone(),
            provider: provider.into(),
            service: service.into(),
            resource: resource.into(),
        })
    }

    pub(crate) fn has_get_handler(&self, provider: &str, service: &str, resource: &str) -> bool {
        self.target(provider, service, resource)
            .is_ok_and(|target| self.whiteboard.get_handler(&target).is_some())
    }

    /// Invokes the getter of a resource and commits what it produces.
    pub(crate) fn pull_value(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<TimedValue> {
        let data_type = self.definition_of(provider, service, resource)?.data_type;
        let target = self.target(provider, service, resource)?;
        let handler = self
            .whiteboard
            .get_handler(&target)
            .ok_or_else(|| no_handler(&target))?;
        let cached = self.resource_value(provider, service, resource)?;

        let pulled = (handler.handler)(&GetCall {
            target: &target,
            result_type: data_type,
            cached: &cached,
        })?;
        let timestamp = pulled.timestamp.unwrap_or_else(Utc::now);

        let value = match (pulled.value, handler.on_null) {
            (Some(value), _) => Some(value),
            (None, NullAction::Ignore) => return Ok(cached),
            (None, NullAction::UpdateIfPresent) if cached.value.is_none() => return Ok(cached),
            (None, NullAction::UpdateIfPresent | NullAction::Update) => None,
        };

        self.handle_data_update(provider, service, resource, value, timestamp)?;
        self.resource_value(provider, service, resource)
    }

    /// Invokes the setter of a resource and commits the value it computes.
    pub(crate) fn push_value(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        new_value: TimedValue,
    ) -> Result<()> {
        let data_type = self.definition_of(provider, service, resource)?.data_type;
        let target = self.target(provider, service, resource)?;
        let handler = self.whiteboard.set_handler(&target)?;
        let cached = self.resource_value(provider, service, resource)?;

        let new_value = TimedValue::from_parts(
            new_value
                .value
                .map(|value| value.convert(data_type))
                .transpose()?,
            new_value.timestamp,
        );

        let computed = (handler.handler)(&SetCall {
            target: &target,
            result_type: data_type,
            cached: &cached,
            new_value: &new_value,
        })?;

        if computed.is_empty() {
            debug!("The setter of `{target}` produced no value");
            return Ok(());
        }

        let timestamp = computed
            .timestamp
            .or(new_value.timestamp)
            .unwrap_or_else(Utc::now);
        self.handle_data_update(provider, service, resource, computed.value, timestamp)
    }

    pub(crate) fn act(
        &mut self,
        provider: &str,
        service: &str,
        resource: &str,
        arguments: &IndexMap<String, Value>,
    ) -> Result<Option<Value>> {
        let definition = self.definition_of(provider, service, resource)?;
        if !definition.resource_type.is_action() {
            return Err(Error::new(
                ErrorKind::UnsupportedOperation,
                format!(
                    "Resource `{provider}/{service}/{resource}` is not an ACTION. Only ACTION resources can use the ACT operation"
                ),
            ));
        }
        let returns = definition.data_type;

        let target = self.target(provider, service, resource)?;
        let handler = self.whiteboard.act_handler(&target)?;
        let arguments = handler.bind(&target, arguments)?;

        (handler.handler)(&ActCall {
            target: &target,
            arguments: &arguments,
        })?
        .map(|value| value.convert(returns))
        .transpose()
        .map_err(Error::from)
    }

    // Whiteboard

    pub(crate) fn register_whiteboard_service(&mut self, service: WhiteboardService) -> Result<()> {
        let requirements = self.whiteboard.add_service(service)?;
        for (key, requirement) in requirements {
            self.make_resource(&key, requirement);
        }
        Ok(())
    }

    pub(crate) fn update_whiteboard_service(
        &mut self,
        service_id: u64,
        providers: &IndexSet<String>,
    ) -> bool {
        self.whiteboard.update_service(service_id, providers)
    }

    pub(crate) fn remove_whiteboard_service(&mut self, service_id: u64) -> bool {
        self.whiteboard.remove_service(service_id)
    }

    // Creates the model elements served by the handlers.
    fn make_resource(&mut self, key: &RegistryKey, requirement: Requirement) {
        match self.models.get(&key.model) {
            None => {
                let model =
                    ModelBuilder::new(&key.model).with_package_uri(&key.model_package_uri);
                if let Err(e) = self.create_model(model) {
                    error!("Impossible to create model `{}`: {e}", key.model);
                    return;
                }
            }
            Some(model) if model.package_uri != key.model_package_uri => {
                warn!(
                    "Model `{}` has package `{}`, handlers for `{}` are unreachable",
                    key.model, model.package_uri, key.model_package_uri
                );
            }
            Some(_) => {}
        }

        if self.service_definition(&key.model, &key.service).is_err() {
            if let Err(e) = self.create_service(&key.model, ServiceBuilder::new(&key.service)) {
                error!("Impossible to create service `{key}`: {e}");
                return;
            }
        }

        if self
            .resource_definition(&key.model, &key.service, &key.resource)
            .is_err()
        {
            let resource = match requirement {
                Requirement::Action {
                    parameters,
                    returns,
                } => ResourceBuilder::new(&key.resource)
                    .with_type(returns)
                    .with_action_parameters(parameters),
                Requirement::Value {
                    getter,
                    setter,
                    data_type,
                } => {
                    let mut resource = ResourceBuilder::new(&key.resource).with_type(data_type);
                    if let Some(cache) = getter {
                        resource = resource.with_getter_cache(cache);
                    }
                    if setter {
                        resource = resource.with_setter();
                    }
                    resource
                }
            };
            if let Err(e) = self.create_resource(&key.model, &key.service, resource) {
                error!("Impossible to create resource `{key}`: {e}");
            }
            return;
        }

        let Some(definition) = self
            .models
            .get_mut(&key.model)
            .and_then(|model| model.services.get_mut(&key.service))
            .and_then(|service| service.resources.get_mut(&key.resource))
        else {
            return;
        };

        match (requirement, definition.resource_type.is_action(), definition.metadata) {
            (Requirement::Value { getter, setter, .. }, false, Some(mut metadata)) => {
                if let Some(cache) = getter {
                    metadata = metadata.external_get(cache);
                }
                if setter {
                    metadata = metadata.external_set();
                }
                definition.metadata = Some(metadata);
            }
            (Requirement::Action { .. }, true, _) => {}
            _ => error!(
                "Updating resource of type {:?} is not allowed",
                definition.resource_type
            ),
        }
    }
}
