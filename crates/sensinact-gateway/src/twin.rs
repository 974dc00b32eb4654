use std::time::Duration;

use chrono::{TimeDelta, Utc};

use indexmap::map::IndexMap;

use sensinact::resource::{ActionParameter, ResourceType, ValueType};
use sensinact::snapshot::{
    Metadata, ProviderSnapshot, ResourceSnapshot, ServiceSnapshot, SnapshotFilter,
};
use sensinact::timed::{GetLevel, TimedValue, Timestamp};
use sensinact::value::{DataType, FromValue, Value};

use crate::error::{Error, ErrorKind, Result};
use crate::model::{ModelManager, ResourceDefinition};
use crate::nexus::{ModelNexus, ProviderNode};
use crate::scope::Scope;

/// The digital twin, as seen by a running command.
///
/// The twin and every handle obtained from it are only valid while the
/// command runs. Once the command completes, any access fails with
/// [`ErrorKind::InvalidHandle`].
#[derive(Debug)]
pub struct Twin<'cmd> {
    nexus: &'cmd mut ModelNexus,
    scope: Scope,
}

impl<'cmd> Twin<'cmd> {
    pub(crate) fn new(nexus: &'cmd mut ModelNexus, scope: Scope) -> Self {
        Self { nexus, scope }
    }

    fn check(&self) -> Result<()> {
        self.scope.check("twin")
    }

    /// Checks whether the twin can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Returns the [`ModelManager`] used to create and delete models.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn models(&mut self) -> Result<ModelManager<'_>> {
        self.check()?;
        Ok(ModelManager::new(self.nexus, self.scope.clone()))
    }

    /// Returns all providers.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn providers(&self) -> Result<Vec<Provider>> {
        self.check()?;
        Ok(self
            .nexus
            .providers()
            .map(|node| Provider::new(self.scope.clone(), node))
            .collect())
    }

    /// Returns all providers of a model.
    ///
    /// When no package URI is given, models are matched by name only.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn providers_of(&self, package_uri: Option<&str>, model: &str) -> Result<Vec<Provider>> {
        self.check()?;
        Ok(self
            .nexus
            .providers()
            .filter(|node| {
                node.model == model && package_uri.is_none_or(|uri| node.model_package_uri == uri)
            })
            .map(|node| Provider::new(self.scope.clone(), node))
            .collect())
    }

    /// Returns the provider with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn provider(&self, name: &str) -> Result<Option<Provider>> {
        self.provider_in(None, None, name)
    }

    /// Returns the provider with the given name, if it belongs to the
    /// given model.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn provider_in(
        &self,
        package_uri: Option<&str>,
        model: Option<&str>,
        name: &str,
    ) -> Result<Option<Provider>> {
        self.check()?;
        Ok(self
            .nexus
            .find_provider(package_uri, model, name)
            .map(|node| Provider::new(self.scope.clone(), node)))
    }

    /// Returns a service of a provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn service(&self, provider: &str, service: &str) -> Result<Option<Service>> {
        self.check()?;
        let Some(node) = self.nexus.provider(provider) else {
            return Ok(None);
        };
        Ok(self
            .nexus
            .service_definition(&node.model, service)
            .ok()
            .map(|_| Service::new(self.scope.clone(), node, service)))
    }

    /// Returns a resource of a provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn resource(&self, provider: &str, service: &str, resource: &str) -> Result<Option<Resource>> {
        self.check()?;
        Ok(self
            .nexus
            .definition_of(provider, service, resource)
            .ok()
            .map(|definition| Resource::new(self.scope.clone(), provider, service, definition)))
    }

    /// Returns the cached value of a resource, without invoking any
    /// external getter.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid or the stored
    /// value does not describe the requested type.
    pub fn resource_value<T: FromValue>(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<Option<TimedValue<T>>> {
        self.check()?;
        let Ok(value) = self.nexus.resource_value(provider, service, resource) else {
            return Ok(None);
        };
        Ok(Some(value.typed()?))
    }

    /// Creates a provider of a model, at the current instant.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid, the model
    /// does not exist or a provider with the same name exists.
    pub fn create_provider(&mut self, model: &str, name: &str) -> Result<Provider> {
        self.create_provider_in(None, model, name, None)
    }

    /// Creates a provider of a model, at the given instant.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid, the model
    /// does not exist or a provider with the same name exists.
    pub fn create_provider_at(
        &mut self,
        model: &str,
        name: &str,
        created: Timestamp,
    ) -> Result<Provider> {
        self.create_provider_in(None, model, name, Some(created))
    }

    /// Creates a provider of a model from a given package.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid, the model
    /// does not exist in the package or a provider with the same name exists.
    pub fn create_provider_in(
        &mut self,
        package_uri: Option<&str>,
        model: &str,
        name: &str,
        created: Option<Timestamp>,
    ) -> Result<Provider> {
        self.check()?;
        let node = self
            .nexus
            .create_provider(package_uri, model, name, created)?;
        Ok(Provider::new(self.scope.clone(), node))
    }

    /// Deletes a provider along with its links.
    ///
    /// Returns `false` when no provider of the given model has this name.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn delete_provider(&mut self, model: &str, name: &str) -> Result<bool> {
        self.check()?;
        Ok(self.nexus.delete_provider(model, name))
    }

    /// Takes a snapshot of the providers accepted by a filter.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn filtered_snapshot(&self, filter: &SnapshotFilter) -> Result<Vec<ProviderSnapshot>> {
        self.check()?;
        Ok(self.nexus.filtered_snapshot(filter))
    }

    /// Takes a snapshot of a provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn snapshot_provider(&self, provider: &str) -> Result<Option<ProviderSnapshot>> {
        self.check()?;
        Ok(self.nexus.snapshot_provider(provider))
    }

    /// Takes a snapshot of a service.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn snapshot_service(&self, provider: &str, service: &str) -> Result<Option<ServiceSnapshot>> {
        self.check()?;
        Ok(self.nexus.snapshot_service(provider, service))
    }

    /// Takes a snapshot of a resource.
    ///
    /// # Errors
    ///
    /// An error is returned when the twin is no longer valid.
    pub fn snapshot_resource(
        &self,
        provider: &str,
        service: &str,
        resource: &str,
    ) -> Result<Option<ResourceSnapshot>> {
        self.check()?;
        Ok(self.nexus.snapshot_resource(provider, service, resource))
    }
}

/// A provider handle.
#[derive(Debug, Clone)]
pub struct Provider {
    scope: Scope,
    model_package_uri: String,
    model: String,
    name: String,
}

impl Provider {
    fn new(scope: Scope, node: &ProviderNode) -> Self {
        Self {
            scope,
            model_package_uri: node.model_package_uri.clone(),
            model: node.model.clone(),
            name: node.name.clone(),
        }
    }

    fn check(&self, twin: &Twin<'_>) -> Result<()> {
        self.scope.check("provider")?;
        twin.check()
    }

    fn node<'a>(&self, twin: &'a Twin<'_>) -> Result<&'a ProviderNode> {
        self.check(twin)?;
        twin.nexus.provider_node(&self.name)
    }

    /// Checks whether the handle can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Returns the provider name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn name(&self) -> Result<&str> {
        self.scope.check("provider")?;
        Ok(&self.name)
    }

    /// Returns the provider model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn model(&self) -> Result<&str> {
        self.scope.check("provider")?;
        Ok(&self.model)
    }

    /// Returns the package URI of the provider model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn model_package_uri(&self) -> Result<&str> {
        self.scope.check("provider")?;
        Ok(&self.model_package_uri)
    }

    /// Returns the creation instant of the provider.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the
    /// provider has been deleted.
    pub fn created(&self, twin: &Twin<'_>) -> Result<Timestamp> {
        Ok(self.node(twin)?.created)
    }

    /// Returns every service declared by the provider model.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the
    /// provider has been deleted.
    pub fn services(&self, twin: &Twin<'_>) -> Result<Vec<Service>> {
        let node = self.node(twin)?;
        Ok(twin
            .nexus
            .model_definition(&node.model)?
            .services
            .keys()
            .map(|service| Service::new(self.scope.clone(), node, service))
            .collect())
    }

    /// Returns the service with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the
    /// provider has been deleted.
    pub fn service(&self, twin: &Twin<'_>, name: &str) -> Result<Option<Service>> {
        let node = self.node(twin)?;
        Ok(twin
            .nexus
            .service_definition(&node.model, name)
            .ok()
            .map(|_| Service::new(self.scope.clone(), node, name)))
    }

    /// Returns the providers linked to this one.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the
    /// provider has been deleted.
    pub fn linked_providers(&self, twin: &Twin<'_>) -> Result<Vec<Self>> {
        Ok(self
            .node(twin)?
            .links
            .iter()
            .filter_map(|name| twin.nexus.provider(name))
            .map(|node| Self::new(self.scope.clone(), node))
            .collect())
    }

    /// Links a provider to this one.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or one of the
    /// providers has been deleted.
    pub fn link(&self, twin: &mut Twin<'_>, child: &Self) -> Result<()> {
        self.check(twin)?;
        twin.nexus.link_providers(&self.name, child.name()?)
    }

    /// Unlinks a provider from this one.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or one of the
    /// providers has been deleted.
    pub fn unlink(&self, twin: &mut Twin<'_>, child: &Self) -> Result<()> {
        self.check(twin)?;
        twin.nexus.unlink_providers(&self.name, child.name()?)
    }

    /// Deletes the provider.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid.
    pub fn delete(&self, twin: &mut Twin<'_>) -> Result<bool> {
        self.check(twin)?;
        Ok(twin.nexus.delete_provider(&self.model, &self.name))
    }
}

/// A service handle.
#[derive(Debug, Clone)]
pub struct Service {
    scope: Scope,
    provider: String,
    model: String,
    name: String,
}

impl Service {
    fn new(scope: Scope, provider: &ProviderNode, name: &str) -> Self {
        Self {
            scope,
            provider: provider.name.clone(),
            model: provider.model.clone(),
            name: name.into(),
        }
    }

    /// Checks whether the handle can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Returns the service name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn name(&self) -> Result<&str> {
        self.scope.check("service")?;
        Ok(&self.name)
    }

    /// Returns the name of the owning provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn provider(&self) -> Result<&str> {
        self.scope.check("service")?;
        Ok(&self.provider)
    }

    /// Returns all resources of the service.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the service
    /// has been deleted.
    pub fn resources(&self, twin: &Twin<'_>) -> Result<Vec<Resource>> {
        self.scope.check("service")?;
        twin.check()?;
        Ok(twin
            .nexus
            .service_definition(&self.model, &self.name)?
            .resources
            .values()
            .map(|definition| {
                Resource::new(self.scope.clone(), &self.provider, &self.name, definition)
            })
            .collect())
    }

    /// Returns the resource with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the service
    /// has been deleted.
    pub fn resource(&self, twin: &Twin<'_>, name: &str) -> Result<Option<Resource>> {
        self.scope.check("service")?;
        twin.check()?;
        Ok(twin
            .nexus
            .service_definition(&self.model, &self.name)?
            .resources
            .get(name)
            .map(|definition| {
                Resource::new(self.scope.clone(), &self.provider, &self.name, definition)
            }))
    }
}

/// A resource handle.
///
/// Reading a resource follows its [`GetLevel`]:
///
/// - [`GetLevel::Weak`] always returns the cached value
/// - [`GetLevel::Normal`] invokes the external getter when the cached value
///   is missing or older than the cache duration
/// - [`GetLevel::Strong`] always invokes the external getter
///
/// Resources without an external getter always return the cached value.
#[derive(Debug, Clone)]
pub struct Resource {
    scope: Scope,
    provider: String,
    service: String,
    name: String,
    resource_type: ResourceType,
    value_type: ValueType,
    data_type: DataType,
    parameters: Vec<ActionParameter>,
}

impl Resource {
    fn new(scope: Scope, provider: &str, service: &str, definition: &ResourceDefinition) -> Self {
        Self {
            scope,
            provider: provider.into(),
            service: service.into(),
            name: definition.name.clone(),
            resource_type: definition.resource_type,
            value_type: definition.value_type,
            data_type: definition.data_type,
            parameters: definition.parameters.clone(),
        }
    }

    fn check(&self, twin: &Twin<'_>) -> Result<()> {
        self.scope.check("resource")?;
        twin.check()
    }

    fn path(&self) -> String {
        format!("{}/{}/{}", self.provider, self.service, self.name)
    }

    fn definition<'a>(&self, twin: &'a Twin<'_>) -> Result<&'a ResourceDefinition> {
        self.check(twin)?;
        twin.nexus
            .definition_of(&self.provider, &self.service, &self.name)
    }

    /// Checks whether the handle can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Returns the resource name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn name(&self) -> Result<&str> {
        self.scope.check("resource")?;
        Ok(&self.name)
    }

    /// Returns the name of the owning service.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn service(&self) -> Result<&str> {
        self.scope.check("resource")?;
        Ok(&self.service)
    }

    /// Returns the name of the owning provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn provider(&self) -> Result<&str> {
        self.scope.check("resource")?;
        Ok(&self.provider)
    }

    /// Returns the [`ResourceType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn resource_type(&self) -> Result<ResourceType> {
        self.scope.check("resource")?;
        Ok(self.resource_type)
    }

    /// Returns the [`ValueType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn value_type(&self) -> Result<ValueType> {
        self.scope.check("resource")?;
        Ok(self.value_type)
    }

    /// Returns the declared [`DataType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn data_type(&self) -> Result<DataType> {
        self.scope.check("resource")?;
        Ok(self.data_type)
    }

    /// Returns the parameters of an action.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid or the
    /// resource is not an action.
    pub fn arguments(&self) -> Result<&[ActionParameter]> {
        self.scope.check("resource")?;
        if !self.resource_type.is_action() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Resource `{}` is not an ACTION and has no arguments", self.path()),
            ));
        }
        Ok(&self.parameters)
    }

    fn not_a_value(&self) -> Error {
        Error::new(
            ErrorKind::UnsupportedOperation,
            format!(
                "Resource `{}` is an ACTION. ACTION resources only support the ACT operation",
                self.path()
            ),
        )
    }

    /// Reads the resource value as the given type.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the resource
    /// is an action, the external getter fails or the value does not
    /// describe the requested type.
    pub fn get_value<T: FromValue>(
        &self,
        twin: &mut Twin<'_>,
        level: GetLevel,
    ) -> Result<TimedValue<T>> {
        let definition = self.definition(twin)?;
        if definition.resource_type.is_action() {
            return Err(self.not_a_value());
        }
        let external_get = definition.external_get();

        let (provider, service, resource) = (&self.provider, &self.service, &self.name);
        let cached = twin.nexus.resource_value(provider, service, resource)?;

        let value = match (external_get, level) {
            (None, _) | (Some(_), GetLevel::Weak) => cached,
            (Some(_), GetLevel::Strong) => twin.nexus.pull_value(provider, service, resource)?,
            (Some(cache), GetLevel::Normal) => {
                if twin.nexus.has_get_handler(provider, service, resource)
                    && is_expired(cached.timestamp, cache)
                {
                    twin.nexus.pull_value(provider, service, resource)?
                } else {
                    cached
                }
            }
        };

        Ok(value.typed()?)
    }

    /// Sets the resource value.
    ///
    /// When the resource has an external setter, the committed value is the
    /// one computed by the setter. A missing timestamp means now.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the resource
    /// is an action, the external setter fails or the value cannot be
    /// converted to the resource type.
    pub fn set_value(
        &self,
        twin: &mut Twin<'_>,
        value: impl Into<Value>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        self.update(twin, Some(value.into()), timestamp)
    }

    /// Sets the resource value to nothing.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the resource
    /// is an action or the external setter fails.
    pub fn clear_value(&self, twin: &mut Twin<'_>, timestamp: Option<Timestamp>) -> Result<()> {
        self.update(twin, None, timestamp)
    }

    fn update(
        &self,
        twin: &mut Twin<'_>,
        value: Option<Value>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        let definition = self.definition(twin)?;
        if definition.resource_type.is_action() {
            return Err(self.not_a_value());
        }

        let (provider, service, resource) = (&self.provider, &self.service, &self.name);
        if definition.external_set() {
            twin.nexus.push_value(
                provider,
                service,
                resource,
                TimedValue::from_parts(value, timestamp),
            )
        } else {
            twin.nexus.handle_data_update(
                provider,
                service,
                resource,
                value,
                timestamp.unwrap_or_else(Utc::now),
            )
        }
    }

    /// Invokes an action with named arguments.
    ///
    /// Positional parameters are named `arg<position>`.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the resource
    /// is not an action, an argument cannot be converted to its declared
    /// type or the action handler fails.
    pub fn act<I, K>(&self, twin: &mut Twin<'_>, arguments: I) -> Result<Option<Value>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.check(twin)?;
        let arguments: IndexMap<String, Value> = arguments
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        twin.nexus
            .act(&self.provider, &self.service, &self.name, &arguments)
    }

    /// Returns a metadata value.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the
    /// metadata does not exist.
    pub fn metadata_value(&self, twin: &Twin<'_>, key: &str) -> Result<TimedValue> {
        self.check(twin)?;
        twin.nexus
            .metadata_value(&self.provider, &self.service, &self.name, key)
    }

    /// Returns all metadata values.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid.
    pub fn metadata_values(&self, twin: &Twin<'_>) -> Result<Metadata> {
        self.check(twin)?;
        twin.nexus
            .resource_metadata(&self.provider, &self.service, &self.name)
    }

    /// Sets a metadata value. A missing timestamp means now.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid or the key
    /// is invalid.
    pub fn set_metadata_value(
        &self,
        twin: &mut Twin<'_>,
        key: &str,
        value: impl Into<Value>,
        timestamp: Option<Timestamp>,
    ) -> Result<()> {
        self.check(twin)?;
        twin.nexus.set_metadata_value(
            &self.provider,
            &self.service,
            &self.name,
            key,
            Some(value.into()),
            timestamp.unwrap_or_else(Utc::now),
        )
    }
}

// The value expires strictly after the cache duration.
fn is_expired(timestamp: Option<Timestamp>, cache: Duration) -> bool {
    let Some(timestamp) = timestamp else {
        return true;
    };
    let cache = TimeDelta::from_std(cache).unwrap_or(TimeDelta::MAX);
    Utc::now()
        .checked_sub_signed(cache)
        .is_some_and(|threshold| threshold > timestamp)
}
