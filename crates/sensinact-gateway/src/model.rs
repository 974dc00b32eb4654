use std::time::Duration;

use chrono::Utc;

use indexmap::map::IndexMap;

use sensinact::default_package_uri;
use sensinact::resource::{ActionParameter, ResourceMetadata, ResourceType, ValueType};
use sensinact::snapshot::{ADMIN_SERVICE, LOCATION_RESOURCE};
use sensinact::timed::Timestamp;
use sensinact::value::{DataType, Value};

use crate::error::{Error, ErrorKind, Result};
use crate::nexus::ModelNexus;
use crate::scope::Scope;

/// Name of the administrative resource holding the provider friendly name.
pub const FRIENDLY_NAME_RESOURCE: &str = "friendlyName";
/// Name of the administrative resource holding the provider model URI.
pub const MODEL_URI_RESOURCE: &str = "modelUri";

fn invalid_argument(description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
    Error::new(ErrorKind::InvalidArgument, description)
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResourceDefinition {
    pub(crate) name: String,
    pub(crate) resource_type: ResourceType,
    pub(crate) value_type: ValueType,
    pub(crate) data_type: DataType,
    pub(crate) initial_value: Option<Value>,
    pub(crate) default_metadata: IndexMap<String, Value>,
    // Absent for administrative resources.
    pub(crate) metadata: Option<ResourceMetadata>,
    pub(crate) parameters: Vec<ActionParameter>,
}

impl ResourceDefinition {
    fn admin(name: &str, value_type: ValueType, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            resource_type: ResourceType::Property,
            value_type,
            data_type,
            initial_value: None,
            default_metadata: IndexMap::new(),
            metadata: None,
            parameters: Vec::new(),
        }
    }

    pub(crate) fn external_get(&self) -> Option<Duration> {
        self.metadata
            .filter(|metadata| metadata.external_get)
            .map(|metadata| metadata.external_get_cache)
    }

    pub(crate) fn external_set(&self) -> bool {
        self.metadata.is_some_and(|metadata| metadata.external_set)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ServiceDefinition {
    pub(crate) name: String,
    pub(crate) created: Timestamp,
    pub(crate) resources: IndexMap<String, ResourceDefinition>,
}

impl ServiceDefinition {
    fn admin(created: Timestamp) -> Self {
        let resources = [
            ResourceDefinition::admin(
                FRIENDLY_NAME_RESOURCE,
                ValueType::Modifiable,
                DataType::String,
            ),
            ResourceDefinition::admin(MODEL_URI_RESOURCE, ValueType::Fixed, DataType::String),
            ResourceDefinition::admin(LOCATION_RESOURCE, ValueType::Modifiable, DataType::Json),
        ];

        Self {
            name: ADMIN_SERVICE.into(),
            created,
            resources: resources
                .into_iter()
                .map(|resource| (resource.name.clone(), resource))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ModelDefinition {
    pub(crate) package_uri: String,
    pub(crate) name: String,
    pub(crate) created: Timestamp,
    pub(crate) services: IndexMap<String, ServiceDefinition>,
}

/// A resource description used to create a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceBuilder {
    name: String,
    resource_type: ResourceType,
    value_type: ValueType,
    data_type: DataType,
    initial_value: Option<Value>,
    default_metadata: IndexMap<String, Value>,
    getter: Option<Duration>,
    setter: bool,
    parameters: Vec<ActionParameter>,
}

impl ResourceBuilder {
    /// Creates a [`ResourceBuilder`].
    ///
    /// The resource is an updatable sensor accepting any value.
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: ResourceType::default(),
            value_type: ValueType::default(),
            data_type: DataType::Any,
            initial_value: None,
            default_metadata: IndexMap::new(),
            getter: None,
            setter: false,
            parameters: Vec::new(),
        }
    }

    /// Sets the declared [`DataType`].
    ///
    /// When no type is declared, the type of the initial value is used.
    #[must_use]
    #[inline]
    pub const fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Sets the value committed when a provider is created.
    #[must_use]
    #[inline]
    pub fn with_initial_value(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    /// Sets the [`ValueType`].
    #[must_use]
    #[inline]
    pub const fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Sets the [`ResourceType`].
    #[must_use]
    #[inline]
    pub const fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    /// Adds a default metadata entry.
    #[must_use]
    #[inline]
    pub fn with_default_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.default_metadata.insert(key.into(), value.into());
        self
    }

    /// Reads of the resource invoke an external getter, and pulled values
    /// never expire.
    #[must_use]
    #[inline]
    pub const fn with_getter(self) -> Self {
        self.with_getter_cache(Duration::ZERO)
    }

    /// Reads of the resource invoke an external getter, and pulled values
    /// stay valid for the given duration.
    #[must_use]
    #[inline]
    pub const fn with_getter_cache(mut self, cache: Duration) -> Self {
        self.getter = Some(cache);
        self
    }

    /// Writes of the resource invoke an external setter.
    #[must_use]
    #[inline]
    pub const fn with_setter(mut self) -> Self {
        self.setter = true;
        self
    }

    /// Turns the resource into an action accepting the given parameters.
    ///
    /// The declared type becomes the type of the action result.
    #[must_use]
    #[inline]
    pub fn with_action_parameters(
        mut self,
        parameters: impl IntoIterator<Item = ActionParameter>,
    ) -> Self {
        self.resource_type = ResourceType::Action;
        self.parameters = parameters.into_iter().collect();
        self
    }

    pub(crate) fn definition(self) -> Result<ResourceDefinition> {
        if self.name.is_empty() {
            return Err(invalid_argument("A resource name must not be empty"));
        }

        if self.resource_type.is_action() {
            if self.getter.is_some() || self.setter {
                return Err(invalid_argument(format!(
                    "The action resource `{}` cannot have a getter or a setter",
                    self.name
                )));
            }
            if self.initial_value.is_some() {
                return Err(invalid_argument(format!(
                    "The action resource `{}` cannot have an initial value",
                    self.name
                )));
            }
        } else if !self.parameters.is_empty() {
            return Err(invalid_argument(format!(
                "Only action resources have parameters, `{}` is a {:?}",
                self.name, self.resource_type
            )));
        }

        let data_type = match (&self.initial_value, self.data_type) {
            (Some(value), DataType::Any) => value.data_type(),
            (_, data_type) => data_type,
        };

        let initial_value = self
            .initial_value
            .map(|value| value.convert(data_type))
            .transpose()?;

        let mut metadata = ResourceMetadata::new();
        if let Some(cache) = self.getter {
            metadata = metadata.external_get(cache);
        }
        if self.setter {
            metadata = metadata.external_set();
        }

        Ok(ResourceDefinition {
            name: self.name,
            resource_type: self.resource_type,
            value_type: self.value_type,
            data_type,
            initial_value,
            default_metadata: self.default_metadata,
            metadata: Some(metadata),
            parameters: self.parameters,
        })
    }
}

/// A service description used to create a service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBuilder {
    name: String,
    resources: Vec<ResourceBuilder>,
}

impl ServiceBuilder {
    /// Creates a [`ServiceBuilder`].
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    /// Adds a resource.
    #[must_use]
    #[inline]
    pub fn with_resource(mut self, resource: ResourceBuilder) -> Self {
        self.resources.push(resource);
        self
    }

    pub(crate) fn definition(self, created: Timestamp) -> Result<ServiceDefinition> {
        if self.name.is_empty() {
            return Err(invalid_argument("A service name must not be empty"));
        }

        let mut resources = IndexMap::new();
        for resource in self.resources {
            let resource = resource.definition()?;
            if resources.contains_key(&resource.name) {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!(
                        "There is an existing resource with name `{}` in service `{}`",
                        resource.name, self.name
                    ),
                ));
            }
            let _ = resources.insert(resource.name.clone(), resource);
        }

        Ok(ServiceDefinition {
            name: self.name,
            created,
            resources,
        })
    }
}

/// A model description used to create a model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBuilder {
    package_uri: Option<String>,
    name: String,
    created: Option<Timestamp>,
    services: Vec<ServiceBuilder>,
}

impl ModelBuilder {
    /// Creates a [`ModelBuilder`].
    #[must_use]
    #[inline]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            package_uri: None,
            name: name.into(),
            created: None,
            services: Vec::new(),
        }
    }

    /// Sets the package URI.
    ///
    /// When no package URI is given, a default one is derived from the
    /// model name.
    #[must_use]
    #[inline]
    pub fn with_package_uri(mut self, package_uri: impl Into<String>) -> Self {
        self.package_uri = Some(package_uri.into());
        self
    }

    /// Sets the creation instant.
    #[must_use]
    #[inline]
    pub const fn with_created(mut self, created: Timestamp) -> Self {
        self.created = Some(created);
        self
    }

    /// Adds a service.
    #[must_use]
    #[inline]
    pub fn with_service(mut self, service: ServiceBuilder) -> Self {
        self.services.push(service);
        self
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn definition(self) -> Result<ModelDefinition> {
        if self.name.is_empty() {
            return Err(invalid_argument("A model name must not be empty"));
        }

        let created = self.created.unwrap_or_else(Utc::now);
        let package_uri = self
            .package_uri
            .unwrap_or_else(|| default_package_uri(&self.name));

        let admin = ServiceDefinition::admin(created);
        let mut services = IndexMap::new();
        let _ = services.insert(admin.name.clone(), admin);

        for service in self.services {
            let service = service.definition(created)?;
            if services.contains_key(&service.name) {
                return Err(Error::new(
                    ErrorKind::AlreadyExists,
                    format!(
                        "There is an existing service with name `{}` in model `{}`",
                        service.name, self.name
                    ),
                ));
            }
            let _ = services.insert(service.name.clone(), service);
        }

        Ok(ModelDefinition {
            package_uri,
            name: self.name,
            created,
            services,
        })
    }
}

/// A model handle, valid only during the command that created it.
#[derive(Debug, Clone)]
pub struct Model {
    scope: Scope,
    package_uri: String,
    name: String,
    created: Timestamp,
}

impl Model {
    fn new(scope: Scope, definition: &ModelDefinition) -> Self {
        Self {
            scope,
            package_uri: definition.package_uri.clone(),
            name: definition.name.clone(),
            created: definition.created,
        }
    }

    /// Checks whether the handle can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Returns the model name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn name(&self) -> Result<&str> {
        self.scope.check("model")?;
        Ok(&self.name)
    }

    /// Returns the model package URI.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn package_uri(&self) -> Result<&str> {
        self.scope.check("model")?;
        Ok(&self.package_uri)
    }

    /// Returns the creation instant of the model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn created(&self) -> Result<Timestamp> {
        self.scope.check("model")?;
        Ok(self.created)
    }

    /// Returns all services of the model, including the administrative one.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid or the model
    /// has been deleted.
    pub fn services(&self, models: &ModelManager<'_>) -> Result<Vec<Service>> {
        self.scope.check("model")?;
        let definition = models.nexus.model_definition(&self.name)?;
        Ok(definition
            .services
            .values()
            .map(|service| Service::new(self.scope.clone(), &self.name, service))
            .collect())
    }

    /// Returns the service with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid or the model
    /// has been deleted.
    pub fn service(&self, models: &ModelManager<'_>, name: &str) -> Result<Option<Service>> {
        self.scope.check("model")?;
        let definition = models.nexus.model_definition(&self.name)?;
        Ok(definition
            .services
            .get(name)
            .map(|service| Service::new(self.scope.clone(), &self.name, service)))
    }
}

/// A service handle, valid only during the command that created it.
#[derive(Debug, Clone)]
pub struct Service {
    scope: Scope,
    model: String,
    name: String,
    created: Timestamp,
}

impl Service {
    fn new(scope: Scope, model: &str, definition: &ServiceDefinition) -> Self {
        Self {
            scope,
            model: model.into(),
            name: definition.name.clone(),
            created: definition.created,
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

    /// Returns the name of the owning model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn model(&self) -> Result<&str> {
        self.scope.check("service")?;
        Ok(&self.model)
    }

    /// Returns the creation instant of the service.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn created(&self) -> Result<Timestamp> {
        self.scope.check("service")?;
        Ok(self.created)
    }

    /// Returns all resources of the service.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid or the
    /// service has been deleted.
    pub fn resources(&self, models: &ModelManager<'_>) -> Result<Vec<Resource>> {
        self.scope.check("service")?;
        let definition = models.nexus.service_definition(&self.model, &self.name)?;
        Ok(definition
            .resources
            .values()
            .map(|resource| Resource::new(self.scope.clone(), &self.model, &self.name, resource))
            .collect())
    }

    /// Returns the resource with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid or the
    /// service has been deleted.
    pub fn resource(&self, models: &ModelManager<'_>, name: &str) -> Result<Option<Resource>> {
        self.scope.check("service")?;
        let definition = models.nexus.service_definition(&self.model, &self.name)?;
        Ok(definition
            .resources
            .get(name)
            .map(|resource| Resource::new(self.scope.clone(), &self.model, &self.name, resource)))
    }
}

/// A resource definition handle, valid only during the command that
/// created it.
#[derive(Debug, Clone)]
pub struct Resource {
    scope: Scope,
    model: String,
    service: String,
    definition: ResourceDefinition,
}

impl Resource {
    fn new(scope: Scope, model: &str, service: &str, definition: &ResourceDefinition) -> Self {
        Self {
            scope,
            model: model.into(),
            service: service.into(),
            definition: definition.clone(),
        }
    }

    fn checked(&self) -> Result<&ResourceDefinition> {
        self.scope.check("resource")?;
        Ok(&self.definition)
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
        Ok(&self.checked()?.name)
    }

    /// Returns the name of the owning model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn model(&self) -> Result<&str> {
        self.scope.check("resource")?;
        Ok(&self.model)
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

    /// Returns the [`ResourceType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn resource_type(&self) -> Result<ResourceType> {
        Ok(self.checked()?.resource_type)
    }

    /// Returns the [`ValueType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn value_type(&self) -> Result<ValueType> {
        Ok(self.checked()?.value_type)
    }

    /// Returns the declared [`DataType`].
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn data_type(&self) -> Result<DataType> {
        Ok(self.checked()?.data_type)
    }

    /// Returns the value committed when a provider is created.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn initial_value(&self) -> Result<Option<&Value>> {
        Ok(self.checked()?.initial_value.as_ref())
    }

    /// Returns how the resource reaches external handlers, if it does.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn metadata(&self) -> Result<Option<ResourceMetadata>> {
        Ok(self.checked()?.metadata)
    }

    /// Returns the action parameters.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid.
    pub fn parameters(&self) -> Result<&[ActionParameter]> {
        Ok(&self.checked()?.parameters)
    }
}

/// Creates, inspects and deletes models.
///
/// A [`ModelManager`] is only available while a command runs.
#[derive(Debug)]
pub struct ModelManager<'cmd> {
    nexus: &'cmd mut ModelNexus,
    scope: Scope,
}

impl<'cmd> ModelManager<'cmd> {
    pub(crate) fn new(nexus: &'cmd mut ModelNexus, scope: Scope) -> Self {
        Self { nexus, scope }
    }

    /// Checks whether the manager can still be used.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.scope.is_active()
    }

    /// Creates a model.
    ///
    /// # Errors
    ///
    /// An error is returned when a model with the same name exists or the
    /// description is invalid.
    pub fn create_model(&mut self, model: ModelBuilder) -> Result<Model> {
        self.scope.check("model manager")?;
        let definition = self.nexus.create_model(model)?;
        Ok(Model::new(self.scope.clone(), definition))
    }

    /// Returns the model with the given name.
    ///
    /// # Errors
    ///
    /// An error is returned when the manager is no longer valid.
    pub fn model(&self, name: &str) -> Result<Option<Model>> {
        self.scope.check("model manager")?;
        Ok(self
            .nexus
            .model(name)
            .map(|definition| Model::new(self.scope.clone(), definition)))
    }

    /// Returns all models.
    ///
    /// # Errors
    ///
    /// An error is returned when the manager is no longer valid.
    pub fn models(&self) -> Result<Vec<Model>> {
        self.scope.check("model manager")?;
        Ok(self
            .nexus
            .models()
            .map(|definition| Model::new(self.scope.clone(), definition))
            .collect())
    }

    /// Adds a service to an existing model.
    ///
    /// Providers of the model gain the service as well.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the model does
    /// not exist or a service with the same name exists.
    pub fn create_service(&mut self, model: &Model, service: ServiceBuilder) -> Result<Service> {
        self.scope.check("model manager")?;
        let name = model.name()?.to_owned();
        let definition = self.nexus.create_service(&name, service)?;
        Ok(Service::new(self.scope.clone(), &name, definition))
    }

    /// Adds a resource to an existing service.
    ///
    /// # Errors
    ///
    /// An error is returned when a handle is no longer valid, the service
    /// does not exist or a resource with the same name exists.
    pub fn create_resource(
        &mut self,
        service: &Service,
        resource: ResourceBuilder,
    ) -> Result<Resource> {
        self.scope.check("model manager")?;
        let model = service.model()?.to_owned();
        let name = service.name()?.to_owned();
        let definition = self.nexus.create_resource(&model, &name, resource)?;
        Ok(Resource::new(self.scope.clone(), &model, &name, definition))
    }

    /// Deletes a model.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid, the model
    /// does not exist or providers of the model still exist.
    pub fn delete_model(&mut self, model: &Model) -> Result<()> {
        self.scope.check("model manager")?;
        self.nexus.delete_model(model.name()?)
    }

    /// Deletes a service along with its values on every provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid, the service
    /// does not exist or it is the administrative service.
    pub fn delete_service(&mut self, service: &Service) -> Result<()> {
        self.scope.check("model manager")?;
        self.nexus.delete_service(service.model()?, service.name()?)
    }

    /// Deletes a resource along with its values on every provider.
    ///
    /// # Errors
    ///
    /// An error is returned when the handle is no longer valid, the resource
    /// does not exist or it belongs to the administrative service.
    pub fn delete_resource(&mut self, resource: &Resource) -> Result<()> {
        self.scope.check("model manager")?;
        self.nexus
            .delete_resource(resource.model()?, resource.service()?, resource.name()?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sensinact::resource::{ActionParameter, ResourceMetadata, ResourceType};
    use sensinact::snapshot::ADMIN_SERVICE;
    use sensinact::value::{DataType, Value};

    use crate::error::{Error, ErrorKind};
    use crate::nexus::ModelNexus;
    use crate::scope::Scopes;

    use super::{ModelBuilder, ModelManager, ResourceBuilder, ServiceBuilder};

    #[test]
    fn resource_definition() {
        let definition = ResourceBuilder::new("foobar")
            .with_initial_value(42)
            .with_getter_cache(Duration::from_secs(1))
            .definition()
            .unwrap();

        // Type inferred from the initial value.
        assert_eq!(definition.data_type, DataType::Int);
        assert_eq!(definition.initial_value, Some(Value::Int(42)));
        assert_eq!(
            definition.metadata,
            Some(ResourceMetadata::new().external_get(Duration::from_secs(1)))
        );

        // Initial value converted to the declared type.
        let definition = ResourceBuilder::new("text")
            .with_type(DataType::String)
            .with_initial_value(5)
            .definition()
            .unwrap();
        assert_eq!(definition.initial_value, Some(Value::from("5")));

        // Actions cannot have getters.
        assert_eq!(
            ResourceBuilder::new("act")
                .with_action_parameters([ActionParameter::new("arg0", DataType::Int)])
                .with_getter()
                .definition(),
            Err(Error::new(
                ErrorKind::InvalidArgument,
                "The action resource `act` cannot have a getter or a setter"
            ))
        );

        // Empty name.
        assert_eq!(
            ResourceBuilder::new("").definition().map_err(|e| e.kind()),
            Err(ErrorKind::InvalidArgument)
        );
    }

    #[test]
    fn model_definition() {
        let definition = ModelBuilder::new("providerModel")
            .with_service(
                ServiceBuilder::new("bar").with_resource(
                    ResourceBuilder::new("foobar")
                        .with_type(DataType::Int)
                        .with_initial_value(42),
                ),
            )
            .definition()
            .unwrap();

        assert_eq!(
            definition.package_uri,
            "https://eclipse.org/sensinact/providerModel"
        );
        assert_eq!(
            definition.services.keys().collect::<Vec<_>>(),
            vec![ADMIN_SERVICE, "bar"]
        );

        // The administrative service is reserved.
        assert_eq!(
            ModelBuilder::new("model")
                .with_service(ServiceBuilder::new(ADMIN_SERVICE))
                .definition(),
            Err(Error::new(
                ErrorKind::AlreadyExists,
                "There is an existing service with name `admin` in model `model`"
            ))
        );

        // Duplicated resources.
        assert_eq!(
            ServiceBuilder::new("svc")
                .with_resource(ResourceBuilder::new("a"))
                .with_resource(ResourceBuilder::new("a"))
                .definition(chrono::Utc::now())
                .map_err(|e| e.kind()),
            Err(ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn model_manager() {
        let mut nexus = ModelNexus::new(false);
        let mut scopes = Scopes::new();
        let scope = scopes.open();
        let mut models = ModelManager::new(&mut nexus, scope);

        let model = models.create_model(ModelBuilder::new("testModel")).unwrap();
        assert_eq!(model.name().unwrap(), "testModel");

        // Duplicated model.
        assert_eq!(
            models
                .create_model(ModelBuilder::new("testModel"))
                .map(|_| ())
                .map_err(|e| e.kind()),
            Err(ErrorKind::AlreadyExists)
        );

        let service = models
            .create_service(&model, ServiceBuilder::new("testService"))
            .unwrap();
        let resource = models
            .create_resource(
                &service,
                ResourceBuilder::new("testAction").with_action_parameters([
                    ActionParameter::new("arg0", DataType::Int),
                    ActionParameter::new("arg1", DataType::String),
                ]),
            )
            .unwrap();

        assert_eq!(resource.resource_type().unwrap(), ResourceType::Action);
        assert_eq!(resource.parameters().unwrap().len(), 2);

        let services = model.services(&models).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(
            service.resource(&models, "testAction").unwrap().unwrap().name().unwrap(),
            "testAction"
        );

        // Deleting the resource and the service.
        models.delete_resource(&resource).unwrap();
        assert!(service.resource(&models, "testAction").unwrap().is_none());
        models.delete_service(&service).unwrap();
        assert!(model.service(&models, "testService").unwrap().is_none());

        models.delete_model(&model).unwrap();
        assert!(models.model("testModel").unwrap().is_none());

        // Closed command.
        scopes.close();
        assert!(!model.is_valid());
        assert!(!service.is_valid());
        assert!(!resource.is_valid());
        assert_eq!(model.name().map_err(|e| e.kind()), Err(ErrorKind::InvalidHandle));
        assert_eq!(
            resource.data_type().map_err(|e| e.kind()),
            Err(ErrorKind::InvalidHandle)
        );
    }
}
