use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;

use indexmap::set::IndexSet;

use tracing::warn;

use sensinact::default_package_uri;
use sensinact::resource::{ActionParameter, NullAction};
use sensinact::timed::TimedValue;
use sensinact::value::{DataType, FromValue, Value};

use crate::error::{Error, ErrorKind, Result};

type ActFn = dyn Fn(&ActCall<'_>) -> Result<Option<Value>> + Send + Sync;
type GetFn = dyn Fn(&GetCall<'_>) -> Result<TimedValue> + Send + Sync;
type SetFn = dyn Fn(&SetCall<'_>) -> Result<TimedValue> + Send + Sync;

/// A segment of the location of the resource targeted by a handler call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UriSegment {
    /// Package URI of the provider model.
    ModelPackageUri,
    /// Provider model.
    Model,
    /// Provider name.
    Provider,
    /// Service name.
    Service,
    /// Resource name.
    Resource,
    /// The whole `model/provider/service/resource` path.
    Uri,
}

/// The resource targeted by a handler call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Package URI of the provider model.
    pub model_package_uri: String,
    /// Provider model.
    pub model: String,
    /// Provider name.
    pub provider: String,
    /// Service name.
    pub service: String,
    /// Resource name.
    pub resource: String,
}

impl Target {
    /// Returns a segment of the target location.
    #[must_use]
    pub fn segment(&self, segment: UriSegment) -> String {
        match segment {
            UriSegment::ModelPackageUri => self.model_package_uri.clone(),
            UriSegment::Model => self.model.clone(),
            UriSegment::Provider => self.provider.clone(),
            UriSegment::Service => self.service.clone(),
            UriSegment::Resource => self.resource.clone(),
            UriSegment::Uri => self.to_string(),
        }
    }

    pub(crate) fn key(&self) -> RegistryKey {
        RegistryKey {
            model_package_uri: self.model_package_uri.clone(),
            model: self.model.clone(),
            service: self.service.clone(),
            resource: self.resource.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.model, self.provider, self.service, self.resource
        )
    }
}

/// The arguments of an action handler call.
#[derive(Debug)]
pub struct ActCall<'a> {
    /// The targeted resource.
    pub target: &'a Target,
    /// Arguments bound to the declared parameters, in declaration order.
    pub arguments: &'a [Option<Value>],
}

impl ActCall<'_> {
    /// Returns the argument bound to the parameter at the given position.
    ///
    /// # Errors
    ///
    /// An error is returned when the argument is missing or it does not
    /// describe the requested type.
    pub fn arg<T: FromValue>(&self, index: usize) -> Result<T> {
        self.optional_arg(index)?.ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidArgument,
                format!("Missing argument {index} for action `{}`", self.target),
            )
        })
    }

    /// Returns the argument bound to the parameter at the given position,
    /// if the caller provided it.
    ///
    /// # Errors
    ///
    /// An error is returned when the argument does not describe the
    /// requested type.
    pub fn optional_arg<T: FromValue>(&self, index: usize) -> Result<Option<T>> {
        self.arguments
            .get(index)
            .and_then(Option::as_ref)
            .map(T::from_value)
            .transpose()
            .map_err(Error::from)
    }
}

/// The arguments of a getter call.
#[derive(Debug)]
pub struct GetCall<'a> {
    /// The targeted resource.
    pub target: &'a Target,
    /// Declared type of the resource.
    pub result_type: DataType,
    /// Value currently held by the twin.
    pub cached: &'a TimedValue,
}

/// The arguments of a setter call.
#[derive(Debug)]
pub struct SetCall<'a> {
    /// The targeted resource.
    pub target: &'a Target,
    /// Declared type of the resource.
    pub result_type: DataType,
    /// Value currently held by the twin.
    pub cached: &'a TimedValue,
    /// Value requested by the caller.
    pub new_value: &'a TimedValue,
}

/// A declared action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    /// A parameter bound to the caller argument with the same name.
    Named {
        /// Argument name.
        name: String,
        /// Argument type.
        data_type: DataType,
    },
    /// A parameter bound to the caller argument named `arg<position>`.
    Positional(DataType),
    /// A parameter receiving a segment of the target location.
    Uri(UriSegment),
}

impl Param {
    /// Creates a [`Param::Named`].
    #[must_use]
    #[inline]
    pub fn named(name: impl Into<String>, data_type: DataType) -> Self {
        Self::Named {
            name: name.into(),
            data_type,
        }
    }

    /// Creates a [`Param::Positional`].
    #[must_use]
    #[inline]
    pub const fn positional(data_type: DataType) -> Self {
        Self::Positional(data_type)
    }

    /// Creates a [`Param::Uri`].
    #[must_use]
    #[inline]
    pub const fn uri(segment: UriSegment) -> Self {
        Self::Uri(segment)
    }
}

/// The location of a resource in a model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    model_package_uri: Option<String>,
    model: String,
    service: String,
    resource: String,
}

impl ResourcePath {
    /// Creates a [`ResourcePath`].
    #[must_use]
    #[inline]
    pub fn new(
        model: impl Into<String>,
        service: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            model_package_uri: None,
            model: model.into(),
            service: service.into(),
            resource: resource.into(),
        }
    }

    /// Sets the model package URI.
    ///
    /// When no package URI is given, the default one of the model is used.
    #[must_use]
    #[inline]
    pub fn package_uri(mut self, model_package_uri: impl Into<String>) -> Self {
        self.model_package_uri = Some(model_package_uri.into());
        self
    }

    fn key(&self) -> RegistryKey {
        RegistryKey {
            model_package_uri: self
                .model_package_uri
                .clone()
                .unwrap_or_else(|| default_package_uri(&self.model)),
            model: self.model.clone(),
            service: self.service.clone(),
            resource: self.resource.clone(),
        }
    }
}

/// A [`ResourcePath`] served by a getter, along with its caching and
/// null policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetBinding {
    path: ResourcePath,
    cache: Duration,
    on_null: NullAction,
}

impl GetBinding {
    /// Creates a [`GetBinding`] without cache which ignores absent values.
    #[must_use]
    #[inline]
    pub const fn new(path: ResourcePath) -> Self {
        Self {
            path,
            cache: Duration::ZERO,
            on_null: NullAction::Ignore,
        }
    }

    /// Sets how long a pulled value stays valid.
    #[must_use]
    #[inline]
    pub const fn cache(mut self, cache: Duration) -> Self {
        self.cache = cache;
        self
    }

    /// Sets what happens when the getter produces no value.
    #[must_use]
    #[inline]
    pub const fn on_null(mut self, on_null: NullAction) -> Self {
        self.on_null = on_null;
        self
    }
}

impl From<ResourcePath> for GetBinding {
    fn from(path: ResourcePath) -> Self {
        Self::new(path)
    }
}

/// An action handler.
#[derive(Clone)]
pub struct ActMethod {
    params: Vec<Param>,
    returns: DataType,
    bindings: Vec<ResourcePath>,
    handler: Arc<ActFn>,
}

impl fmt::Debug for ActMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActMethod")
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl ActMethod {
    /// Creates an [`ActMethod`] from a function.
    #[must_use]
    #[inline]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ActCall<'_>) -> Result<Option<Value>> + Send + Sync + 'static,
    {
        Self {
            params: Vec::new(),
            returns: DataType::Any,
            bindings: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Declares the next parameter.
    #[must_use]
    #[inline]
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Declares the result type.
    #[must_use]
    #[inline]
    pub const fn returns(mut self, returns: DataType) -> Self {
        self.returns = returns;
        self
    }

    /// Serves the action resource at the given path.
    #[must_use]
    #[inline]
    pub fn bind(mut self, path: ResourcePath) -> Self {
        self.bindings.push(path);
        self
    }

    // Location segments are injected, so they are not action parameters.
    fn action_parameters(&self) -> Vec<ActionParameter> {
        self.params
            .iter()
            .enumerate()
            .filter_map(|(index, param)| match param {
                Param::Named { name, data_type } => Some(ActionParameter::new(name, *data_type)),
                Param::Positional(data_type) => {
                    Some(ActionParameter::new(format!("arg{index}"), *data_type))
                }
                Param::Uri(_) => None,
            })
            .collect()
    }
}

/// A getter.
#[derive(Clone)]
pub struct GetMethod {
    returns: DataType,
    bindings: Vec<GetBinding>,
    handler: Arc<GetFn>,
}

impl fmt::Debug for GetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetMethod")
            .field("returns", &self.returns)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl GetMethod {
    /// Creates a [`GetMethod`] from a function.
    ///
    /// A result without a timestamp is stamped with the instant of the call.
    #[must_use]
    #[inline]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&GetCall<'_>) -> Result<TimedValue> + Send + Sync + 'static,
    {
        Self {
            returns: DataType::Any,
            bindings: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Declares the type of the served resources.
    #[must_use]
    #[inline]
    pub const fn returns(mut self, returns: DataType) -> Self {
        self.returns = returns;
        self
    }

    /// Serves the resource described by the given binding.
    #[must_use]
    #[inline]
    pub fn bind(mut self, binding: impl Into<GetBinding>) -> Self {
        self.bindings.push(binding.into());
        self
    }
}

/// A setter.
///
/// The value returned by a setter is the one committed to the twin, so a
/// setter computes the new value rather than just forwarding it.
#[derive(Clone)]
pub struct SetMethod {
    returns: DataType,
    bindings: Vec<ResourcePath>,
    handler: Arc<SetFn>,
}

impl fmt::Debug for SetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetMethod")
            .field("returns", &self.returns)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl SetMethod {
    /// Creates a [`SetMethod`] from a function.
    ///
    /// An empty result leaves the twin untouched.
    #[must_use]
    #[inline]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&SetCall<'_>) -> Result<TimedValue> + Send + Sync + 'static,
    {
        Self {
            returns: DataType::Any,
            bindings: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Declares the type of the served resources.
    #[must_use]
    #[inline]
    pub const fn returns(mut self, returns: DataType) -> Self {
        self.returns = returns;
        self
    }

    /// Serves the resource at the given path.
    #[must_use]
    #[inline]
    pub fn bind(mut self, path: ResourcePath) -> Self {
        self.bindings.push(path);
        self
    }
}

/// A set of handlers registered together.
///
/// The handlers serve every provider of the bound models, or only the
/// listed ones. Handlers restricted to some providers take precedence over
/// the ones serving every provider.
#[derive(Debug, Clone)]
pub struct WhiteboardService {
    id: u64,
    providers: IndexSet<String>,
    acts: Vec<ActMethod>,
    gets: Vec<GetMethod>,
    sets: Vec<SetMethod>,
}

impl WhiteboardService {
    /// Creates an empty [`WhiteboardService`] with a unique identifier.
    #[must_use]
    #[inline]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            providers: IndexSet::new(),
            acts: Vec::new(),
            gets: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Restricts the handlers to the given providers.
    #[must_use]
    #[inline]
    pub fn providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = providers.into_iter().map(Into::into).collect();
        self
    }

    /// Adds an action handler.
    #[must_use]
    #[inline]
    pub fn act(mut self, method: ActMethod) -> Self {
        self.acts.push(method);
        self
    }

    /// Adds a getter.
    #[must_use]
    #[inline]
    pub fn get(mut self, method: GetMethod) -> Self {
        self.gets.push(method);
        self
    }

    /// Adds a setter.
    #[must_use]
    #[inline]
    pub fn set(mut self, method: SetMethod) -> Self {
        self.sets.push(method);
        self
    }

    /// Returns the service identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RegistryKey {
    pub(crate) model_package_uri: String,
    pub(crate) model: String,
    pub(crate) service: String,
    pub(crate) resource: String,
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.model, self.service, self.resource)
    }
}

#[derive(Clone)]
pub(crate) struct ActHandler {
    pub(crate) params: Vec<Param>,
    pub(crate) handler: Arc<ActFn>,
}

impl ActHandler {
    // Binds caller arguments to the declared parameters.
    pub(crate) fn bind(
        &self,
        target: &Target,
        arguments: &indexmap::IndexMap<String, Value>,
    ) -> Result<Vec<Option<Value>>> {
        self.params
            .iter()
            .enumerate()
            .map(|(index, param)| match param {
                Param::Uri(segment) => Ok(Some(Value::String(target.segment(*segment)))),
                Param::Named { name, data_type } => convert(arguments.get(name), *data_type),
                Param::Positional(data_type) => {
                    convert(arguments.get(&format!("arg{index}")), *data_type)
                }
            })
            .collect()
    }
}

fn convert(argument: Option<&Value>, data_type: DataType) -> Result<Option<Value>> {
    argument
        .cloned()
        .map(|value| value.convert(data_type))
        .transpose()
        .map_err(Error::from)
}

#[derive(Clone)]
pub(crate) struct GetHandler {
    pub(crate) on_null: NullAction,
    pub(crate) handler: Arc<GetFn>,
}

#[derive(Clone)]
pub(crate) struct SetHandler {
    pub(crate) handler: Arc<SetFn>,
}

struct Entry<H> {
    service_id: u64,
    providers: IndexSet<String>,
    handler: H,
}

impl<H> Entry<H> {
    fn serves(&self, provider: &str) -> bool {
        self.providers.is_empty() || self.providers.contains(provider)
    }
}

type Entries<H> = HashMap<RegistryKey, Vec<Entry<H>>>;

fn insert_entry<H>(entries: &mut Entries<H>, key: RegistryKey, entry: Entry<H>) {
    let handlers = entries.entry(key).or_default();
    if entry.providers.is_empty() {
        if handlers.iter().any(|other| other.providers.is_empty()) {
            warn!(
                "Service `{}` adds a second handler for every provider",
                entry.service_id
            );
        }
        handlers.push(entry);
    } else {
        if handlers
            .iter()
            .any(|other| !other.providers.is_disjoint(&entry.providers))
        {
            warn!(
                "Service `{}` overlaps the providers of another handler",
                entry.service_id
            );
        }
        handlers.insert(0, entry);
    }
}

fn find_entry<'a, H>(entries: &'a Entries<H>, key: &RegistryKey, provider: &str) -> Option<&'a H> {
    entries
        .get(key)?
        .iter()
        .find(|entry| entry.serves(provider))
        .map(|entry| &entry.handler)
}

fn remove_entries<H>(entries: &mut Entries<H>, key: &RegistryKey, service_id: u64) -> Vec<Entry<H>> {
    let Some(handlers) = entries.get_mut(key) else {
        return Vec::new();
    };
    let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(handlers)
        .into_iter()
        .partition(|entry| entry.service_id == service_id);
    *handlers = kept;
    if handlers.is_empty() {
        let _ = entries.remove(key);
    }
    removed
}

fn update_entries<H>(
    entries: &mut Entries<H>,
    key: &RegistryKey,
    service_id: u64,
    providers: &IndexSet<String>,
) {
    for mut entry in remove_entries(entries, key, service_id) {
        entry.providers.clone_from(providers);
        insert_entry(entries, key.clone(), entry);
    }
}

/// What a resource must look like to be served by registered handlers.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Requirement {
    Action {
        parameters: Vec<ActionParameter>,
        returns: DataType,
    },
    Value {
        getter: Option<Duration>,
        setter: bool,
        data_type: DataType,
    },
}

/// Handlers registry, keyed by model package URI, model, service
/// and resource.
#[derive(Default)]
pub(crate) struct Whiteboard {
    act: Entries<ActHandler>,
    get: Entries<GetHandler>,
    set: Entries<SetHandler>,
    services: HashMap<u64, IndexSet<RegistryKey>>,
}

impl fmt::Debug for Whiteboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Whiteboard")
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Whiteboard {
    /// Registers the handlers of a service and returns the resources they
    /// need.
    pub(crate) fn add_service(
        &mut self,
        service: WhiteboardService,
    ) -> Result<Vec<(RegistryKey, Requirement)>> {
        if self.services.contains_key(&service.id) {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("Whiteboard service `{}` is already registered", service.id),
            ));
        }

        let mut keys = IndexSet::new();
        let mut requirements: indexmap::IndexMap<RegistryKey, Requirement> =
            indexmap::IndexMap::new();

        for method in service.acts {
            let parameters = method.action_parameters();
            let handler = ActHandler {
                params: method.params,
                handler: method.handler,
            };
            for path in method.bindings {
                let key = path.key();
                let _ = requirements.insert(
                    key.clone(),
                    Requirement::Action {
                        parameters: parameters.clone(),
                        returns: method.returns,
                    },
                );
                let entry = Entry {
                    service_id: service.id,
                    providers: service.providers.clone(),
                    handler: handler.clone(),
                };
                insert_entry(&mut self.act, key.clone(), entry);
                let _ = keys.insert(key);
            }
        }

        for method in service.gets {
            for binding in method.bindings {
                let key = binding.path.key();
                merge_value_requirement(
                    &mut requirements,
                    &key,
                    Some(binding.cache),
                    false,
                    method.returns,
                );
                let entry = Entry {
                    service_id: service.id,
                    providers: service.providers.clone(),
                    handler: GetHandler {
                        on_null: binding.on_null,
                        handler: Arc::clone(&method.handler),
                    },
                };
                insert_entry(&mut self.get, key.clone(), entry);
                let _ = keys.insert(key);
            }
        }

        for method in service.sets {
            for path in method.bindings {
                let key = path.key();
                merge_value_requirement(&mut requirements, &key, None, true, method.returns);
                let entry = Entry {
                    service_id: service.id,
                    providers: service.providers.clone(),
                    handler: SetHandler {
                        handler: Arc::clone(&method.handler),
                    },
                };
                insert_entry(&mut self.set, key.clone(), entry);
                let _ = keys.insert(key);
            }
        }

        let _ = self.services.insert(service.id, keys);
        Ok(requirements.into_iter().collect())
    }

    /// Removes all handlers of a service.
    pub(crate) fn remove_service(&mut self, service_id: u64) -> bool {
        let Some(keys) = self.services.remove(&service_id) else {
            return false;
        };
        for key in &keys {
            let _ = remove_entries(&mut self.act, key, service_id);
            let _ = remove_entries(&mut self.get, key, service_id);
            let _ = remove_entries(&mut self.set, key, service_id);
        }
        true
    }

    /// Changes the providers served by the handlers of a service.
    pub(crate) fn update_service(&mut self, service_id: u64, providers: &IndexSet<String>) -> bool {
        let Some(keys) = self.services.get(&service_id) else {
            return false;
        };
        for key in keys {
            update_entries(&mut self.act, key, service_id, providers);
            update_entries(&mut self.get, key, service_id, providers);
            update_entries(&mut self.set, key, service_id, providers);
        }
        true
    }

    pub(crate) fn act_handler(&self, target: &Target) -> Result<ActHandler> {
        find_entry(&self.act, &target.key(), &target.provider)
            .cloned()
            .ok_or_else(|| no_handler(target))
    }

    pub(crate) fn get_handler(&self, target: &Target) -> Option<GetHandler> {
        find_entry(&self.get, &target.key(), &target.provider).cloned()
    }

    pub(crate) fn set_handler(&self, target: &Target) -> Result<SetHandler> {
        find_entry(&self.set, &target.key(), &target.provider)
            .cloned()
            .ok_or_else(|| no_handler(target))
    }
}

pub(crate) fn no_handler(target: &Target) -> Error {
    Error::new(
        ErrorKind::Handler,
        format!("No suitable whiteboard handler for `{target}`"),
    )
}

fn merge_value_requirement(
    requirements: &mut indexmap::IndexMap<RegistryKey, Requirement>,
    key: &RegistryKey,
    getter: Option<Duration>,
    setter: bool,
    data_type: DataType,
) {
    match requirements.get_mut(key) {
        Some(Requirement::Value {
            getter: current_getter,
            setter: current_setter,
            data_type: current_type,
        }) => {
            if getter.is_some() {
                *current_getter = getter;
            }
            *current_setter |= setter;
            if *current_type == DataType::Any {
                *current_type = data_type;
            }
        }
        Some(Requirement::Action { .. }) => {
            warn!("Resource `{key}` is served both as an action and as a value");
        }
        None => {
            let _ = requirements.insert(
                key.clone(),
                Requirement::Value {
                    getter,
                    setter,
                    data_type,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use indexmap::IndexMap;
    use indexmap::set::IndexSet;

    use sensinact::resource::{ActionParameter, NullAction};
    use sensinact::timed::TimedValue;
    use sensinact::value::{DataType, Value};

    use crate::error::{Error, ErrorKind};

    use super::{
        ActCall, ActMethod, GetBinding, GetMethod, Param, Requirement, ResourcePath, SetMethod,
        Target, UriSegment, Whiteboard, WhiteboardService,
    };

    fn target(provider: &str, resource: &str) -> Target {
        Target {
            model_package_uri: sensinact::default_package_uri("foo"),
            model: "foo".into(),
            provider: provider.into(),
            service: "actions".into(),
            resource: resource.into(),
        }
    }

    fn constant(value: i64) -> ActMethod {
        ActMethod::new(move |_: &ActCall<'_>| Ok(Some(Value::Int(value))))
    }

    #[test]
    fn target_segments() {
        let target = target("providerA", "4");
        assert_eq!(target.segment(UriSegment::Provider), "providerA");
        assert_eq!(target.segment(UriSegment::Resource), "4");
        assert_eq!(target.segment(UriSegment::Uri), "foo/providerA/actions/4");
    }

    #[test]
    fn action_requirements() {
        let mut whiteboard = Whiteboard::default();

        let method = ActMethod::new(|_| Ok(None))
            .param(Param::positional(DataType::Int))
            .param(Param::uri(UriSegment::Provider))
            .param(Param::positional(DataType::Int))
            .returns(DataType::Float)
            .bind(ResourcePath::new("foo", "actions", "4"));

        let requirements = whiteboard
            .add_service(WhiteboardService::new(1).act(method))
            .unwrap();

        // Location segments are not action parameters.
        assert_eq!(
            requirements.into_iter().map(|(_, r)| r).collect::<Vec<_>>(),
            vec![Requirement::Action {
                parameters: vec![
                    ActionParameter::new("arg0", DataType::Int),
                    ActionParameter::new("arg2", DataType::Int),
                ],
                returns: DataType::Float,
            }]
        );

        // Same identifier twice.
        assert_eq!(
            whiteboard
                .add_service(WhiteboardService::new(1))
                .map_err(|e| e.kind()),
            Err(ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn value_requirements() {
        let mut whiteboard = Whiteboard::default();
        let path = ResourcePath::new("bar", "pull", "cache");

        let service = WhiteboardService::new(2)
            .get(
                GetMethod::new(|_| Ok(TimedValue::empty()))
                    .returns(DataType::Int)
                    .bind(
                        GetBinding::new(path.clone())
                            .cache(Duration::from_secs(1))
                            .on_null(NullAction::UpdateIfPresent),
                    ),
            )
            .set(SetMethod::new(|call| Ok(call.new_value.clone())).bind(path));

        let requirements = whiteboard.add_service(service).unwrap();
        assert_eq!(
            requirements.into_iter().map(|(_, r)| r).collect::<Vec<_>>(),
            vec![Requirement::Value {
                getter: Some(Duration::from_secs(1)),
                setter: true,
                data_type: DataType::Int,
            }]
        );
    }

    #[test]
    fn handler_precedence() {
        let mut whiteboard = Whiteboard::default();
        let path = ResourcePath::new("foo", "actions", "4");

        // Catch-all handler.
        let _ = whiteboard
            .add_service(WhiteboardService::new(1).act(constant(1).bind(path.clone())))
            .unwrap();
        // Handler restricted to `providerB`.
        let _ = whiteboard
            .add_service(
                WhiteboardService::new(2)
                    .providers(["providerB"])
                    .act(constant(2).bind(path)),
            )
            .unwrap();

        let call = |whiteboard: &Whiteboard, provider: &str| {
            let target = target(provider, "4");
            let handler = whiteboard.act_handler(&target).unwrap();
            (handler.handler)(&ActCall {
                target: &target,
                arguments: &[],
            })
            .unwrap()
        };

        assert_eq!(call(&whiteboard, "providerA"), Some(Value::Int(1)));
        assert_eq!(call(&whiteboard, "providerB"), Some(Value::Int(2)));

        // Restrict the catch-all handler to `providerC`.
        let providers: IndexSet<String> = ["providerC".to_string()].into_iter().collect();
        assert!(whiteboard.update_service(1, &providers));
        assert_eq!(
            whiteboard
                .act_handler(&target("providerA", "4"))
                .map(|_| ())
                .map_err(|e| e.kind()),
            Err(ErrorKind::Handler)
        );

        // Remove the restricted handler.
        assert!(whiteboard.remove_service(2));
        assert!(!whiteboard.remove_service(2));
        assert_eq!(
            whiteboard.act_handler(&target("providerB", "4")).map(|_| ()),
            Err(Error::new(
                ErrorKind::Handler,
                "No suitable whiteboard handler for `foo/providerB/actions/4`"
            ))
        );
        assert_eq!(call(&whiteboard, "providerC"), Some(Value::Int(1)));
    }

    #[test]
    fn argument_binding() {
        let mut whiteboard = Whiteboard::default();
        let method = ActMethod::new(|call| {
            let first: i32 = call.arg(0)?;
            let provider: String = call.arg(1)?;
            let third: Option<String> = call.optional_arg(2)?;
            Ok(Some(Value::from(format!("{first}-{provider}-{third:?}"))))
        })
        .param(Param::named("count", DataType::Int))
        .param(Param::uri(UriSegment::Provider))
        .param(Param::positional(DataType::String))
        .bind(ResourcePath::new("foo", "actions", "bind"));

        let _ = whiteboard
            .add_service(WhiteboardService::new(3).act(method))
            .unwrap();

        let target = target("providerA", "bind");
        let handler = whiteboard.act_handler(&target).unwrap();

        let mut arguments = IndexMap::new();
        let _ = arguments.insert("count".to_string(), Value::from("5"));
        let _ = arguments.insert("arg2".to_string(), Value::Int(16));

        let bound = handler.bind(&target, &arguments).unwrap();
        assert_eq!(
            bound,
            vec![
                Some(Value::Int(5)),
                Some(Value::from("providerA")),
                Some(Value::from("16")),
            ]
        );
        assert_eq!(
            (handler.handler)(&ActCall {
                target: &target,
                arguments: &bound,
            })
            .unwrap(),
            Some(Value::from("5-providerA-Some(\"16\")"))
        );

        // Argument not convertible to the declared type.
        let _ = arguments.insert("count".to_string(), Value::from("five"));
        assert_eq!(
            handler.bind(&target, &arguments).map_err(|e| e.kind()),
            Err(ErrorKind::TypeMismatch)
        );
    }
}
