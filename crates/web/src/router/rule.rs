//! Rule factories: the ways routes are described before they are added to a router.
//!
//! ```
//! use http::Method;
//! use switchyard_web::router::{RuleFactory, RuleGroup, Resource, Submount, route};
//!
//! let rules = RuleGroup::new()
//!     .add(("/health", "health"))
//!     .add(route("/items/<int:id>").methods([Method::GET]).to("item"))
//!     .add(Submount::new("/v2", Resource::new("/users").get("list_users").post("create_user")));
//!
//! let paths: Vec<String> = rules.get_rules().iter().map(|rule| rule.path().to_owned()).collect();
//! assert_eq!(paths, ["/health", "/items/<int:id>", "/v2/users", "/v2/users"]);
//! ```

use crate::router::PathArgs;
use http::Method;

/// Everything needed to create one route.
#[derive(Debug, Clone)]
pub struct RuleSpec<E> {
    pub(crate) path: String,
    pub(crate) endpoint: E,
    pub(crate) host: Option<String>,
    pub(crate) methods: Option<Vec<Method>>,
    pub(crate) defaults: PathArgs,
    pub(crate) strict_slashes: Option<bool>,
}

impl<E> RuleSpec<E> {
    pub fn new<S: Into<String>>(path: S, endpoint: E) -> Self {
        Self { path: path.into(), endpoint, host: None, methods: None, defaults: PathArgs::new(), strict_slashes: None }
    }

    /// Host pattern, e.g. `api.localhost<port:port>`. Without one, the rule matches any host.
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Restricts the allowed methods. Allowing GET also allows HEAD.
    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    /// Arguments passed to the endpoint in addition to the captured ones.
    pub fn defaults(mut self, defaults: PathArgs) -> Self {
        self.defaults = defaults;
        self
    }

    /// Overrides the trailing slash handling of the router for this rule.
    pub fn strict_slashes(mut self, strict_slashes: bool) -> Self {
        self.strict_slashes = Some(strict_slashes);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn host_pattern(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn allowed_methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }
}

/// Produces the rules added by one `Router::add` call, in registration order.
pub trait RuleFactory<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>>;
}

impl<E> RuleFactory<E> for RuleSpec<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        vec![self]
    }
}

/// A `(path, endpoint)` pair, matching every method on every host.
impl<S: Into<String>, E> RuleFactory<E> for (S, E) {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        vec![RuleSpec::new(self.0, self.1)]
    }
}

impl<E, F: RuleFactory<E>> RuleFactory<E> for Vec<F> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        self.into_iter().flat_map(RuleFactory::get_rules).collect()
    }
}

/// Route attributes waiting for their endpoint, see [`route`].
#[derive(Debug, Clone)]
pub struct RouteAttributes {
    path: String,
    host: Option<String>,
    methods: Option<Vec<Method>>,
    defaults: PathArgs,
    strict_slashes: Option<bool>,
}

/// Starts describing a route for an endpoint.
///
/// ```
/// use http::Method;
/// use switchyard_web::router::route;
///
/// let endpoint = route("/users/<user_id>").methods([Method::GET]).to("get_user");
/// ```
pub fn route<S: Into<String>>(path: S) -> RouteAttributes {
    RouteAttributes { path: path.into(), host: None, methods: None, defaults: PathArgs::new(), strict_slashes: None }
}

impl RouteAttributes {
    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn defaults(mut self, defaults: PathArgs) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn strict_slashes(mut self, strict_slashes: bool) -> Self {
        self.strict_slashes = Some(strict_slashes);
        self
    }

    pub fn to<E>(self, endpoint: E) -> RouteEndpoint<E> {
        RouteEndpoint { endpoint, attributes: vec![self] }
    }

    fn into_spec<E>(self, endpoint: E) -> RuleSpec<E> {
        RuleSpec {
            path: self.path,
            endpoint,
            host: self.host,
            methods: self.methods,
            defaults: self.defaults,
            strict_slashes: self.strict_slashes,
        }
    }
}

/// An endpoint carrying one or more sets of route attributes.
#[derive(Debug, Clone)]
pub struct RouteEndpoint<E> {
    endpoint: E,
    attributes: Vec<RouteAttributes>,
}

impl<E> RouteEndpoint<E> {
    /// Serves the same endpoint under additional attributes.
    pub fn route(mut self, attributes: RouteAttributes) -> Self {
        self.attributes.push(attributes);
        self
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    fn serves_head(&self) -> bool {
        self.attributes
            .iter()
            .any(|attributes| attributes.methods.as_ref().is_some_and(|methods| methods.contains(&Method::HEAD)))
    }
}

impl<E: Clone> RuleFactory<E> for RouteEndpoint<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        let endpoint = self.endpoint;
        self.attributes.into_iter().map(|attributes| attributes.into_spec(endpoint.clone())).collect()
    }
}

/// Per-method endpoints of one path.
///
/// Rules are emitted HEAD first, then GET, POST, PUT, PATCH, DELETE, OPTIONS, TRACE and
/// finally any other method in the order it was added. Without a HEAD endpoint, HEAD
/// requests are served by the GET endpoint.
#[derive(Debug, Clone)]
pub struct Resource<E> {
    path: String,
    host: Option<String>,
    endpoints: Vec<(Method, E)>,
}

const RESOURCE_METHOD_ORDER: [Method; 8] = [
    Method::HEAD,
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
    Method::TRACE,
];

macro_rules! resource_method {
    ($name:ident, $method:expr) => {
        pub fn $name(self, endpoint: E) -> Self {
            self.on($method, endpoint)
        }
    };
}

impl<E> Resource<E> {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self { path: path.into(), host: None, endpoints: Vec::new() }
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the endpoint of `method`, replacing an earlier one.
    pub fn on(mut self, method: Method, endpoint: E) -> Self {
        match self.endpoints.iter_mut().find(|(existing, _)| *existing == method) {
            Some((_, existing)) => *existing = endpoint,
            None => self.endpoints.push((method, endpoint)),
        }
        self
    }

    resource_method!(head, Method::HEAD);
    resource_method!(get, Method::GET);
    resource_method!(post, Method::POST);
    resource_method!(put, Method::PUT);
    resource_method!(patch, Method::PATCH);
    resource_method!(delete, Method::DELETE);
    resource_method!(options, Method::OPTIONS);
    resource_method!(trace, Method::TRACE);
}

impl<E> RuleFactory<E> for Resource<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        let mut endpoints = self.endpoints;
        endpoints.sort_by_key(|(method, _)| {
            RESOURCE_METHOD_ORDER.iter().position(|ordered| ordered == method).unwrap_or(RESOURCE_METHOD_ORDER.len())
        });

        endpoints
            .into_iter()
            .map(|(method, endpoint)| {
                let spec = RuleSpec::new(self.path.clone(), endpoint).methods([method]);
                match &self.host {
                    Some(host) => spec.host(host.clone()),
                    None => spec,
                }
            })
            .collect()
    }
}

/// An object exposing several routed endpoints.
pub trait RouteProvider<E> {
    fn routes(&self) -> Vec<RouteEndpoint<E>>;
}

/// The rules of every endpoint of a [`RouteProvider`], endpoints serving HEAD first.
#[derive(Debug, Clone)]
pub struct Endpoints<E> {
    endpoints: Vec<RouteEndpoint<E>>,
}

impl<E> Endpoints<E> {
    pub fn of<P: RouteProvider<E> + ?Sized>(provider: &P) -> Self {
        let mut endpoints = provider.routes();
        endpoints.sort_by_key(|endpoint| !endpoint.serves_head());
        Self { endpoints }
    }
}

impl<E: Clone> RuleFactory<E> for Endpoints<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        self.endpoints.get_rules()
    }
}

/// Rules of several factories, collected in the order they were added.
#[derive(Debug, Clone)]
pub struct RuleGroup<E> {
    rules: Vec<RuleSpec<E>>,
}

impl<E> RuleGroup<E> {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add<F: RuleFactory<E>>(mut self, factory: F) -> Self {
        self.rules.extend(factory.get_rules());
        self
    }
}

impl<E> Default for RuleGroup<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RuleFactory<E> for RuleGroup<E> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        self.rules
    }
}

/// Sets the host pattern of every rule of `factory`.
#[derive(Debug, Clone)]
pub struct WithHost<F> {
    host: String,
    factory: F,
}

impl<F> WithHost<F> {
    pub fn new<S: Into<String>>(host: S, factory: F) -> Self {
        Self { host: host.into(), factory }
    }
}

impl<E, F: RuleFactory<E>> RuleFactory<E> for WithHost<F> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        let host = self.host;
        self.factory.get_rules().into_iter().map(|rule| rule.host(host.clone())).collect()
    }
}

/// Prefixes the path of every rule of `factory`.
#[derive(Debug, Clone)]
pub struct Submount<F> {
    prefix: String,
    factory: F,
}

impl<F> Submount<F> {
    pub fn new<S: Into<String>>(prefix: S, factory: F) -> Self {
        Self { prefix: prefix.into().trim_end_matches('/').to_owned(), factory }
    }
}

impl<E, F: RuleFactory<E>> RuleFactory<E> for Submount<F> {
    fn get_rules(self) -> Vec<RuleSpec<E>> {
        let prefix = self.prefix;
        self.factory
            .get_rules()
            .into_iter()
            .map(|mut rule| {
                rule.path = format!("{prefix}{}", rule.path);
                rule
            })
            .collect()
    }
}
