//! Routing of requests to endpoints.
//!
//! A [`Router`] owns an immutable [`RuleMap`] behind an atomic cell. Adding or removing
//! rules builds a new map and swaps it in, so dispatching never waits on a writer and
//! always sees a complete map.
//!
//! ```
//! use switchyard_http::protocol::{Request, Response};
//! use switchyard_web::router::{raw_endpoint, Router};
//!
//! let router = Router::new();
//! router
//!     .add(("/hello/<name>", raw_endpoint(|_request, args| {
//!         let mut response = Response::new();
//!         response.set_data(format!("hello {}", args.get("name").unwrap()));
//!         Ok(response)
//!     })))
//!     .unwrap();
//!
//! let request = Request::from(http::Request::get("/hello/world").body(()).unwrap());
//! let mut response = router.dispatch(&request).unwrap();
//! assert_eq!(response.data().unwrap(), "hello world");
//! ```

mod args;
pub mod converter;
mod rule;
mod url_map;

pub use args::{ArgValue, PathArgs};
pub use converter::{Converter, Converters};
pub use rule::{
    Endpoints, Resource, RouteAttributes, RouteEndpoint, RouteProvider, RuleFactory, RuleGroup, RuleSpec, Submount,
    WithHost, route,
};
pub use url_map::{HOST_ARG, HOST_WILDCARD, MapAdapter, Route, RouteId, RuleMap};

use crate::error::{BoxError, DispatchError, RouteError};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use switchyard_http::protocol::{Request, Response};
use tracing::debug;

/// Turns a matched endpoint and its arguments into a response.
pub trait Dispatcher<E>: Send + Sync {
    fn dispatch(&self, request: &Request, endpoint: &E, args: PathArgs) -> Result<Response, DispatchError>;
}

impl<E, F> Dispatcher<E> for F
where
    F: Fn(&Request, &E, PathArgs) -> Result<Response, DispatchError> + Send + Sync,
{
    fn dispatch(&self, request: &Request, endpoint: &E, args: PathArgs) -> Result<Response, DispatchError> {
        (self)(request, endpoint, args)
    }
}

/// An endpoint receiving the request and the path arguments as they are.
pub type RawEndpoint = Arc<dyn Fn(&Request, &PathArgs) -> Result<Response, BoxError> + Send + Sync>;

pub fn raw_endpoint<F>(f: F) -> RawEndpoint
where
    F: Fn(&Request, &PathArgs) -> Result<Response, BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Dispatches by calling a [`RawEndpoint`] directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallEndpoint;

impl Dispatcher<RawEndpoint> for CallEndpoint {
    fn dispatch(&self, request: &Request, endpoint: &RawEndpoint, args: PathArgs) -> Result<Response, DispatchError> {
        endpoint(request, &args).map_err(DispatchError::endpoint)
    }
}

pub struct Router<E> {
    url_map: ArcSwap<RuleMap<E>>,
    dispatcher: Box<dyn Dispatcher<E>>,
    mutex: Mutex<()>,
}

impl Router<RawEndpoint> {
    /// A router calling [`RawEndpoint`]s with the default converters.
    pub fn new() -> Self {
        Router::builder(CallEndpoint).build()
    }
}

impl Default for Router<RawEndpoint> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Send + Sync + 'static> Router<E> {
    pub fn builder<D: Dispatcher<E> + 'static>(dispatcher: D) -> RouterBuilder<E> {
        RouterBuilder::new(dispatcher)
    }

    /// Adds the rules of `factory`, returning the created routes in registration order.
    ///
    /// Rules without a host get the host wildcard, which matches any host and is removed
    /// from the arguments before dispatching. Either every rule is added or none is.
    pub fn add<F: RuleFactory<E>>(&self, factory: F) -> Result<Vec<Arc<Route<E>>>, RouteError> {
        let specs = factory
            .get_rules()
            .into_iter()
            .map(|mut spec| {
                if spec.host.is_none() {
                    spec.host = Some(HOST_WILDCARD.to_owned());
                }
                spec
            })
            .collect();

        self.insert(specs)
    }

    /// Adds a single rule as it is. A rule without a host matches any host.
    pub fn add_rule(&self, spec: RuleSpec<E>) -> Result<Arc<Route<E>>, RouteError> {
        let _guard = self.lock();
        let current = self.url_map.load();
        let route = Arc::new(current.compile(spec)?);

        self.url_map.store(Arc::new(current.with_routes([Arc::clone(&route)])));
        debug!(%route, "rule added");
        Ok(route)
    }

    /// Removes `routes`. Fails without removing anything if one of them is not registered.
    ///
    /// Dispatches that already picked up the previous map still complete against it.
    pub fn remove(&self, routes: &[Arc<Route<E>>]) -> Result<(), RouteError> {
        let _guard = self.lock();
        let current = self.url_map.load();

        if let Some(missing) = routes.iter().find(|route| !current.contains(route.id())) {
            return Err(RouteError::NoSuchRoute { rule: missing.to_string() });
        }

        let ids: HashSet<RouteId> = routes.iter().map(|route| route.id()).collect();
        self.url_map.store(Arc::new(current.without(&ids)));
        debug!(count = ids.len(), "rules removed");
        Ok(())
    }

    /// Matches `request` against the current map and dispatches it to the endpoint.
    ///
    /// Matching uses the raw path, so captures keep their percent-encoding.
    pub fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        let url_map = self.url_map.load_full();
        let (route, mut args) = url_map.bind(request.host()).matches(request.raw_path(), request.method())?;
        args.remove(HOST_ARG);

        self.dispatcher.dispatch(request, route.endpoint(), args)
    }

    /// A snapshot of the registered routes, in matching order.
    pub fn rules(&self) -> Vec<Arc<Route<E>>> {
        self.url_map.load().routes().to_vec()
    }

    fn insert(&self, specs: Vec<RuleSpec<E>>) -> Result<Vec<Arc<Route<E>>>, RouteError> {
        let _guard = self.lock();
        let current = self.url_map.load();

        let routes = specs
            .into_iter()
            .map(|spec| current.compile(spec).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        self.url_map.store(Arc::new(current.with_routes(routes.iter().map(Arc::clone))));
        for route in &routes {
            debug!(%route, "rule added");
        }
        Ok(routes)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> fmt::Debug for Router<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("url_map", &self.url_map.load()).finish_non_exhaustive()
    }
}

pub struct RouterBuilder<E> {
    converters: Converters,
    strict_slashes: bool,
    dispatcher: Box<dyn Dispatcher<E>>,
}

impl<E: Send + Sync + 'static> RouterBuilder<E> {
    fn new<D: Dispatcher<E> + 'static>(dispatcher: D) -> Self {
        Self { converters: Converters::default(), strict_slashes: false, dispatcher: Box::new(dispatcher) }
    }

    /// Registers a custom converter, usable in rules as `<name:arg>`.
    pub fn converter<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&converter::ConverterArgs) -> Result<Box<dyn Converter>, String> + Send + Sync + 'static,
    {
        self.converters.register(name, factory);
        self
    }

    /// Whether a rule ending with `/` requires the slash. Off by default.
    pub fn strict_slashes(mut self, strict_slashes: bool) -> Self {
        self.strict_slashes = strict_slashes;
        self
    }

    pub fn build(self) -> Router<E> {
        Router {
            url_map: ArcSwap::from_pointee(RuleMap::new(Arc::new(self.converters), self.strict_slashes)),
            dispatcher: self.dispatcher,
            mutex: Mutex::new(()),
        }
    }
}

impl<E> fmt::Debug for RouterBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("strict_slashes", &self.strict_slashes).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoutingError;
    use http::{Method, StatusCode};
    use std::sync::Barrier;
    use std::thread;

    fn request(method: Method, host: &str, path: &str) -> Request {
        Request::from(http::Request::builder().method(method).uri(path).header("host", host).body(()).unwrap())
    }

    fn text(body: &'static str) -> RawEndpoint {
        raw_endpoint(move |_, _| {
            let mut response = Response::new();
            response.set_data(body);
            Ok(response)
        })
    }

    fn echo_args() -> RawEndpoint {
        raw_endpoint(|_, args| Ok(Response::for_json(&args.to_json())?))
    }

    fn body_of(router: &Router<RawEndpoint>, request: &Request) -> String {
        let mut response = router.dispatch(request).unwrap();
        String::from_utf8(response.data().unwrap().to_vec()).unwrap()
    }

    #[test]
    fn add_then_remove() {
        let router = Router::new();
        let routes = router.add(("/items", text("items"))).unwrap();

        assert_eq!(body_of(&router, &request(Method::GET, "localhost", "/items")), "items");

        router.remove(&routes).unwrap();
        let error = router.dispatch(&request(Method::GET, "localhost", "/items")).unwrap_err();
        assert!(matches!(error, DispatchError::Routing(RoutingError::NotFound { .. })));

        assert_eq!(router.remove(&routes), Err(RouteError::NoSuchRoute { rule: routes[0].to_string() }));
    }

    #[test]
    fn host_wildcard_is_not_passed_to_endpoint() {
        let router = Router::new();
        router.add(("/args/<name>", echo_args())).unwrap();

        assert_eq!(body_of(&router, &request(Method::GET, "example.com", "/args/x")), r#"{"name":"x"}"#);
    }

    #[test]
    fn add_rule_without_host_matches_any_host() {
        let router = Router::new();
        router.add_rule(RuleSpec::new("/raw", text("raw"))).unwrap();
        router.add_rule(RuleSpec::new("/raw", text("api")).host("api.localhost")).unwrap();

        assert_eq!(body_of(&router, &request(Method::GET, "api.localhost", "/raw")), "api");
        assert_eq!(body_of(&router, &request(Method::GET, "other.localhost", "/raw")), "raw");
    }

    #[test]
    fn resource_serves_head_from_get() {
        let router = Router::new();
        router.add(Resource::new("/doc").get(text("get"))).unwrap();
        assert_eq!(body_of(&router, &request(Method::HEAD, "localhost", "/doc")), "get");

        let router = Router::new();
        router.add(Resource::new("/doc").get(text("get")).head(text("head"))).unwrap();
        assert_eq!(body_of(&router, &request(Method::HEAD, "localhost", "/doc")), "head");
        assert_eq!(body_of(&router, &request(Method::GET, "localhost", "/doc")), "get");
    }

    #[test]
    fn method_not_allowed() {
        let router = Router::new();
        router.add(Resource::new("/doc").get(text("get"))).unwrap();

        let error = router.dispatch(&request(Method::PUT, "localhost", "/doc")).unwrap_err();
        assert_eq!(error.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn failed_add_changes_nothing() {
        let router = Router::new();
        let error = router.add(vec![("/ok", text("ok")), ("/<broken", text("broken"))]).unwrap_err();

        assert!(matches!(error, RouteError::InvalidPattern { .. }));
        assert!(router.rules().is_empty());
    }

    #[test]
    fn custom_converter() {
        let router = Router::builder(CallEndpoint)
            .converter("hex", |_| Ok(Box::new(converter::RegexConverter::new("[0-9a-f]+")) as Box<dyn Converter>))
            .build();
        router.add(("/color/<hex:value>", echo_args())).unwrap();

        assert_eq!(body_of(&router, &request(Method::GET, "localhost", "/color/ff00aa")), r#"{"value":"ff00aa"}"#);
        assert!(router.dispatch(&request(Method::GET, "localhost", "/color/xyz")).is_err());
    }

    #[test]
    fn concurrent_adds_keep_every_route() {
        let router = Router::new();
        let barrier = Barrier::new(8);

        thread::scope(|scope| {
            for thread_index in 0..8 {
                let router = &router;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for route_index in 0..10 {
                        router.add((format!("/t{thread_index}/r{route_index}"), text("ok"))).unwrap();
                    }
                });
            }
        });

        assert_eq!(router.rules().len(), 80);
        assert_eq!(body_of(&router, &request(Method::GET, "localhost", "/t7/r9")), "ok");
    }

    #[test]
    fn in_flight_dispatch_survives_removal() {
        let router = Arc::new(Router::new());
        let entered = Arc::new(Barrier::new(2));
        let removed = Arc::new(Barrier::new(2));

        let endpoint = {
            let entered = Arc::clone(&entered);
            let removed = Arc::clone(&removed);
            raw_endpoint(move |_, _| {
                entered.wait();
                removed.wait();
                let mut response = Response::new();
                response.set_data("slow");
                Ok(response)
            })
        };
        let routes = router.add(("/slow", endpoint)).unwrap();

        let dispatching = {
            let router = Arc::clone(&router);
            thread::spawn(move || body_of(&router, &request(Method::GET, "localhost", "/slow")))
        };

        entered.wait();
        router.remove(&routes).unwrap();
        removed.wait();

        assert_eq!(dispatching.join().unwrap(), "slow");
        assert!(router.dispatch(&request(Method::GET, "localhost", "/slow")).is_err());
    }
}
