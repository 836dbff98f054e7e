//! The url map matches `(host, raw path, method)` against compiled rules.
//!
//! Rules are kept sorted so that the first matching rule wins:
//!
//! 1. rules without path variables before rules with variables
//! 2. rules with more path parts first
//! 3. part by part, static parts (longer first) before dynamic parts (lower converter weight first)
//! 4. rules with an explicit host pattern before rules matching any host
//! 5. registration order, so a HEAD rule added before its GET rule is tried first
//!
//! A [`RuleMap`] is never changed in place: [`RuleMap::with_routes`] and [`RuleMap::without`]
//! return a new map that shares the compiled routes of the old one.

use crate::error::{RouteError, RoutingError};
use crate::router::converter::{Converter, Converters};
use crate::router::{PathArgs, RuleSpec};
use http::Method;
use regex::Regex;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::fmt;
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Host pattern that matches any host and captures it into [`HOST_ARG`].
pub const HOST_WILDCARD: &str = "<__host__>";

/// Argument holding the host captured by [`HOST_WILDCARD`].
pub const HOST_ARG: &str = "__host__";

/// Stable identity of a route, kept when the route is carried over into a new map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

impl RouteId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Weight {
    Static(Reverse<usize>),
    Dynamic(u32),
}

#[derive(Debug)]
struct Variable {
    group: String,
    name: String,
    converter: Box<dyn Converter>,
}

#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    variables: Vec<Variable>,
    weights: Vec<Weight>,
}

enum Part<'a> {
    Static(&'a str),
    Variable { converter: &'a str, args: Option<&'a str>, name: &'a str },
}

impl CompiledPattern {
    fn compile(pattern: &str, converters: &Converters, optional_trailing_slash: bool) -> Result<Self, RouteError> {
        let parts = parse_pattern(pattern)?;

        let mut regex = String::from("^");
        let mut variables: Vec<Variable> = Vec::new();
        let mut weights = Vec::new();
        let last = parts.len().saturating_sub(1);

        for (index, part) in parts.into_iter().enumerate() {
            match part {
                Part::Static(text) => {
                    let text = match text.strip_suffix('/') {
                        Some(stripped) if optional_trailing_slash && index == last => stripped,
                        _ => text,
                    };
                    weights.extend(text.split('/').filter(|piece| !piece.is_empty()).map(|piece| Weight::Static(Reverse(piece.len()))));
                    regex.push_str(&regex::escape(text));
                }
                Part::Variable { converter, args, name } => {
                    if variables.iter().any(|variable| variable.name == name) {
                        return Err(RouteError::invalid_pattern(pattern, format!("variable '{name}' is defined twice")));
                    }
                    let converter = converters.create(converter, args, pattern)?;
                    let group = format!("__v{}", variables.len());
                    weights.push(Weight::Dynamic(converter.weight()));
                    let _ = write!(regex, "(?P<{group}>{})", converter.regex());
                    variables.push(Variable { group, name: name.to_owned(), converter });
                }
            }
        }

        if optional_trailing_slash {
            regex.push_str("/?");
        }
        regex.push('$');

        let regex = Regex::new(&regex).map_err(|e| RouteError::invalid_pattern(pattern, e))?;
        Ok(Self { regex, variables, weights })
    }

    /// Matches `input` and adds the converted captures to `args`.
    fn captures(&self, input: &str, args: &mut PathArgs) -> bool {
        let Some(captures) = self.regex.captures(input) else {
            return false;
        };

        for variable in &self.variables {
            let raw = captures.name(&variable.group).map_or("", |m| m.as_str());
            match variable.converter.to_value(raw) {
                Some(value) => args.insert(variable.name.as_str(), value),
                None => return false,
            }
        }
        true
    }

    fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }
}

/// Splits a rule pattern into static text and `<conv(args):name>` variables.
fn parse_pattern(pattern: &str) -> Result<Vec<Part<'_>>, RouteError> {
    let mut parts = Vec::new();
    let mut rest = pattern;

    while let Some(open) = rest.find('<') {
        if open > 0 {
            parts.push(Part::Static(static_text(&rest[..open], pattern)?));
        }
        let close = find_closing(&rest[open..]).ok_or_else(|| RouteError::invalid_pattern(pattern, "unclosed '<'"))?;
        parts.push(parse_variable(&rest[open + 1..open + close], pattern)?);
        rest = &rest[open + close + 1..];
    }

    if !rest.is_empty() {
        parts.push(Part::Static(static_text(rest, pattern)?));
    }
    Ok(parts)
}

fn static_text<'a>(text: &'a str, pattern: &str) -> Result<&'a str, RouteError> {
    if text.contains('>') {
        return Err(RouteError::invalid_pattern(pattern, "unexpected '>'"));
    }
    Ok(text)
}

/// Offset of the `>` closing the variable that starts at `source[0]`.
fn find_closing(source: &str) -> Option<usize> {
    let mut quote = None;
    let mut depth = 0_usize;

    for (index, c) in source.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, '>') if depth == 0 => return Some(index),
            (None, _) => {}
        }
    }
    None
}

fn parse_variable<'a>(source: &'a str, pattern: &str) -> Result<Part<'a>, RouteError> {
    let (spec, name) = match source.rfind(':') {
        Some(index) if source[index + 1..].chars().all(is_identifier_char) => (Some(&source[..index]), &source[index + 1..]),
        _ => (None, source),
    };

    if !is_identifier(name) {
        return Err(RouteError::invalid_pattern(pattern, format!("invalid variable name '{name}'")));
    }

    let Some(spec) = spec else {
        return Ok(Part::Variable { converter: "default", args: None, name });
    };

    let (converter, args) = match spec.split_once('(') {
        Some((converter, args)) => {
            let args = args
                .strip_suffix(')')
                .ok_or_else(|| RouteError::invalid_pattern(pattern, format!("unclosed arguments of '{converter}'")))?;
            (converter.trim(), Some(args))
        }
        None => (spec.trim(), None),
    };

    if !is_identifier(converter) {
        return Err(RouteError::invalid_pattern(pattern, format!("invalid converter name '{converter}'")));
    }
    Ok(Part::Variable { converter, args, name })
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_identifier(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') && name.chars().all(is_identifier_char)
}

#[derive(Debug)]
enum HostMatcher {
    /// No host pattern, any host matches.
    Any,
    /// [`HOST_WILDCARD`], any host matches and is captured.
    Wildcard,
    Pattern(CompiledPattern),
}

impl HostMatcher {
    fn compile(host: Option<&str>, converters: &Converters) -> Result<Self, RouteError> {
        match host {
            None => Ok(Self::Any),
            Some(HOST_WILDCARD) => Ok(Self::Wildcard),
            Some(pattern) => Ok(Self::Pattern(CompiledPattern::compile(pattern, converters, false)?)),
        }
    }

    fn matches(&self, host: &str, args: &mut PathArgs) -> bool {
        match self {
            Self::Any => true,
            Self::Wildcard => {
                args.insert(HOST_ARG, host);
                true
            }
            Self::Pattern(pattern) => pattern.captures(host, args),
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any | Self::Wildcard)
    }
}

/// A compiled rule with its endpoint.
pub struct Route<E> {
    id: RouteId,
    rule: String,
    host: Option<String>,
    methods: Option<Vec<Method>>,
    defaults: PathArgs,
    strict_slashes: bool,
    endpoint: E,
    path: CompiledPattern,
    host_matcher: HostMatcher,
}

impl<E> Route<E> {
    pub fn id(&self) -> RouteId {
        self.id
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The allowed methods, `None` if the route accepts any method.
    pub fn methods(&self) -> Option<&[Method]> {
        self.methods.as_deref()
    }

    pub fn defaults(&self) -> &PathArgs {
        &self.defaults
    }

    pub fn strict_slashes(&self) -> bool {
        self.strict_slashes
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn allows(&self, method: &Method) -> bool {
        self.methods.as_ref().is_none_or(|methods| methods.contains(method))
    }

    fn sort_key(&self) -> (bool, Reverse<usize>, &[Weight], bool) {
        (self.path.has_variables(), Reverse(self.path.weights.len()), &self.path.weights, self.host_matcher.is_wildcard())
    }
}

impl<E> PartialEq for Route<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E> Eq for Route<E> {}

impl<E> fmt::Debug for Route<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("rule", &self.rule)
            .field("host", &self.host)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl<E> fmt::Display for Route<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rule)?;
        if let Some(methods) = &self.methods {
            let methods: Vec<&str> = methods.iter().map(Method::as_str).collect();
            write!(f, " ({})", methods.join(", "))?;
        }
        if let Some(host) = &self.host {
            write!(f, " -> {host}")?;
        }
        Ok(())
    }
}

/// An immutable, sorted set of routes.
pub struct RuleMap<E> {
    converters: Arc<Converters>,
    strict_slashes: bool,
    routes: Vec<Arc<Route<E>>>,
}

impl<E> Clone for RuleMap<E> {
    fn clone(&self) -> Self {
        Self { converters: Arc::clone(&self.converters), strict_slashes: self.strict_slashes, routes: self.routes.clone() }
    }
}

impl<E> RuleMap<E> {
    pub fn new(converters: Arc<Converters>, strict_slashes: bool) -> Self {
        Self { converters, strict_slashes, routes: Vec::new() }
    }

    pub fn routes(&self) -> &[Arc<Route<E>>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn contains(&self, id: RouteId) -> bool {
        self.routes.iter().any(|route| route.id == id)
    }

    /// Compiles `spec` with the converters of this map, without adding it.
    pub fn compile(&self, spec: RuleSpec<E>) -> Result<Route<E>, RouteError> {
        let strict_slashes = spec.strict_slashes.unwrap_or(self.strict_slashes);
        let optional_trailing_slash = !strict_slashes && spec.path.len() > 1 && spec.path.ends_with('/');

        let path = CompiledPattern::compile(&spec.path, &self.converters, optional_trailing_slash)?;
        let host_matcher = HostMatcher::compile(spec.host.as_deref(), &self.converters)?;

        // GET implies HEAD
        let methods = spec.methods.map(|mut methods| {
            if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
                methods.push(Method::HEAD);
            }
            methods
        });

        Ok(Route {
            id: RouteId::next(),
            rule: spec.path,
            host: spec.host,
            methods,
            defaults: spec.defaults,
            strict_slashes,
            endpoint: spec.endpoint,
            path,
            host_matcher,
        })
    }

    /// Returns a new map holding the routes of this map plus `routes`.
    pub fn with_routes<I>(&self, routes: I) -> Self
    where
        I: IntoIterator<Item = Arc<Route<E>>>,
    {
        let mut new = self.clone();
        new.routes.extend(routes);
        new.routes.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        new
    }

    /// Returns a new map without the routes in `ids`.
    pub fn without(&self, ids: &HashSet<RouteId>) -> Self {
        let routes = self.routes.iter().filter(|route| !ids.contains(&route.id)).map(Arc::clone).collect();
        Self { converters: Arc::clone(&self.converters), strict_slashes: self.strict_slashes, routes }
    }

    pub fn bind(&self, host: &str) -> MapAdapter<'_, E> {
        MapAdapter { map: self, host: host.to_ascii_lowercase() }
    }
}

impl<E> fmt::Debug for RuleMap<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleMap").field("strict_slashes", &self.strict_slashes).field("routes", &self.routes).finish()
    }
}

/// A [`RuleMap`] bound to the host of a request.
#[derive(Debug)]
pub struct MapAdapter<'a, E> {
    map: &'a RuleMap<E>,
    host: String,
}

impl<'a, E> MapAdapter<'a, E> {
    /// Finds the first route matching `path` and `method`.
    ///
    /// Fails with [`RoutingError::MethodNotAllowed`] when routes match the path but none
    /// allows the method, with [`RoutingError::NotFound`] when no route matches the path.
    pub fn matches(&self, path: &str, method: &Method) -> Result<(&'a Arc<Route<E>>, PathArgs), RoutingError> {
        let mut allowed: Vec<Method> = Vec::new();
        let mut path_matched = false;

        for route in &self.map.routes {
            let mut args = PathArgs::new();
            if !route.host_matcher.matches(&self.host, &mut args) || !route.path.captures(path, &mut args) {
                continue;
            }

            if route.allows(method) {
                for (name, value) in route.defaults.iter() {
                    if !args.contains_key(name) {
                        args.insert(name, value.clone());
                    }
                }
                trace!(host = %self.host, path, %method, route = %route, "route matched");
                return Ok((route, args));
            }

            path_matched = true;
            for candidate in route.methods.iter().flatten() {
                if !allowed.contains(candidate) {
                    allowed.push(candidate.clone());
                }
            }
        }

        if path_matched {
            Err(RoutingError::MethodNotAllowed { method: method.clone(), path: path.to_owned(), allowed })
        } else {
            Err(RoutingError::NotFound { method: method.clone(), path: path.to_owned() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::ArgValue;

    fn map_of(rules: Vec<RuleSpec<&'static str>>) -> RuleMap<&'static str> {
        let map = RuleMap::new(Arc::new(Converters::default()), false);
        let routes: Vec<_> = rules.into_iter().map(|spec| Arc::new(map.compile(spec).unwrap())).collect();
        map.with_routes(routes)
    }

    fn endpoint(map: &RuleMap<&'static str>, host: &str, path: &str, method: Method) -> Result<(&'static str, PathArgs), RoutingError> {
        map.bind(host).matches(path, &method).map(|(route, args)| (*route.endpoint(), args))
    }

    #[test]
    fn static_rules_win_over_dynamic() {
        let map = map_of(vec![
            RuleSpec::new("/items/<id>", "item"),
            RuleSpec::new("/items/new", "new"),
            RuleSpec::new("/items/<path:rest>", "rest"),
            RuleSpec::new("/items/<id>/edit", "edit"),
        ]);

        assert_eq!(endpoint(&map, "", "/items/new", Method::GET).unwrap().0, "new");
        assert_eq!(endpoint(&map, "", "/items/1", Method::GET).unwrap().0, "item");
        assert_eq!(endpoint(&map, "", "/items/1/edit", Method::GET).unwrap().0, "edit");
        assert_eq!(endpoint(&map, "", "/items/1/a/b", Method::GET).unwrap().0, "rest");
    }

    #[test]
    fn int_converter_rejects_text() {
        let map = map_of(vec![RuleSpec::new("/items/<int:id>", "item")]);

        let (_, args) = endpoint(&map, "", "/items/42", Method::GET).unwrap();
        assert_eq!(args.get("id"), Some(&ArgValue::Int(42)));
        assert!(matches!(endpoint(&map, "", "/items/abc", Method::GET), Err(RoutingError::NotFound { .. })));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let map = map_of(vec![
            RuleSpec::new("/items", "list").methods([Method::GET]),
            RuleSpec::new("/items", "create").methods([Method::POST]),
        ]);

        assert_eq!(endpoint(&map, "", "/items", Method::POST).unwrap().0, "create");
        assert_eq!(endpoint(&map, "", "/items", Method::HEAD).unwrap().0, "list");

        let error = endpoint(&map, "", "/items", Method::DELETE).unwrap_err();
        assert_eq!(
            error,
            RoutingError::MethodNotAllowed {
                method: Method::DELETE,
                path: "/items".into(),
                allowed: vec![Method::GET, Method::HEAD, Method::POST]
            }
        );
    }

    #[test]
    fn head_rule_registered_first_wins() {
        let map = map_of(vec![
            RuleSpec::new("/doc", "head").methods([Method::HEAD]),
            RuleSpec::new("/doc", "get").methods([Method::GET]),
        ]);

        assert_eq!(endpoint(&map, "", "/doc", Method::HEAD).unwrap().0, "head");
        assert_eq!(endpoint(&map, "", "/doc", Method::GET).unwrap().0, "get");
    }

    #[test]
    fn trailing_slash_is_optional() {
        let map = map_of(vec![
            RuleSpec::new("/loose/", "loose"),
            RuleSpec::new("/strict/", "strict").strict_slashes(true),
        ]);

        assert_eq!(endpoint(&map, "", "/loose", Method::GET).unwrap().0, "loose");
        assert_eq!(endpoint(&map, "", "/loose/", Method::GET).unwrap().0, "loose");
        assert_eq!(endpoint(&map, "", "/strict/", Method::GET).unwrap().0, "strict");
        assert!(endpoint(&map, "", "/strict", Method::GET).is_err());
    }

    #[test]
    fn host_patterns() {
        let map = map_of(vec![
            RuleSpec::new("/", "any").host(HOST_WILDCARD),
            RuleSpec::new("/", "api").host("<name>.api.localhost<port:port>"),
        ]);

        let (name, args) = endpoint(&map, "Orders.API.localhost:4566", "/", Method::GET).unwrap();
        assert_eq!(name, "api");
        assert_eq!(args.get("name"), Some(&ArgValue::from("orders")));
        assert_eq!(args.get("port"), Some(&ArgValue::Int(4566)));

        let (name, args) = endpoint(&map, "example.com", "/", Method::GET).unwrap();
        assert_eq!(name, "any");
        assert_eq!(args.get(HOST_ARG), Some(&ArgValue::from("example.com")));

        let (name, _) = endpoint(&map, "", "/", Method::GET).unwrap();
        assert_eq!(name, "any");
    }

    #[test]
    fn raw_path_captures_stay_encoded() {
        let map = map_of(vec![RuleSpec::new("/proxy/<path:path>", "proxy")]);

        let (_, args) = endpoint(&map, "", "/proxy/a%2Fb/c%20d", Method::GET).unwrap();
        assert_eq!(args.get("path"), Some(&ArgValue::from("a%2Fb/c%20d")));
    }

    #[test]
    fn defaults_are_merged() {
        let map = map_of(vec![RuleSpec::new("/page", "page").defaults(PathArgs::new().with("number", 1_i64))]);

        let (_, args) = endpoint(&map, "", "/page", Method::GET).unwrap();
        assert_eq!(args.get("number"), Some(&ArgValue::Int(1)));
    }

    #[test]
    fn invalid_patterns() {
        let map: RuleMap<&str> = RuleMap::new(Arc::new(Converters::default()), false);

        assert!(matches!(map.compile(RuleSpec::new("/<open", "x")), Err(RouteError::InvalidPattern { .. })));
        assert!(matches!(map.compile(RuleSpec::new("/<a>/<a>", "x")), Err(RouteError::InvalidPattern { .. })));
        assert!(matches!(map.compile(RuleSpec::new("/<nope:a>", "x")), Err(RouteError::UnknownConverter { .. })));
        assert!(matches!(map.compile(RuleSpec::new("/<regex('['):a>", "x")), Err(RouteError::InvalidPattern { .. })));
    }

    #[test]
    fn regex_converter_with_parentheses() {
        let map = map_of(vec![RuleSpec::new("/<regex('(?:a|b)+'):word>/x", "word")]);

        let (_, args) = endpoint(&map, "", "/abba/x", Method::GET).unwrap();
        assert_eq!(args.get("word"), Some(&ArgValue::from("abba")));
        assert!(endpoint(&map, "", "/abc/x", Method::GET).is_err());
    }

    #[test]
    fn removal_keeps_identity() {
        let map = map_of(vec![RuleSpec::new("/a", "a"), RuleSpec::new("/b", "b")]);
        let removed = map.routes()[0].id();

        let new = map.without(&HashSet::from([removed]));
        assert_eq!(new.len(), 1);
        assert!(!new.contains(removed));
        assert!(map.contains(removed));
    }
}
