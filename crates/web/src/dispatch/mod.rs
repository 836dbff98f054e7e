//! Structured endpoints and the dispatcher that calls them.
//!
//! A structured endpoint is a plain function taking the request followed by up to six
//! [`FromCall`] arguments and returning anything that implements [`IntoReply`].
//!
//! ```
//! use serde::Deserialize;
//! use serde_json::{Value, json};
//! use switchyard_http::protocol::Request;
//! use switchyard_web::dispatch::{HandlerEndpoint, Path, endpoint, handler_dispatcher};
//! use switchyard_web::router::Router;
//!
//! #[derive(Deserialize)]
//! struct ItemPath {
//!     id: i64,
//! }
//!
//! fn get_item(_request: &Request, Path(path): Path<ItemPath>) -> Value {
//!     json!({"id": path.id})
//! }
//!
//! let router: Router<HandlerEndpoint> = Router::builder(handler_dispatcher()).build();
//! router.add(("/items/<int:id>", endpoint(get_item))).unwrap();
//!
//! let request = Request::from(http::Request::get("/items/42").body(()).unwrap());
//! let mut response = router.dispatch(&request).unwrap();
//! assert_eq!(response.data().unwrap(), r#"{"id":42}"#);
//! ```

mod extract;
mod reply;
#[cfg(feature = "schema")]
mod schema;

pub use extract::{FromCall, Json, JsonSchema, Path, Query, Validated};
pub use reply::{IntoReply, Reply};
#[cfg(feature = "schema")]
pub use schema::SchemaValidator;

use crate::error::{DispatchError, FieldError};
use crate::router::{Dispatcher, PathArgs};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use switchyard_http::protocol::{Request, Response};

/// The structured body an endpoint expects.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyParameter {
    type_name: &'static str,
    schema: Option<Value>,
}

impl BodyParameter {
    pub fn new(type_name: &'static str) -> Self {
        Self { type_name, schema: None }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }
}

/// What an endpoint needs from the dispatcher besides the path arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    body: Option<BodyParameter>,
}

impl Signature {
    /// Declares the structured body. Only the first declaration counts.
    pub fn declare_body(&mut self, body: BodyParameter) {
        if self.body.is_none() {
            self.body = Some(body);
        }
    }

    pub fn body(&self) -> Option<&BodyParameter> {
        self.body.as_ref()
    }
}

/// The inputs of one endpoint call.
#[derive(Debug)]
pub struct CallArgs<'a> {
    request: &'a Request,
    path: PathArgs,
    body: Option<Value>,
}

impl<'a> CallArgs<'a> {
    pub fn new(request: &'a Request, path: PathArgs, body: Option<Value>) -> Self {
        Self { request, path, body }
    }

    pub fn request(&self) -> &'a Request {
        self.request
    }

    pub fn path(&self) -> &PathArgs {
        &self.path
    }

    /// The parsed json body, present when the endpoint declared one.
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

pub trait Endpoint: Send + Sync {
    fn signature(&self) -> &Signature;

    fn invoke(&self, args: CallArgs<'_>) -> Result<Reply, DispatchError>;
}

pub type HandlerEndpoint = Arc<dyn Endpoint>;

/// Declares the arguments of a function endpoint, in order.
pub trait FromCallArgs {
    fn declare(signature: &mut Signature);
}

/// A function endpoint, see [`endpoint`].
pub struct FnEndpoint<F, Args> {
    f: F,
    signature: Signature,
    _args: PhantomData<fn(Args)>,
}

impl<F, Args> fmt::Debug for FnEndpoint<F, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnEndpoint").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Wraps a function `fn(&Request, A, B, ..) -> R` into a [`HandlerEndpoint`].
pub fn endpoint<F, Args>(f: F) -> HandlerEndpoint
where
    Args: FromCallArgs + 'static,
    F: Send + Sync + 'static,
    FnEndpoint<F, Args>: Endpoint,
{
    let mut signature = Signature::default();
    Args::declare(&mut signature);
    Arc::new(FnEndpoint { f, signature, _args: PhantomData })
}

macro_rules! impl_endpoint_for_fn ({ $($param:ident)* } => {
    impl<$($param: FromCall,)*> FromCallArgs for ($($param,)*) {
        fn declare(_signature: &mut Signature) {
            $($param::declare(_signature);)*
        }
    }

    impl<Func, R, $($param,)*> Endpoint for FnEndpoint<Func, ($($param,)*)>
    where
        Func: Fn(&Request, $($param),*) -> R + Send + Sync,
        R: IntoReply,
        $($param: FromCall,)*
    {
        fn signature(&self) -> &Signature {
            &self.signature
        }

        #[allow(non_snake_case, reason = "arguments are named after their type parameters")]
        fn invoke(&self, args: CallArgs<'_>) -> Result<Reply, DispatchError> {
            $(let $param = $param::from_call(&args)?;)*
            (self.f)(args.request(), $($param),*).into_reply()
        }
    }
});

impl_endpoint_for_fn! {}
impl_endpoint_for_fn! { A }
impl_endpoint_for_fn! { A B }
impl_endpoint_for_fn! { A B C }
impl_endpoint_for_fn! { A B C D }
impl_endpoint_for_fn! { A B C D E }
impl_endpoint_for_fn! { A B C D E G }

/// Dispatches to [`HandlerEndpoint`]s, binding the json body when one is declared.
#[derive(Debug, Default)]
pub struct HandlerDispatcher {
    #[cfg(feature = "schema")]
    validator: Option<SchemaValidator>,
}

impl HandlerDispatcher {
    /// A dispatcher that binds bodies without checking schemas.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that checks bodies of [`Validated`] arguments against their schema.
    #[cfg(feature = "schema")]
    pub fn validating() -> Self {
        Self { validator: Some(SchemaValidator::new()) }
    }

    fn bind_body(&self, request: &Request, parameter: &BodyParameter) -> Result<Value, DispatchError> {
        let data = request.data().map_err(DispatchError::invalid_arguments)?;
        let body: Value = serde_json::from_slice(data).map_err(|e| {
            DispatchError::bad_request(vec![FieldError::new("json_invalid", vec!["body".to_owned()], e.to_string())])
        })?;

        self.check_schema(parameter, &body)?;
        Ok(body)
    }

    #[cfg(feature = "schema")]
    fn check_schema(&self, parameter: &BodyParameter, body: &Value) -> Result<(), DispatchError> {
        match (&self.validator, parameter.schema()) {
            (Some(validator), Some(schema)) => validator.validate(schema, body),
            _ => Ok(()),
        }
    }

    #[cfg(not(feature = "schema"))]
    #[allow(clippy::unused_self, clippy::unnecessary_wraps, reason = "schema validation is compiled out")]
    fn check_schema(&self, _parameter: &BodyParameter, _body: &Value) -> Result<(), DispatchError> {
        Ok(())
    }
}

impl Dispatcher<HandlerEndpoint> for HandlerDispatcher {
    fn dispatch(&self, request: &Request, endpoint: &HandlerEndpoint, args: PathArgs) -> Result<Response, DispatchError> {
        let body = match endpoint.signature().body() {
            Some(parameter) => Some(self.bind_body(request, parameter)?),
            None => None,
        };

        endpoint.invoke(CallArgs::new(request, args, body))?.into_response()
    }
}

/// The structured dispatcher, validating schemas when the `schema` feature is enabled.
#[cfg(feature = "schema")]
pub fn handler_dispatcher() -> HandlerDispatcher {
    HandlerDispatcher::validating()
}

/// The structured dispatcher, validating schemas when the `schema` feature is enabled.
#[cfg(not(feature = "schema"))]
pub fn handler_dispatcher() -> HandlerDispatcher {
    HandlerDispatcher::new()
}
