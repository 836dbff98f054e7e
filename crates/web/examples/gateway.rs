use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use switchyard_http::protocol::{Request, Response};
use switchyard_web::dispatch::{HandlerEndpoint, Json, JsonSchema, Path, Validated, endpoint, handler_dispatcher};
use switchyard_web::gateway::handler_fn;
use switchyard_web::router::{Resource, Submount};
use switchyard_web::{
    BlockingBridge, Context, EmptyResponseHandler, Gateway, HandlerChain, HttpErrorHandler, HttpError, RequestContext,
    Router, RouterHandler,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Serialize, Debug)]
struct Item {
    name: String,
    price: f64,
}

impl JsonSchema for Item {
    fn json_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name", "price"],
            "properties": {
                "name": {"type": "string", "minLength": 1},
                "price": {"type": "number", "minimum": 0}
            }
        })
    }
}

#[derive(Deserialize)]
struct ItemPath {
    id: i64,
}

fn list_items(_request: &Request) -> Value {
    json!([{"id": 1, "name": "ball"}])
}

fn create_item(_request: &Request, Validated(item): Validated<Item>) -> Json<Item> {
    Json(item)
}

fn get_item(_request: &Request, Path(path): Path<ItemPath>) -> Result<Value, HttpError> {
    if path.id == 1 {
        Ok(json!({"id": 1, "name": "ball"}))
    } else {
        Err(HttpError::not_found(format!("no item {}", path.id)))
    }
}

fn request(method: Method, uri: &str, body: &'static str) -> Request {
    let request = http::Request::builder().method(method).uri(uri).header("host", "localhost").body(body);
    Request::from(request.expect("request should be valid"))
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let router: Router<HandlerEndpoint> = Router::builder(handler_dispatcher()).build();
    router
        .add(Submount::new(
            "/api",
            vec![
                Resource::new("/items").get(endpoint(list_items)).post(endpoint(create_item)),
                Resource::new("/items/<int:id>").get(endpoint(get_item)),
            ],
        ))
        .expect("routes should be valid");

    let gateway: Gateway = Gateway::builder()
        .request_handler(handler_fn(|_chain: &mut HandlerChain, context: &mut RequestContext, _response: &mut Response| {
            context.set("started", Instant::now());
            Ok(())
        }))
        .request_handler(RouterHandler::new(Arc::new(router)))
        .response_handler(EmptyResponseHandler::new(StatusCode::NOT_FOUND).body("not found"))
        .exception_handler(HttpErrorHandler::default())
        .finalizer(handler_fn(|_chain: &mut HandlerChain, context: &mut RequestContext, response: &mut Response| {
            let elapsed = context.get::<Instant>("started").map(Instant::elapsed).unwrap_or_default();
            info!(method = %context.request().method(), path = context.request().raw_path(), status = %response.status(), ?elapsed, "served");
            Ok(())
        }))
        .build();

    let bridge = BlockingBridge::new(Arc::new(gateway), 4);

    let requests = vec![
        request(Method::GET, "/api/items", ""),
        request(Method::HEAD, "/api/items", ""),
        request(Method::POST, "/api/items", r#"{"name": "ball", "price": 3.5}"#),
        request(Method::POST, "/api/items", r#"{"name": ""}"#),
        request(Method::GET, "/api/items/1", ""),
        request(Method::GET, "/api/items/2", ""),
        request(Method::DELETE, "/api/items/1", ""),
        request(Method::GET, "/nowhere", ""),
    ];

    for request in requests {
        let (method, uri) = (request.method().clone(), request.uri().clone());
        match bridge.process(request).await {
            Ok(mut response) => {
                let body = response.data().unwrap_or_default();
                println!("{method} {uri} -> {} {}", response.status(), String::from_utf8_lossy(&body));
            }
            Err(e) => println!("{method} {uri} -> failed: {e}"),
        }
    }
}
