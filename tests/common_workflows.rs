//! Integration tests for common Praetor workflows.
//!
//! A small inventory application is registered once and driven through the
//! HTTP and CLI entry points.

use praetor::prelude::*;
use praetor::{BodyOptions, HeaderMap, HeaderValue, MultipartLimits};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::Cursor;
use std::sync::Arc;

// =============================================================================
// Application under test
// =============================================================================

#[derive(Default)]
struct Inventory {
    products: Mutex<Vec<Value>>,
    images: Mutex<Vec<String>>,
}

impl Construct for Inventory {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(Inventory::default())
    }
}

impl Injectable for Inventory {
    fn singleton() -> bool {
        true
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Dimensions {
    width: f64,
    height: f64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NewProduct {
    sku: String,
    price: f64,
    dimensions: Dimensions,
    tags: Vec<String>,
    description: Option<String>,
}

impl Model for NewProduct {}

struct ProductsController {
    inventory: Arc<Inventory>,
}

impl Construct for ProductsController {
    fn signature() -> Signature {
        Signature::new().injectable::<Inventory>("inventory")
    }

    fn construct(args: &mut Arguments<'_>) -> Result<Self> {
        Ok(ProductsController {
            inventory: args.injected("inventory")?,
        })
    }
}

impl ProductsController {
    fn index(&mut self, _: &mut Arguments<'_>) -> Result<Reply> {
        Ok(Reply::Data(Value::Array(self.inventory.products.lock().clone())))
    }

    fn create(&mut self, args: &mut Arguments<'_>) -> Result<Reply> {
        let product: NewProduct = args.take_model("product")?;
        let stored = serde_json::to_value(&product).map_err(|e| Error::Internal(e.to_string()))?;
        self.inventory.products.lock().push(stored);
        Ok(Reply::Status(StatusCode::CREATED))
    }

    fn upload_image(&mut self, args: &mut Arguments<'_>) -> Result<Reply> {
        let sku: String = args.get("sku")?;
        let ctx = args.context_mut()?;
        let image = ctx
            .take_file("image")
            .ok_or_else(|| Error::InvalidValue("image is required".into()))?;

        if !image.is_ok() || !image.is_image() {
            return Ok(Reply::Status(StatusCode::UNPROCESSABLE_ENTITY));
        }
        self.inventory.images.lock().push(format!("{}:{}", sku, image.original_name));
        Ok(Reply::Data(json!({ "sku": sku, "bytes": image.size_bytes })))
    }

    fn delete(&mut self, _: &mut Arguments<'_>) -> Result<Reply> {
        self.inventory.products.lock().clear();
        Ok(Reply::Empty)
    }
}

struct StockController;

impl Construct for StockController {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(StockController)
    }
}

/// Requires an `x-api-key` header on HTTP requests and forwards the caller
struct ApiKey;

impl Construct for ApiKey {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(ApiKey)
    }
}

impl Middleware for ApiKey {
    fn handle(&self, ctx: &mut RequestContext, _previous: Option<&Value>) -> MiddlewareResolution {
        if ctx.is_cli() {
            return MiddlewareResolution::next(json!({"caller": "cli"}));
        }
        match ctx.header("x-api-key") {
            Some("secret") => MiddlewareResolution::next(json!({"caller": "api"})),
            _ => MiddlewareResolution::reject("Invalid API key", StatusCode::UNAUTHORIZED),
        }
    }
}

struct InventoryModule;

impl Module for InventoryModule {
    fn groups(&self) -> Vec<HandlerGroup> {
        vec![
            HandlerGroup::builder::<ProductsController>("Inventory", "ProductsController")
                .entrypoint("index")
                .middleware(MiddlewareDescriptor::new::<ApiKey>())
                .add(HandlerMethod::new("index", Signature::new(), ProductsController::index).only(HttpMethod::GET))
                .add(
                    HandlerMethod::new(
                        "create",
                        Signature::new().model::<NewProduct>("product"),
                        ProductsController::create,
                    )
                    .only(HttpMethod::POST),
                )
                .add(
                    HandlerMethod::new(
                        "uploadImage",
                        Signature::new().scalar("sku", ScalarKind::String),
                        ProductsController::upload_image,
                    )
                    .only(HttpMethod::POST),
                )
                .add(HandlerMethod::new("delete", Signature::new(), ProductsController::delete).only(HttpMethod::DELETE))
                .build(),
            HandlerGroup::builder::<StockController>("Inventory", "StockController")
                .cli_only()
                .method(
                    "recount",
                    Signature::new().nullable_scalar("warehouse", ScalarKind::String),
                    |_: &mut StockController, args| {
                        let warehouse: Option<String> = args.get("warehouse")?;
                        Ok(Reply::Data(json!({ "warehouse": warehouse.unwrap_or_else(|| "all".into()) })))
                    },
                )
                .build(),
        ]
    }
}

fn app() -> Application {
    let dispatcher = Dispatcher::new(HandlerRegistry::new().with_module(&InventoryModule))
        .with_global_middleware(MiddlewareChain::new().with::<praetor::TrimStrings>());
    Application::new(dispatcher)
}

fn api_headers(content_type: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-api-key", HeaderValue::from_static("secret"));
    if !content_type.is_empty() {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert("content-type", value);
        }
    }
    headers
}

fn empty() -> Cursor<Vec<u8>> {
    Cursor::new(Vec::new())
}

// =============================================================================
// HTTP workflows
// =============================================================================

#[test]
fn test_create_then_list_products() {
    let app = app();

    let created = app.handle_http(
        "POST",
        "/inventory/products/create",
        api_headers("application/json"),
        Cursor::new(
            br#"{"sku": " A-1 ", "price": "9.5", "dimensions": "{\"width\": 2, \"height\": 3}", "tags": ["new"]}"#
                .to_vec(),
        ),
    );
    assert_eq!(created.status, 201);
    assert!(created.body.is_empty());

    let listed = app.handle_http("GET", "/inventory/products", api_headers(""), empty());
    assert_eq!(listed.status, 200);

    let products = listed.body_json().unwrap();
    assert_eq!(products[0]["sku"], "A-1");
    assert_eq!(products[0]["price"], 9.5);
    assert_eq!(products[0]["dimensions"]["height"], 3.0);
    assert_eq!(products[0]["tags"], json!(["new"]));
    assert_eq!(products[0]["description"], Value::Null);
}

#[test]
fn test_form_encoded_product() {
    let app = app();

    let created = app.handle_http(
        "POST",
        "/inventory/products/create",
        api_headers("application/x-www-form-urlencoded"),
        Cursor::new(
            b"sku=B-2&price=3&dimensions[width]=1&dimensions[height]=1&tags[]=a&tags[]=b".to_vec(),
        ),
    );
    assert_eq!(created.status, 201);
}

#[test]
fn test_incomplete_product_is_a_bad_request() {
    let app = app();

    let response = app.handle_http(
        "POST",
        "/inventory/products/create",
        api_headers("application/json"),
        Cursor::new(br#"{"sku": "C-3"}"#.to_vec()),
    );

    assert_eq!(response.status, 400);
    assert!(response.body.is_empty());
}

#[test]
fn test_missing_api_key_is_rejected() {
    let app = app();

    let response = app.handle_http("GET", "/inventory/products", HeaderMap::new(), empty());

    assert_eq!(response.status, 401);
}

#[test]
fn test_wrong_verb_wins_over_api_key() {
    let app = app();

    let response = app.handle_http("GET", "/inventory/products/delete", HeaderMap::new(), empty());

    assert_eq!(response.status, 405);
}

#[test]
fn test_delete_replies_empty() {
    let app = app();

    let response = app.handle_http("DELETE", "/inventory/products/delete", api_headers(""), empty());

    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[test]
fn test_image_upload() {
    let upload_dir = tempfile::tempdir().unwrap();
    let app = app().with_body_options(BodyOptions {
        multipart: MultipartLimits {
            temp_dir: Some(upload_dir.path().to_path_buf()),
            ..MultipartLimits::default()
        },
    });

    let body = concat!(
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"sku\"\r\n\r\n",
        "A-1\r\n",
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"image\"; filename=\"front.jpg\"\r\n",
        "Content-Type: image/jpeg\r\n\r\n",
        "0123456789\r\n",
        "--XBOUNDARY--\r\n",
    );

    let response = app.handle_http(
        "POST",
        "/inventory/products/upload-image",
        api_headers("multipart/form-data; boundary=XBOUNDARY"),
        Cursor::new(body.as_bytes().to_vec()),
    );

    assert_eq!(response.status, 200);
    assert_eq!(response.body_json(), Some(json!({"sku": "A-1", "bytes": 10})));
    // The upload was not moved, so it is gone once the request is over
    assert_eq!(std::fs::read_dir(upload_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_unknown_routes() {
    let app = app();

    assert_eq!(app.handle_http("GET", "/warehouse", api_headers(""), empty()).status, 404);
    assert_eq!(
        app.handle_http("GET", "/inventory/products/export", api_headers(""), empty()).status,
        404
    );
    assert_eq!(app.handle_http("OPTIONS", "/anything", HeaderMap::new(), empty()).status, 200);
}

// =============================================================================
// CLI workflows
// =============================================================================

#[test]
fn test_cli_only_group() {
    let app = app();

    let output = app.handle_cli(&["inventory/stock/recount?warehouse=north".to_string()]);
    assert_eq!(output.exit_code(), 0);
    assert_eq!(output.output, r#"{"warehouse":"north"}"#);

    let output = app.handle_cli(&["inventory/stock/recount".to_string()]);
    assert_eq!(output.output, r#"{"warehouse":"all"}"#);

    let http = app.handle_http("GET", "/inventory/stock/recount", api_headers(""), empty());
    assert_eq!(http.status, 500);
}

#[test]
fn test_cli_reaches_http_groups_without_verb_checks() {
    let app = app();

    let output = app.handle_cli(&["inventory/products/delete".to_string()]);

    assert_eq!(output.status, StatusCode::OK);
    assert_eq!(output.output, "");
}

#[test]
fn test_cli_route_required() {
    let output = app().handle_cli(&[]);

    assert_eq!(output.status, StatusCode::NOT_FOUND);
    assert_eq!(output.exit_code(), 1);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_config_is_injectable() {
    let config = ConfigManager::new();
    config.set("app_namespace", "Shop").unwrap();
    let settings = AppConfig::from_manager(&config).unwrap();

    let cache = SharedInstanceCache::new();
    cache.insert(Arc::new(config));

    let dispatcher = Dispatcher::new(
        HandlerRegistry::new().with(
            HandlerGroup::builder::<StockController>("Settings", "SettingsController")
                .namespace("Shop")
                .entrypoint("show")
                .method(
                    "show",
                    Signature::new().injectable::<ConfigManager>("config"),
                    |_: &mut StockController, args| {
                        let config: Arc<ConfigManager> = args.injected("config")?;
                        Ok(Reply::Data(json!(config.get_string("app_namespace")?)))
                    },
                )
                .build(),
        ),
    )
    .with_options(settings.dispatcher_options())
    .with_cache(cache);

    let output = Application::new(dispatcher).handle_cli(&["settings".to_string()]);

    assert_eq!(output.output, r#""Shop""#);
}
