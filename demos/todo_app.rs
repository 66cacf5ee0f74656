//! Todo list served through the dispatcher from the command line.
//!
//! ```text
//! cargo run --example todo_app -- todos/items/add?title=milk
//! cargo run --example todo_app -- --http POST /todos/items/add '{"title": "bread"}'
//! cargo run --example todo_app -- todos/maintenance/purge --force
//! ```
//!
//! Settings come from `TODO_*` environment variables and an optional `.env`
//! file, e.g. `TODO_LOG_LEVEL=trace`.

use praetor::prelude::*;
use praetor::{HeaderMap, HeaderValue, TrimStrings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::io::Cursor;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct NewItem {
    title: String,
    note: Option<String>,
}

impl Model for NewItem {}

#[derive(Default)]
struct TodoStore {
    items: Mutex<Vec<Value>>,
}

impl Construct for TodoStore {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(TodoStore::default())
    }
}

impl Injectable for TodoStore {
    fn singleton() -> bool {
        true
    }
}

struct ItemsController {
    store: Arc<TodoStore>,
}

impl Construct for ItemsController {
    fn signature() -> Signature {
        Signature::new().injectable::<TodoStore>("store")
    }

    fn construct(args: &mut Arguments<'_>) -> Result<Self> {
        Ok(ItemsController {
            store: args.injected("store")?,
        })
    }
}

impl ItemsController {
    fn list(&mut self, _: &mut Arguments<'_>) -> Result<Reply> {
        Ok(Reply::Data(Value::Array(self.store.items.lock().clone())))
    }

    fn add(&mut self, args: &mut Arguments<'_>) -> Result<Reply> {
        let item: NewItem = args.take_model("item")?;
        let mut items = self.store.items.lock();
        let stored = json!({ "id": items.len(), "title": item.title, "note": item.note });
        items.push(stored.clone());
        Ok(Reply::respond(StatusCode::CREATED, Some(stored)))
    }
}

/// Rejects requests that do not pass `--force`
struct RequireForce;

impl Construct for RequireForce {
    fn construct(_: &mut Arguments<'_>) -> Result<Self> {
        Ok(RequireForce)
    }
}

impl Middleware for RequireForce {
    fn handle(&self, ctx: &mut RequestContext, _previous: Option<&Value>) -> MiddlewareResolution {
        if ctx.cli_arguments().iter().any(|arg| arg == "--force") {
            MiddlewareResolution::proceed()
        } else {
            MiddlewareResolution::reject_bad_request("Refusing to purge without --force")
        }
    }
}

struct MaintenanceController {
    store: Arc<TodoStore>,
    config: Arc<ConfigManager>,
}

impl Construct for MaintenanceController {
    fn signature() -> Signature {
        Signature::new()
            .injectable::<TodoStore>("store")
            .injectable::<ConfigManager>("config")
    }

    fn construct(args: &mut Arguments<'_>) -> Result<Self> {
        Ok(MaintenanceController {
            store: args.injected("store")?,
            config: args.injected("config")?,
        })
    }
}

impl MaintenanceController {
    fn purge(&mut self, _: &mut Arguments<'_>) -> Result<Reply> {
        let removed = std::mem::take(&mut *self.store.items.lock()).len();
        let env: String = self.config.get_or("app_env", "dev".to_string())?;
        Ok(Reply::Data(json!({ "removed": removed, "env": env })))
    }
}

struct TodosModule;

impl Module for TodosModule {
    fn groups(&self) -> Vec<HandlerGroup> {
        vec![
            HandlerGroup::builder::<ItemsController>("Todos", "ItemsController")
                .entrypoint("list")
                .middleware(MiddlewareDescriptor::new::<TrimStrings>())
                .add(HandlerMethod::new("list", Signature::new(), ItemsController::list).only(HttpMethod::GET))
                .add(
                    HandlerMethod::new(
                        "add",
                        Signature::new().model::<NewItem>("item"),
                        ItemsController::add,
                    )
                    .only(HttpMethod::POST),
                )
                .build(),
            HandlerGroup::builder::<MaintenanceController>("Todos", "MaintenanceController")
                .cli_only()
                .entrypoint("purge")
                .middleware(MiddlewareDescriptor::new::<RequireForce>())
                .method("purge", Signature::new(), MaintenanceController::purge)
                .build(),
        ]
    }
}

fn main() -> ExitCode {
    let config = match ConfigManager::builder()
        .with_prefix("TODO")
        .dotenv(None)
        .env()
        .build()
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let settings = match AppConfig::from_manager(&config) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let _guard = match settings.log_config().init() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cache = SharedInstanceCache::new();
    cache.insert(Arc::new(config));

    let dispatcher = Dispatcher::new(HandlerRegistry::new().with_module(&TodosModule))
        .with_options(settings.dispatcher_options())
        .with_cache(cache);
    let app = Application::new(dispatcher).with_body_options(settings.body_options());

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--http") {
        let method = args.get(1).map(String::as_str).unwrap_or("GET");
        let uri = args.get(2).map(String::as_str).unwrap_or("/");
        let body = args.get(3).cloned().unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let response = app.handle_http(method, uri, headers, Cursor::new(body.into_bytes()));
        println!("{} {}", response.status, String::from_utf8_lossy(&response.body));
        return if response.status < 400 {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        };
    }

    let output = app.handle_cli(&args);
    if !output.output.is_empty() {
        println!("{}", output.output);
    }
    ExitCode::from(output.exit_code() as u8)
}
