//! End-to-end workflows through the facade crate: configuration, a stateful
//! controller behind an API key, and production error masking.

use corbel::prelude::*;
use corbel::{ApiKeyGuard, FieldError, RequestIdMiddleware};
use corbel_testing::{Spy, TestClient};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Users controller
// =============================================================================

#[derive(Default)]
struct UsersController {
    users: Mutex<BTreeMap<u64, Value>>,
    next_id: AtomicU64,
    spy: Spy,
}

fn require_name(value: Option<&ArgValue>) -> Vec<FieldError> {
    let name = match value {
        Some(ArgValue::Json(body)) => body.get("name").and_then(Value::as_str),
        _ => None,
    };
    match name {
        Some(name) if !name.trim().is_empty() => Vec::new(),
        _ => vec![FieldError::new("name", "is required")],
    }
}

impl Controller for UsersController {
    fn declare(d: &mut ControllerDecl<'_, Self>) {
        d.controller("/users");
        d.use_middleware(MiddlewareRef::of::<RequestIdMiddleware>());
        d.use_guard(GuardRef::new(|| ApiKeyGuard::new(vec!["secret".to_string()])));

        d.get("/", "list", |this, _args| async move {
            this.spy.record("list");
            let users: Vec<Value> = this.users.lock().unwrap().values().cloned().collect();
            Ok(Reply::Json(json!(users)))
        });

        d.get("/:id", "find", |this, args| async move {
            let id: u64 = args.parse(0)?;
            this.spy.record_with("find", [id.to_string()]);
            this.users
                .lock()
                .unwrap()
                .get(&id)
                .cloned()
                .map(Reply::Json)
                .ok_or_else(|| Error::NotFound(format!("User {id} not found")))
        })
        .param(ParamDescriptor::path(0, "id").pipe(ParseIntPipe));

        d.post("/", "create", |this, args| async move {
            let mut user = args.json(0).cloned().unwrap_or(Value::Null);
            let id = this.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            user["id"] = json!(id);
            this.users.lock().unwrap().insert(id, user.clone());
            Ok(Reply::Json(user))
        })
        .param(ParamDescriptor::body(0).pipe(ValidationPipe::new(require_name)))
        .http_code(HttpStatus::Created);

        d.delete("/:id", "remove", |this, args| async move {
            let id: u64 = args.parse(0)?;
            match this.users.lock().unwrap().remove(&id) {
                Some(_) => Ok(Reply::NoContent),
                None => Err(Error::NotFound(format!("User {id} not found"))),
            }
        })
        .param(ParamDescriptor::path(0, "id"));
    }
}

fn users_client() -> (TestClient, Spy) {
    let controller = UsersController::default();
    let spy = controller.spy.clone();
    let mut client = TestClient::isolated();
    client.register(controller, Some("/api")).unwrap();
    (client, spy)
}

#[tokio::test]
async fn test_guard_rejects_missing_and_wrong_keys() {
    let (client, spy) = users_client();

    client
        .get("/api/users")
        .send()
        .await
        .assert_status(401)
        .assert_json_field("message", "Missing API key");

    client
        .get("/api/users")
        .header("X-Api-Key", "guess")
        .send()
        .await
        .assert_status(403)
        .assert_json_field("message", "Invalid API key");

    assert!(!spy.was_called("list"));
}

#[tokio::test]
async fn test_crud_round_trip() {
    let (client, spy) = users_client();

    let created = client
        .post("/api/users")
        .header("x-api-key", "secret")
        .json(&json!({ "name": "Ada" }))
        .send()
        .await;
    created
        .assert_status(201)
        .assert_json(&json!({ "name": "Ada", "id": 1 }));
    assert!(created.header("x-request-id").is_some());

    client
        .get("/api/users/1")
        .header("x-api-key", "secret")
        .header("x-request-id", "trace-7")
        .send()
        .await
        .assert_status(200)
        .assert_header("x-request-id", "trace-7")
        .assert_json_field("name", "Ada");
    assert_eq!(spy.last().map(|call| call.args), Some(vec!["1".to_string()]));

    client
        .delete("/api/users/1")
        .header("x-api-key", "secret")
        .send()
        .await
        .assert_status(204)
        .assert_empty_body();

    client
        .get("/api/users/1")
        .header("x-api-key", "secret")
        .send()
        .await
        .assert_status(404)
        .assert_json_field("message", "User 1 not found")
        .assert_json_field("path", "/api/users/1");
}

#[tokio::test]
async fn test_validation_and_type_errors() {
    let (client, _spy) = users_client();

    let response = client
        .post("/api/users")
        .header("x-api-key", "secret")
        .json(&json!({ "name": "  " }))
        .send()
        .await;
    response
        .assert_status(400)
        .assert_json_field("message", "Validation failed");
    let body: Value = response.json().unwrap();
    assert_eq!(body["details"][0]["field"], "name");

    client
        .get("/api/users/abc")
        .header("x-api-key", "secret")
        .send()
        .await
        .assert_status(400)
        .assert_json_field("message", "Invalid parameter type");

    client
        .post("/api/users")
        .header("x-api-key", "secret")
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .assert_status(400)
        .assert_json_field("message", "Invalid request body");
}

#[tokio::test]
async fn test_head_falls_back_to_get() {
    let (client, spy) = users_client();

    client
        .head("/api/users")
        .header("x-api-key", "secret")
        .send()
        .await
        .assert_status(200)
        .assert_empty_body();
    assert_eq!(spy.calls_to("list"), 1);
}

#[tokio::test]
async fn test_unknown_method_on_known_path() {
    let (client, _spy) = users_client();

    client
        .put("/api/users/1")
        .header("x-api-key", "secret")
        .send()
        .await
        .assert_status(404)
        .assert_json_field("method", "PUT");
}

// =============================================================================
// Configuration driven bootstrap
// =============================================================================

struct FlakyController;

impl Controller for FlakyController {
    fn declare(d: &mut ControllerDecl<'_, Self>) {
        d.controller("/flaky");
        d.get("/", "fail", |_this, _args| async {
            Err(Error::other(std::io::Error::other("connection string leaked")))
        });
    }
}

fn client_for(environment: &str) -> TestClient {
    let manager = ConfigManager::new();
    manager.set("environment", environment).unwrap();
    manager.set("port", "0").unwrap();
    let config = AppConfig::from_manager(&manager).unwrap();

    let mut app = corbel::application(&config);
    app.register_controller(FlakyController, None).unwrap();
    TestClient::new(app.into_engine())
}

#[tokio::test]
async fn test_production_masks_internal_errors() {
    let response = client_for("production")
        .get("/flaky")
        .header("x-request-id", "req-1")
        .send()
        .await;

    response
        .assert_status(500)
        .assert_json_field("message", "Internal server error")
        .assert_json_field("error", "Internal Server Error")
        .assert_json_field("requestId", "req-1");
    let body: Value = response.json().unwrap();
    assert!(body.get("stack").is_none());
}

#[tokio::test]
async fn test_development_exposes_internal_errors() {
    let response = client_for("development").get("/flaky").send().await;

    response
        .assert_status(500)
        .assert_json_field("message", "connection string leaked");
    let body: Value = response.json().unwrap();
    assert!(body["stack"].is_array());
}
