use std::{fmt, fs::File, sync::Arc};

use anyhow::Context;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Method, Request, StatusCode,
    },
    Router,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use chrono::{DateTime, Duration, TimeZone, Utc};
use cucumber::{given, then, when, World as _};
use serde_json::{json, Value};
use session_todo::{
    auth::{self, SESSION_COOKIE},
    clock::{Clock, ManualClock},
    config::AppConfig,
    db::{init_pool, migrate, DbPool},
    error::AppError,
    models::{session::IS_AUTHENTICATED_KEY, user::UserSnapshot},
    routes::create_router,
    services::reaper::Reaper,
    state::AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    user: Option<UserSnapshot>,
    cookie: Option<String>,
    remembered_cookie: Option<String>,
    issued_cookie: bool,
    cleared_cookie: bool,
    status: Option<StatusCode>,
    statuses: Vec<StatusCode>,
    body: Value,
    todo_id: Option<String>,
}

struct TestState {
    app: AppState,
    router: Router,
    db: DbPool,
    clock: Arc<ManualClock>,
    start: DateTime<Utc>,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;

        let config = AppConfig {
            database_url: format!("sqlite://{}", db_path.to_string_lossy()),
            cookie_secret: "bdd-cookie-secret".into(),
            ..AppConfig::default()
        };

        let db = init_pool(&config.database_url).await?;
        migrate(&db).await?;

        let start = Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
            .single()
            .context("valid start time")?;
        let clock = Arc::new(ManualClock::new(start));
        let app = AppState::with_clock(config, db.clone(), clock.clone());
        let router = create_router(app.clone());

        Ok(Self {
            app,
            router,
            db,
            clock,
            start,
            _root: root,
        })
    }
}

impl AppWorld {
    fn test_state(&self) -> &TestState {
        self.state.as_ref().expect("state must be initialised first")
    }

    fn app_state(&self) -> &AppState {
        &self.test_state().app
    }

    async fn send(&mut self, method: Method, path: &str, body: Option<Value>) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("valid request");

        let response = self
            .test_state()
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        self.issued_cookie = false;
        self.cleared_cookie = false;
        for value in response.headers().get_all(SET_COOKIE) {
            let raw = value.to_str().expect("ascii set-cookie");
            let pair = raw.split(';').next().unwrap_or_default().trim();
            let Some(token) = pair.strip_prefix(&format!("{SESSION_COOKIE}=")) else {
                continue;
            };
            if token.is_empty() {
                self.cleared_cookie = true;
                self.cookie = None;
            } else {
                self.issued_cookie = true;
                self.cookie = Some(pair.to_string());
            }
        }

        let status = response.status();
        self.status = Some(status);
        self.statuses.push(status);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        self.body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    }

    fn session_id_of(&self, cookie: &str) -> String {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).expect("cookie header"));
        PrivateCookieJar::from_headers(&headers, self.app_state().cookie_key.clone())
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .expect("cookie decrypts to a session id")
    }

    fn current_session_id(&self) -> String {
        let cookie = self.cookie.as_deref().expect("a session cookie is held");
        self.session_id_of(cookie)
    }

    fn remembered_session_id(&self) -> String {
        let cookie = self
            .remembered_cookie
            .as_deref()
            .expect("a cookie was remembered");
        self.session_id_of(cookie)
    }

    fn user(&self) -> &UserSnapshot {
        self.user.as_ref().expect("a user must be registered first")
    }
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    *world = AppWorld::default();
    world.state = Some(TestState::new().await.expect("state"));
}

#[given(
    regex = r#"^a registered user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn given_registered_user(world: &mut AppWorld, name: String, email: String, password: String) {
    let user = auth::register_user(world.app_state(), &name, &email, &password)
        .await
        .expect("register user");
    world.user = Some(UserSnapshot::from(&user));
}

#[given(regex = r#"^I am logged in as \"([^\"]+)\" with password \"([^\"]+)\"$"#)]
async fn given_logged_in(world: &mut AppWorld, email: String, password: String) {
    log_in(world, email, password).await;
    assert_eq!(world.status, Some(StatusCode::OK), "login failed: {}", world.body);
}

#[when(regex = r#"^I log in as \"([^\"]+)\" with password \"([^\"]+)\"$"#)]
async fn when_log_in(world: &mut AppWorld, email: String, password: String) {
    log_in(world, email, password).await;
}

#[when(regex = r#"^I send (GET|POST|DELETE) \"([^\"]+)\"$"#)]
async fn when_send(world: &mut AppWorld, method: String, path: String) {
    let method = Method::from_bytes(method.as_bytes()).expect("http method");
    world.send(method, &path, None).await;
}

#[when(regex = r#"^I send (GET|POST|DELETE) \"([^\"]+)\" (\d+) times$"#)]
async fn when_send_repeatedly(world: &mut AppWorld, method: String, path: String, times: usize) {
    let method = Method::from_bytes(method.as_bytes()).expect("http method");
    world.statuses.clear();
    for _ in 0..times {
        world.send(method.clone(), &path, None).await;
    }
}

#[when(regex = r"^(\d+) (seconds|days) pass$")]
async fn when_time_passes(world: &mut AppWorld, amount: i64, unit: String) {
    let step = match unit.as_str() {
        "seconds" => Duration::seconds(amount),
        _ => Duration::days(amount),
    };
    world.test_state().clock.advance(step);
}

#[when("I remember my session cookie")]
async fn remember_cookie(world: &mut AppWorld) {
    world.remembered_cookie = world.cookie.clone();
    assert!(world.remembered_cookie.is_some(), "no cookie to remember");
}

#[when("I present the remembered cookie")]
async fn present_remembered_cookie(world: &mut AppWorld) {
    world.cookie = world.remembered_cookie.clone();
}

#[when("my session holds a user snapshot but isAuthenticated is false")]
async fn tamper_session(world: &mut AppWorld) {
    let id = world.current_session_id();
    let user = world.user().clone();
    let sessions = &world.app_state().sessions;
    let mut record = sessions
        .load(&id)
        .await
        .expect("load session")
        .expect("session exists");
    record.data.log_in(&user).expect("log in");
    record.data.insert(IS_AUTHENTICATED_KEY, json!(false));
    record.data.insert("theme", json!("dark"));
    sessions.save(&mut record).await.expect("save session");
}

#[when("the session store becomes unavailable")]
async fn when_store_unavailable(world: &mut AppWorld) {
    world.test_state().db.close().await;
}

#[when("rate-limit state can no longer be written")]
async fn when_access_table_missing(world: &mut AppWorld) {
    sqlx::query("DROP TABLE access")
        .execute(&world.test_state().db)
        .await
        .expect("drop access table");
}

#[when(regex = r#"^I create a todo \"([^\"]+)\"$"#)]
async fn when_create_todo(world: &mut AppWorld, text: String) {
    world
        .send(Method::POST, "/todo", Some(json!({ "todo": text })))
        .await;
    world.todo_id = world.body["todo"]["id"].as_str().map(str::to_string);
}

#[when("I delete that todo")]
async fn when_delete_todo(world: &mut AppWorld) {
    let id = world.todo_id.clone().expect("a todo was created");
    world.send(Method::DELETE, &format!("/todo/{id}"), None).await;
}

#[when("I restore that todo")]
async fn when_restore_todo(world: &mut AppWorld) {
    let id = world.todo_id.clone().expect("a todo was created");
    world
        .send(Method::POST, &format!("/todo/{id}/restore"), None)
        .await;
}

#[when("I fetch that todo")]
async fn when_fetch_todo(world: &mut AppWorld) {
    let id = world.todo_id.clone().expect("a todo was created");
    world.send(Method::GET, &format!("/todo/{id}"), None).await;
}

#[when("the reaper runs")]
async fn when_reaper_runs(world: &mut AppWorld) {
    let state = world.test_state();
    Reaper::from_state(&state.app)
        .sweep(state.clock.now())
        .await
        .expect("sweep");
}

#[then(regex = r"^the response status is (\d+)$")]
async fn then_status(world: &mut AppWorld, expected: u16) {
    assert_eq!(
        world.status.map(|status| status.as_u16()),
        Some(expected),
        "body: {}",
        world.body
    );
}

#[then(regex = r"^every response status was (\d+)$")]
async fn then_every_status(world: &mut AppWorld, expected: u16) {
    assert!(!world.statuses.is_empty());
    for status in &world.statuses {
        assert_eq!(status.as_u16(), expected);
    }
}

#[then(regex = r#"^the response says \"([^\"]+)\"$"#)]
async fn then_message(world: &mut AppWorld, message: String) {
    assert_eq!(world.body["message"], json!(message));
    assert_eq!(world.body["success"], json!(world.status.is_some_and(|s| s.is_success())));
}

#[then("the response carries no storage details")]
async fn then_no_storage_details(world: &mut AppWorld) {
    let body = world.body.as_object().expect("json envelope");
    let mut keys: Vec<&str> = body.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, ["message", "success"]);

    let text = world.body.to_string().to_lowercase();
    for leak in ["sqlx", "sqlite", "pool", "closed", "database"] {
        assert!(!text.contains(leak), "response leaks {leak:?}: {text}");
    }
}

#[then(regex = r"^the response lists (\d+) todos?$")]
async fn then_lists_todos(world: &mut AppWorld, expected: usize) {
    let todos = world.body["todos"].as_array().expect("todo list payload");
    assert_eq!(todos.len(), expected);
}

#[then("a session cookie was issued")]
async fn then_cookie_issued(world: &mut AppWorld) {
    assert!(world.issued_cookie);
}

#[then("no session cookie was issued")]
async fn then_no_cookie_issued(world: &mut AppWorld) {
    assert!(!world.issued_cookie);
}

#[then("the session cookie was cleared")]
async fn then_cookie_cleared(world: &mut AppWorld) {
    assert!(world.cleared_cookie);
}

#[then("my session exists in the store")]
async fn then_session_exists(world: &mut AppWorld) {
    let id = world.current_session_id();
    let record = world.app_state().sessions.load(&id).await.expect("load");
    assert!(record.is_some());
}

#[then("my session is authenticated")]
async fn then_session_authenticated(world: &mut AppWorld) {
    let id = world.current_session_id();
    let record = world
        .app_state()
        .sessions
        .load(&id)
        .await
        .expect("load")
        .expect("session exists");
    assert!(record.data.is_authenticated());
    assert_eq!(record.data.user().as_ref(), Some(world.user()));
}

#[then("the remembered session no longer exists")]
async fn then_remembered_session_gone(world: &mut AppWorld) {
    let id = world.remembered_session_id();
    let record = world.app_state().sessions.load(&id).await.expect("load");
    assert!(record.is_none());
}

#[then("the remembered session has no access record")]
async fn then_remembered_access_gone(world: &mut AppWorld) {
    let id = world.remembered_session_id();
    let record = world.app_state().limiter.record(&id).await.expect("load");
    assert!(record.is_none());
}

#[then("my session id differs from the remembered one")]
async fn then_session_id_differs(world: &mut AppWorld) {
    assert_ne!(world.current_session_id(), world.remembered_session_id());
}

#[then(regex = r"^my access record is stamped at (\d+) seconds$")]
async fn then_access_stamped(world: &mut AppWorld, offset: i64) {
    let id = world.current_session_id();
    let record = world
        .app_state()
        .limiter
        .record(&id)
        .await
        .expect("load")
        .expect("access record exists");
    assert_eq!(
        record.last_permitted_at,
        world.test_state().start + Duration::seconds(offset)
    );
}

#[then("every protected route answers 401")]
async fn then_protected_routes_reject(world: &mut AppWorld) {
    let routes = [
        (Method::GET, "/dashboard"),
        (Method::GET, "/logout"),
        (Method::GET, "/todo"),
        (Method::POST, "/todo"),
        (Method::GET, "/todo/some-id"),
        (Method::DELETE, "/todo/some-id"),
        (Method::POST, "/todo/some-id/restore"),
    ];
    for (method, path) in routes {
        world.send(method.clone(), path, None).await;
        assert_eq!(
            world.status,
            Some(StatusCode::UNAUTHORIZED),
            "{method} {path}"
        );
    }
}

#[then("that todo is flagged as deleted")]
async fn then_todo_flagged(world: &mut AppWorld) {
    assert_eq!(world.body["todo"]["isDeleted"], json!(true));
    assert!(world.body["todo"]["deletionTimestamp"].is_string());
}

#[then("that todo still exists in the store")]
async fn then_todo_exists(world: &mut AppWorld) {
    let id = world.todo_id.clone().expect("a todo was created");
    world
        .app_state()
        .todos
        .get(world.user().id, &id)
        .await
        .expect("todo still stored");
}

#[then("that todo is gone from the store")]
async fn then_todo_gone(world: &mut AppWorld) {
    let id = world.todo_id.clone().expect("a todo was created");
    let result = world.app_state().todos.get(world.user().id, &id).await;
    assert!(matches!(result, Err(AppError::NotFound)));
}

async fn log_in(world: &mut AppWorld, email: String, password: String) {
    world
        .send(
            Method::POST,
            "/login",
            Some(json!({ "email": email, "password": password })),
        )
        .await;
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
