//! HTTP integration tests for the Hypecast API
//!
//! The warehouse is an in-memory source and the model API is a wiremock
//! server, so these run without a database or network. Handlers are hit both
//! through the inner functions and through the Axum `oneshot` path.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use hypecast_core::{
    ClientConfig, ContentBackend, HypecastConfig, InMemoryWarehouse, OpenAiContentClient,
    WarehouseSource,
};
use hypecast_server::http::{
    build_router, generate_inner, health_inner, GenerateRequest, RegenerateRequest,
};
use hypecast_server::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONFIG: &str = r#"
[warehouse]
url = "postgres://localhost/unused"
cache_ttl_seconds = 300

[warehouse.views]
base_events = "mart.base"
historical_context = "mart.hist"
trend_analysis = "mart.trend"
market_rankings = "mart.market"

[generation]
rate_limit_delay_ms = 0
result_cache_ttl_seconds = 0
"#;

fn warehouse() -> InMemoryWarehouse {
    InMemoryWarehouse::new()
        .with_view(
            "mart.base",
            vec![
                json!({
                    "EVENT_ID": "e1",
                    "EVENT_CATEGORY_NAME": "Alpha",
                    "EVENT_NAME": "Alpha Live",
                    "EVENT_PARENT_CATEGORY_NAME": "Rock",
                    "VENUE_CITY": "Madrid",
                    "VENUE_COUNTRY_NAME": "Spain",
                    "RECENT_GMS_RANK": 1,
                }),
                json!({
                    "EVENT_ID": "e2",
                    "EVENT_CATEGORY_NAME": "Beta",
                    "EVENT_NAME": "Beta Tour",
                    "EVENT_PARENT_CATEGORY_NAME": "Pop",
                    "VENUE_CITY": "Lisbon",
                    "VENUE_COUNTRY_NAME": "Portugal",
                    "RECENT_GMS_RANK": 2,
                }),
            ],
        )
        .with_view(
            "mart.hist",
            vec![json!({"EVENT_ID": "e1", "VS_CAREER_AVG_MULTIPLE": 3.2})],
        )
}

fn client(server: &MockServer) -> Arc<dyn ContentBackend> {
    let config = ClientConfig {
        api_key: "test-key".to_string(),
        model: "gpt-4o".to_string(),
        max_tokens: 600,
        temperature: 0.7,
        max_retries: 2,
        retry_delay_ms: 1,
        timeout: Duration::from_secs(5),
    };
    Arc::new(OpenAiContentClient::new(config, server.uri()).unwrap())
}

fn make_state(source: InMemoryWarehouse, server: &MockServer) -> Arc<AppState> {
    make_state_with(CONFIG, Arc::new(source), server)
}

fn make_state_with(toml: &str, source: Arc<dyn WarehouseSource>, server: &MockServer) -> Arc<AppState> {
    let config = HypecastConfig::from_toml(toml).unwrap();
    Arc::new(AppState::new(config, source, client(server)))
}

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    }))
}

async fn mount_success(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply(
            "**Visual Text:** SOLD OUT ENERGY\n**Post Caption:** You had to be there. #livemusic",
        ))
        .mount(server)
        .await;
}

async fn send(state: Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let app = build_router(state);
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("hypecast-http-{}", uuid::Uuid::new_v4()))
}

// ===========================================================================
// TEST 1: health via inner function — reports source and generator
// ===========================================================================
#[tokio::test]
async fn test_health_reports_source_and_generator() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply("OK"))
        .expect(1)
        .mount(&server)
        .await;
    let state = make_state(warehouse(), &server);

    let (status, body) = health_inner(&state).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["warehouse"], "in-memory");
    assert_eq!(body["generator"], "openai");
    assert_eq!(body["generator_status"], "ok");
    assert_eq!(body["model"], "gpt-4o");
    assert!(body["version"].is_string());
}

// ===========================================================================
// TEST 2: GET /version via oneshot
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let server = MockServer::start().await;
    let (status, body) = send(make_state(warehouse(), &server), "GET", "/version", None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["version"].is_string());
    assert_eq!(body["protocol"], "hypecast/1");
}

// ===========================================================================
// TEST 3: GET /events — structured events with angles, limit applied
// ===========================================================================
#[tokio::test]
async fn test_events_lists_structured_events() {
    let server = MockServer::start().await;
    let (status, body) =
        send(make_state(warehouse(), &server), "GET", "/events?limit=1", None).await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["count"], 1);
    assert_eq!(body["total"], 2);
    let first = &body["events"][0];
    assert_eq!(first["event"]["event_id"], "e1");
    assert_eq!(first["primary_angle"], "significant_spike");
    assert!(first["priority"].as_u64().unwrap() >= 8);
    assert_eq!(body["row_counts"]["base_events"], 2);
    assert_eq!(body["data_quality"]["total_events"], 2);
    assert_eq!(body["data_quality"]["complete_data_events"], 0);
    assert!(body["data_quality"]["data_quality_score"].as_f64().unwrap() < 1.0);
}

// ===========================================================================
// TEST 4: GET /events — base view failure surfaces as 502
// ===========================================================================
#[tokio::test]
async fn test_events_base_view_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    let source = warehouse().failing_view("mart.base");
    let (status, body) = send(make_state(source, &server), "GET", "/events", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("Warehouse unavailable"));
}

// ===========================================================================
// TEST 5: supplementary view failure still lists events, with a warning
// ===========================================================================
#[tokio::test]
async fn test_events_supplementary_failure_warns() {
    let server = MockServer::start().await;
    let source = warehouse().failing_view("mart.trend");
    let (status, body) = send(make_state(source, &server), "GET", "/events", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    let warnings = body["warnings"].as_array().unwrap();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("trend_analysis"));
}

// ===========================================================================
// TEST 6: POST /generate — one failing event does not stop the batch,
//         then /regenerate reruns only the failures
// ===========================================================================
#[tokio::test]
async fn test_generate_then_regenerate_failures() {
    let server = MockServer::start().await;

    // Beta's two requests are rejected once each, then the catch-all succeeds
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Beta"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_success(&server).await;

    let state = make_state(warehouse(), &server);

    let (status, body) = generate_inner(
        &state,
        GenerateRequest {
            event_ids: vec!["e1".to_string(), "e2".to_string()],
            platforms: vec!["tiktok".to_string(), "X".to_string()],
            ..Default::default()
        },
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 4, "every event x platform pair gets a result");
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["failed"], 2);

    assert_eq!(results[0]["event_id"], "e1");
    assert_eq!(results[0]["outcome"]["status"], "generated");
    assert_eq!(results[0]["outcome"]["visual_text"], "SOLD OUT ENERGY");
    assert_eq!(results[1]["platform"], "twitter");
    assert_eq!(results[2]["event_id"], "e2");
    assert_eq!(results[2]["outcome"]["status"], "failed");
    assert!(results[2]["outcome"]["reason"]
        .as_str()
        .unwrap()
        .contains("Invalid API key"));

    let (status, body) = send(state.clone(), "POST", "/regenerate", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["regenerated"], 2);
    assert_eq!(body["report"]["failed"], 0);
    assert_eq!(body["report"]["succeeded"], 4);

    let (status, body) = send(state, "GET", "/results", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["results"].as_array().unwrap().len(), 4);
}

// ===========================================================================
// TEST 7: POST /generate — unknown event id is 404, unknown platform is 400
// ===========================================================================
#[tokio::test]
async fn test_generate_rejects_bad_input() {
    let server = MockServer::start().await;
    let state = make_state(warehouse(), &server);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/generate",
        Some(json!({ "event_ids": ["nope"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Unknown event id: nope");

    let (status, _) = send(
        state.clone(),
        "POST",
        "/generate",
        Some(json!({ "event_ids": ["e1"], "platforms": ["myspace"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        state,
        "POST",
        "/generate",
        Some(json!({
            "event_ids": ["e1"],
            "templates": { "significant_spike": "Hype {artist} at {stadium}" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("stadium"));
}

// ===========================================================================
// TEST 8: custom template and pinned angle flow into the request
// ===========================================================================
#[tokio::test]
async fn test_generate_uses_pinned_angle_and_template() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Tour hype for Alpha"))
        .respond_with(chat_reply("Visual Text: ON TOUR\nCaption: See you there"))
        .expect(1)
        .mount(&server)
        .await;

    let state = make_state(warehouse(), &server);
    let (status, body) = send(
        state,
        "POST",
        "/generate",
        Some(json!({
            "event_ids": ["e1"],
            "platforms": ["instagram"],
            "angles": { "e1": "tour_standout" },
            "templates": { "tour_standout": "Tour hype for {artist}" }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["succeeded"], 1);
    assert_eq!(body["results"][0]["angle"], "tour_standout");
    assert_eq!(body["results"][0]["outcome"]["caption"], "See you there");
}

// ===========================================================================
// TEST 9: export, schedule and webhook need results; then produce them
// ===========================================================================
#[tokio::test]
async fn test_export_schedule_webhook() {
    let server = MockServer::start().await;
    mount_success(&server).await;
    let state = make_state(warehouse(), &server);
    let dir = temp_dir();

    let (status, _) = send(
        state.clone(),
        "POST",
        "/export",
        Some(json!({ "output_dir": dir.to_string_lossy() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "nothing generated yet");

    let (status, _) = send(
        state.clone(),
        "POST",
        "/generate",
        Some(json!({ "event_ids": ["e1", "e2"], "platforms": ["tiktok"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/export",
        Some(json!({ "output_dir": dir.to_string_lossy() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["items"], 2);
    let json_file = body["json_file"].as_str().unwrap();
    let exported: Value =
        serde_json::from_str(&std::fs::read_to_string(json_file).unwrap()).unwrap();
    assert_eq!(exported["metadata"]["total_items"], 2);
    assert!(std::path::Path::new(body["text_file"].as_str().unwrap()).exists());
    let csv = std::fs::read_to_string(body["csv_file"].as_str().unwrap()).unwrap();
    assert_eq!(csv.lines().count(), 3, "header plus one row per post");

    let (status, _) = send(
        state.clone(),
        "POST",
        "/schedule",
        Some(json!({ "posts_per_day": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/schedule",
        Some(json!({ "posts_per_day": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_posts"], 2);
    assert_eq!(body["total_days"], 2);

    let (status, body) = send(state.clone(), "POST", "/webhook", Some(json!({ "max_items": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["webhook_data"]["content_count"], 1);
    assert_eq!(body["webhook_data"]["posts"][0]["artist_name"], "Alpha");

    let (status, _) = send(state.clone(), "POST", "/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(state, "GET", "/results", None).await;
    assert!(body["report"].is_null());

    std::fs::remove_dir_all(&dir).ok();
}

// ===========================================================================
// TEST 10: cache clear forces the next listing back to the warehouse
// ===========================================================================
#[tokio::test]
async fn test_cache_clear_refetches() {
    let server = MockServer::start().await;
    let source = Arc::new(warehouse());
    let config = HypecastConfig::from_toml(CONFIG).unwrap();
    let state = Arc::new(AppState::new(config, source.clone(), client(&server)));

    send(state.clone(), "GET", "/events", None).await;
    send(state.clone(), "GET", "/events", None).await;
    assert_eq!(source.fetch_count(), 4, "second listing served from cache");

    let (status, body) = send(state.clone(), "POST", "/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);

    send(state, "GET", "/events", None).await;
    assert_eq!(source.fetch_count(), 8);
}

// ===========================================================================
// TEST 11: one-shot batch writes both export files
// ===========================================================================
#[tokio::test]
async fn test_run_once_exports() {
    let server = MockServer::start().await;
    mount_success(&server).await;
    let state = make_state(warehouse(), &server);
    let dir = temp_dir();

    let (report, paths) = hypecast_server::batch::run_once(&state, 1, &[], &dir)
        .await
        .unwrap();

    assert_eq!(report.results.len(), 1, "max_events caps the selection");
    assert_eq!(report.succeeded, 1);
    assert!(paths.json.exists());
    assert!(paths.text.exists());
    assert!(paths.csv.exists());

    std::fs::remove_dir_all(&dir).ok();
}

// ===========================================================================
// TEST 12: repeated event ids generate one result per platform
// ===========================================================================
#[tokio::test]
async fn test_generate_ignores_repeated_event_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply("Visual Text: ONE\nCaption: Once"))
        .expect(2)
        .mount(&server)
        .await;
    let state = make_state(warehouse(), &server);

    let (status, body) = send(
        state,
        "POST",
        "/generate",
        Some(json!({
            "event_ids": ["e1", "e1", "e2", "e1"],
            "platforms": ["tiktok", "tiktok"]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["event_id"], "e1");
    assert_eq!(results[1]["event_id"], "e2");
}

// ===========================================================================
// TEST 13: generate reads events through the view cache, so they expire
// ===========================================================================
#[tokio::test]
async fn test_generate_reloads_events_after_view_ttl() {
    let server = MockServer::start().await;
    mount_success(&server).await;
    let source = Arc::new(warehouse());
    let toml = CONFIG.replace("cache_ttl_seconds = 300", "cache_ttl_seconds = 1");
    let state = make_state_with(&toml, source.clone(), &server);
    let body = json!({ "event_ids": ["e1"], "platforms": ["tiktok"] });

    send(state.clone(), "GET", "/events", None).await;
    assert_eq!(source.fetch_count(), 4);

    let (status, _) = send(state.clone(), "POST", "/generate", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.fetch_count(), 4, "fresh views are reused");

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let (status, _) = send(state, "POST", "/generate", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.fetch_count(), 8, "expired views are fetched again");
}

// ===========================================================================
// TEST 14: /cache/clear and /reset also drop cached posts
// ===========================================================================
#[tokio::test]
async fn test_cache_clear_and_reset_drop_cached_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(chat_reply("Visual Text: FRESH\nCaption: New take"))
        .expect(3)
        .mount(&server)
        .await;
    let toml = CONFIG.replace("result_cache_ttl_seconds = 0", "result_cache_ttl_seconds = 600");
    let state = make_state_with(&toml, Arc::new(warehouse()), &server);
    let body = json!({ "event_ids": ["e1"], "platforms": ["tiktok"] });

    let (_, first) = send(state.clone(), "POST", "/generate", Some(body.clone())).await;
    assert_eq!(first["cached"], 0);
    let (_, second) = send(state.clone(), "POST", "/generate", Some(body.clone())).await;
    assert_eq!(second["cached"], 1);

    send(state.clone(), "POST", "/cache/clear", None).await;
    let (_, third) = send(state.clone(), "POST", "/generate", Some(body.clone())).await;
    assert_eq!(third["cached"], 0, "clearing caches forces a new post");

    send(state.clone(), "POST", "/reset", None).await;
    let (_, fourth) = send(state, "POST", "/generate", Some(body)).await;
    assert_eq!(fourth["cached"], 0, "reset forces a new post too");
    assert_eq!(fourth["succeeded"], 1);
}

// ===========================================================================
// TEST 15: /regenerate rewrites a successful pair from a new angle
// ===========================================================================
#[tokio::test]
async fn test_regenerate_success_with_new_angle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Tour hype for Alpha"))
        .respond_with(chat_reply("Visual Text: TOUR MODE\nCaption: Road trip"))
        .expect(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_success(&server).await;
    let state = make_state(warehouse(), &server);

    let (status, body) = send(
        state.clone(),
        "POST",
        "/generate",
        Some(json!({
            "event_ids": ["e1", "e2"],
            "platforms": ["tiktok"],
            "templates": { "tour_standout": "Tour hype for {artist}" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["results"][0]["angle"], "significant_spike");

    let (status, body) = send(
        state,
        "POST",
        "/regenerate",
        Some(json!({
            "targets": [{ "event_id": "e1", "platform": "tiktok", "angle": "tour_standout" }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "unexpected body: {:?}", body);
    assert_eq!(body["regenerated"], 1);
    let results = body["report"]["results"].as_array().unwrap();
    assert_eq!(results[0]["angle"], "tour_standout");
    assert_eq!(results[0]["outcome"]["visual_text"], "TOUR MODE");
    assert_eq!(results[1]["event_id"], "e2");
    assert_eq!(results[1]["outcome"]["visual_text"], "SOLD OUT ENERGY");
}

// ===========================================================================
// TEST 16: a rejected model key degrades health without failing it
// ===========================================================================
#[tokio::test]
async fn test_health_degraded_when_generator_rejects_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = send(make_state(warehouse(), &server), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert!(body["generator_status"]
        .as_str()
        .unwrap()
        .starts_with("Invalid API key"));
}
