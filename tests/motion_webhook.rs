use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use motion_relay::http_server::{DISCORD_ROUTE, DUMP_ROUTE, MOTION_ROUTE};
use motion_relay::{router, AppState, Config};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TRIGGER_PATH: &str = "/trigger/demo_move_home";

fn load_config(vars: &[(&str, String)], base_dir: &Path) -> Config {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Config::from_lookup(&|k: &str| map.get(k).cloned(), base_dir).expect("valid config")
}

/// Router wired to a mock farmbot. The origin check is off unless a test
/// sets `UNIFI_PROTECT_HOST`.
fn app_with(server: &MockServer, extra: &[(&str, &str)]) -> Router {
    let dir = tempfile::tempdir().unwrap();
    app_in_dir(server, extra, dir.path())
}

fn app_in_dir(server: &MockServer, extra: &[(&str, &str)], dir: &Path) -> Router {
    let mut vars = vec![
        ("UNIFI_MOTION_CAMERA_NAME", "G4 Pro".to_string()),
        ("UNIFI_MOTION_COOLDOWN_SECONDS", "1200".to_string()),
        (
            "UNIFI_MOTION_TRIGGER_URL",
            format!("{}{TRIGGER_PATH}?x=600&y=400&z=0", server.uri()),
        ),
        ("UNIFI_PROTECT_HOST", String::new()),
    ];
    for (k, v) in extra {
        vars.retain(|(existing, _)| existing != k);
        vars.push((*k, v.to_string()));
    }
    router(AppState::from_config(&load_config(&vars, dir)))
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    post_from(uri, body, [10, 0, 0, 2], &[])
}

fn post_from(uri: &str, body: Value, peer: [u8; 4], headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .extension(ConnectInfo(SocketAddr::from((peer, 40000))));
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn g4_motion() -> Value {
    json!({"camera_name": "G4 Pro", "motion": true})
}

async fn farmbot_ok(server: &MockServer, verb: &str, expected_calls: u64) {
    Mock::given(method(verb))
        .and(path(TRIGGER_PATH))
        .and(query_param("x", "600"))
        .respond_with(ResponseTemplate::new(200))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn motion_triggers_demo_url() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[]);

    let (status, body) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["camera"], "G4 Pro");
    assert!(body["trigger_url"]
        .as_str()
        .unwrap()
        .ends_with("demo_move_home?x=600&y=400&z=0"));
}

#[tokio::test]
async fn motion_respects_cooldown() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[]);

    let (first, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    let (second, body) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "ignored");
    assert_eq!(body["reason"], "cooldown");
    let remaining = body["remaining_seconds"].as_u64().unwrap();
    assert!((1190..=1200).contains(&remaining), "remaining {remaining}");
}

#[tokio::test]
async fn motion_ignores_other_camera() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[]);

    let (status, body) = send(
        &app,
        post_json(MOTION_ROUTE, json!({"camera_name": "Front Door", "motion": true})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["reason"], "camera_mismatch");

    // gate untouched: the matching camera still fires
    let (status, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn motion_ignores_non_motion_events() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 0).await;
    let app = app_with(&server, &[]);

    let (status, body) = send(
        &app,
        post_json(MOTION_ROUTE, json!({"event": {"cameraName": "G4 Pro", "isMotionDetected": "false"}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["reason"], "no_motion");
}

#[tokio::test]
async fn motion_flag_can_be_disabled() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(
        &server,
        &[("UNIFI_MOTION_REQUIRE_MOTION", "false"), ("UNIFI_MOTION_REQUIRE_CAMERA", "false")],
    );

    let (status, _) = send(
        &app,
        post_json(MOTION_ROUTE, json!({"camera_name": "Front Door", "motion": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unparseable_body_is_treated_as_empty() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 0).await;
    let app = app_with(&server, &[]);

    let request = Request::builder()
        .method("POST")
        .uri(MOTION_ROUTE)
        .body(Body::from("not json"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["reason"], "camera_mismatch");
}

#[tokio::test]
async fn failed_trigger_does_not_start_cooldown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRIGGER_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;
    let app = app_with(&server, &[]);

    let (first, body) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    let (second, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;

    assert_eq!(first, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "error");
    assert_eq!(second, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unreachable_trigger_is_bad_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let vars = vec![
        ("UNIFI_MOTION_TRIGGER_URL", "http://127.0.0.1:1/trigger".to_string()),
        ("UNIFI_MOTION_TRIGGER_TIMEOUT", "2".to_string()),
        ("UNIFI_PROTECT_HOST", String::new()),
    ];
    let app = router(AppState::from_config(&load_config(&vars, dir.path())));

    let (status, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn uses_post_when_configured() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "POST", 1).await;
    let app = app_with(&server, &[("UNIFI_MOTION_TRIGGER_METHOD", "POST")]);

    let (status, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn requires_api_key_when_configured() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[("UNIFI_PROTECT_API_KEY", "super-secret")]);

    let (status, body) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Unauthorized");

    let (status, _) = send(
        &app,
        post_from(MOTION_ROUTE, g4_motion(), [10, 0, 0, 2], &[("x-api-key", "super-secret")]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn accepts_bearer_token() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[("UNIFI_PROTECT_API_KEY", "super-secret")]);

    let (status, _) = send(
        &app,
        post_from(
            MOTION_ROUTE,
            g4_motion(),
            [10, 0, 0, 2],
            &[("authorization", "Bearer super-secret")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn accepts_repo_local_key_file() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("secrets")).unwrap();
    std::fs::write(dir.path().join("secrets/unifi_key"), "local-secret\n").unwrap();
    let app = app_in_dir(&server, &[], dir.path());

    let (unauthorized, _) = send(&app, post_json(MOTION_ROUTE, g4_motion())).await;
    let (authorized, _) = send(
        &app,
        post_from(MOTION_ROUTE, g4_motion(), [10, 0, 0, 2], &[("x-api-key", "local-secret")]),
    )
    .await;

    assert_eq!(unauthorized, StatusCode::UNAUTHORIZED);
    assert_eq!(authorized, StatusCode::OK);
}

#[tokio::test]
async fn rejects_unexpected_source_host() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 0).await;
    let app = app_with(&server, &[("UNIFI_PROTECT_HOST", "192.168.1.59")]);

    let (status, body) = send(
        &app,
        post_from(MOTION_ROUTE, g4_motion(), [192, 168, 1, 42], &[]),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Forbidden source");
}

#[tokio::test]
async fn accepts_expected_forwarded_host() {
    let server = MockServer::start().await;
    farmbot_ok(&server, "GET", 1).await;
    let app = app_with(&server, &[("UNIFI_PROTECT_HOST", "192.168.1.59")]);

    let (status, _) = send(
        &app,
        post_from(
            MOTION_ROUTE,
            g4_motion(),
            [172, 20, 0, 4],
            &[("x-forwarded-for", "192.168.1.59")],
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_fire_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(TRIGGER_PATH))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;
    let app = app_with(&server, &[]);

    let (a, b) = tokio::join!(
        send(&app, post_json(MOTION_ROUTE, g4_motion())),
        send(&app, post_json(MOTION_ROUTE, g4_motion())),
    );

    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::ACCEPTED]);

    let ignored = if a.0 == StatusCode::ACCEPTED { a.1 } else { b.1 };
    assert_eq!(ignored["status"], "ignored");
    assert_eq!(ignored["reason"], "in_flight");
    assert!(ignored.get("remaining_seconds").is_none());
}

#[tokio::test]
async fn health_is_ok() {
    let server = MockServer::start().await;
    let app = app_with(&server, &[]);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn discord_relay_requires_webhook() {
    let server = MockServer::start().await;
    let app = app_with(&server, &[]);
    let (status, body) = send(&app, post_json(DISCORD_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Discord webhook not configured");
}

#[tokio::test]
async fn discord_relay_posts_alarm_summary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .and(body_json(json!({
            "content": "UniFi Protect: Porch Alarm \u{2014} motion detected (person): detected\nhttp://nvr/e/1"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    let discord_url = format!("{}/discord", server.uri());
    let app = app_with(&server, &[("DISCORD_UNIFI_WEBHOOK_URL", discord_url.as_str())]);

    let payload = json!({
        "alarm": {
            "name": "Porch Alarm",
            "triggers": [{"key": "person", "value": "detected"}],
            "eventLocalLink": "http://nvr/e/1"
        }
    });
    let (status, body) = send(&app, post_json(DISCORD_ROUTE, payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "camera": "Porch Alarm", "event": "person"}));
}

#[tokio::test]
async fn discord_relay_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let discord_url = format!("{}/discord", server.uri());
    let app = app_with(&server, &[("DISCORD_UNIFI_WEBHOOK_URL", discord_url.as_str())]);

    let (status, _) = send(&app, post_json(DISCORD_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn discord_relay_shares_access_guard() {
    let server = MockServer::start().await;
    let discord_url = format!("{}/discord", server.uri());
    let app = app_with(
        &server,
        &[
            ("DISCORD_UNIFI_WEBHOOK_URL", discord_url.as_str()),
            ("UNIFI_PROTECT_API_KEY", "super-secret"),
        ],
    );
    let (status, _) = send(&app, post_json(DISCORD_ROUTE, g4_motion())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn dump_reports_sorted_keys() {
    let server = MockServer::start().await;
    let app = app_with(&server, &[]);
    let (status, body) = send(
        &app,
        post_from(DUMP_ROUTE, json!({"zeta": 1, "alarm": {}, "camera": "x"}), [192, 168, 1, 59], &[]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remote_addr"], "192.168.1.59");
    assert_eq!(body["payload_keys"], json!(["alarm", "camera", "zeta"]));
    let received_at = body["received_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(received_at).is_ok());
}
