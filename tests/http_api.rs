//! HTTP API tests.
//!
//! Requests go through the full router in-process via `tower::ServiceExt`.
//! The OpenAI-compatible backend is replaced by a wiremock server where a
//! real HTTP generator is needed.

use std::sync::Arc;
use std::time::Duration;

use agentlab::archive::{MemoryStore, SessionArchive};
use agentlab::llm::{MessageGenerator, OpenAiConfig, OpenAiGenerator, ScriptedGenerator};
use agentlab::server::{create_router, AppState, ServerConfig, IDEMPOTENCY_KEY};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app_with(generator: Arc<dyn MessageGenerator>, config: ServerConfig) -> Router {
    let archive = Arc::new(SessionArchive::new(Arc::new(MemoryStore::new())).with_page_size(2));
    create_router(Arc::new(AppState::new(config, generator, archive)))
}

fn app() -> Router {
    app_with(Arc::new(ScriptedGenerator::new(7)), ServerConfig::default())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn conversation(topic: &str, names: &[&str], messages_per_agent: usize) -> Value {
    let agents: Vec<Value> = names
        .iter()
        .map(|name| json!({"name": name, "personality": "curious", "expertise": ["physics"]}))
        .collect();
    json!({
        "topic": topic,
        "messagesPerAgent": messages_per_agent,
        "agents": agents,
        "systemInfo": {"platform": "Linux", "userAgent": "test", "language": "en-US", "cores": 8}
    })
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], agentlab::VERSION);
}

#[tokio::test]
async fn test_space_scenario() {
    let app = app();
    let (status, session) = send(&app, post("/api/conversation", &conversation("Space", &["Ada", "Grace"], 1))).await;
    assert_eq!(status, StatusCode::OK);

    let messages = session["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["agentName"], "Ada");
    assert_eq!(messages[1]["agentName"], "Grace");
    assert_eq!(session["runMetadata"]["system"]["client"]["platform"], "Linux");

    let id = session["id"].as_str().unwrap();
    let (status, report) = send(&app, get(&format!("/api/conversation/{id}/analysis"))).await;
    assert_eq!(status, StatusCode::OK);
    let mut keys: Vec<&String> = report["agentBehaviorAnalysis"].as_object().unwrap().keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["Ada", "Grace"]);

    let (status, agents) = send(&app, get(&format!("/api/sessions/{id}/agents"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents.as_array().unwrap().len(), 2);

    let (status, stored) = send(&app, get(&format!("/api/sessions/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["messages"], session["messages"]);
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let app = app();
    let (status, body) = send(&app, get("/api/sessions/unknown-id")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Session not found");

    let (status, _) = send(&app, get("/api/sessions/unknown-id/agents")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/api/conversation/unknown-id/analysis")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_pages() {
    let app = app();
    for topic in ["one", "two", "three"] {
        let (status, _) = send(&app, post("/api/conversation", &conversation(topic, &["Ada", "Grace"], 1))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, first) = send(&app, get("/api/sessions")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(first["hasMore"], true);

    let cursor = first["nextCursor"].as_str().unwrap();
    let (_, second) = send(&app, get(&format!("/api/sessions?startAfter={cursor}"))).await;
    assert_eq!(second["sessions"].as_array().unwrap().len(), 1);
    assert_eq!(second["hasMore"], false);
}

#[tokio::test]
async fn test_errors_are_404_or_500_only() {
    let app = app();

    // Too few agents.
    let (status, body) = send(&app, post("/api/conversation", &conversation("Space", &["Ada"], 1))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    // Body that is not JSON at all.
    let request = Request::builder()
        .method("POST")
        .uri("/api/conversation")
        .header("content-type", "application/json")
        .body(Body::from("{oops"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());

    // Missing agent name.
    let (status, _) = send(&app, post("/api/agents", &json!({"conversationTopic": "Space"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_unrouted_requests_get_json_404() {
    let app = app();
    let delete = |uri: &str| Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap();

    let requests = vec![
        get("/api/conversation"),
        delete("/api/sessions/x"),
        post("/api/sessions", &json!({})),
        get("/api/nope"),
        get("/nowhere"),
    ];
    for request in requests {
        let uri = request.uri().to_string();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"], "Not found", "{uri}");
    }
}

#[tokio::test]
async fn test_agent_routes() {
    let app = app();

    let (status, agent) = send(
        &app,
        post(
            "/api/agents",
            &json!({
                "name": " Ada ",
                "personality": "curious",
                "expertise": "math, engines",
                "communication": "precise",
                "conversationTopic": "Space"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agent["name"], "Ada");
    assert_eq!(agent["expertise"], json!(["math", "engines"]));
    assert_eq!(agent["communicationStyle"], "precise");
    assert_eq!(agent["isRandom"], false);

    let (status, random) = send(&app, post("/api/agents/random", &json!({"topic": "Space"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(random["isRandom"], true);
    assert!(!random["name"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_idempotency_key_replays_first_result() {
    let app = app();
    let body = conversation("Space", &["Ada", "Grace"], 1);
    let request = || {
        Request::builder()
            .method("POST")
            .uri("/api/conversation")
            .header("content-type", "application/json")
            .header(IDEMPOTENCY_KEY, "run-42")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let (_, first) = send(&app, request()).await;
    let (_, second) = send(&app, request()).await;
    assert_eq!(first["id"], second["id"]);

    let (_, page) = send(&app, get("/api/sessions")).await;
    assert_eq!(page["sessions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_messages_per_agent_cap() {
    let app = app_with(
        Arc::new(ScriptedGenerator::new(1)),
        ServerConfig::default().with_max_messages_per_agent(3),
    );
    let (status, _) = send(&app, post("/api/conversation", &conversation("Space", &["Ada", "Grace"], 4))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = send(&app, post("/api/conversation", &conversation("Space", &["Ada", "Grace"], 3))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_conversation_over_openai_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Ada: Rockets are just patient fireworks."}}]
        })))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new(OpenAiConfig {
        base_url: server.uri(),
        api_key: Some("sk-test".to_string()),
        timeout: Duration::from_secs(5),
        ..OpenAiConfig::default()
    })
    .unwrap();
    let app = app_with(Arc::new(generator), ServerConfig::default());

    let (status, session) = send(&app, post("/api/conversation", &conversation("Space", &["Ada", "Grace"], 1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["messages"][0]["content"], "Rockets are just patient fireworks.");
}

#[tokio::test]
async fn test_failed_generation_hides_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream secret detail"))
        .mount(&server)
        .await;

    let generator = OpenAiGenerator::new(OpenAiConfig {
        base_url: server.uri(),
        ..OpenAiConfig::default()
    })
    .unwrap();
    let app = app_with(Arc::new(generator), ServerConfig::default());

    let (status, body) = send(&app, post("/api/conversation", &conversation("Space", &["Ada", "Grace"], 1))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to run conversation");

    let (_, page) = send(&app, get("/api/sessions")).await;
    assert!(page["sessions"].as_array().unwrap().is_empty());
}
