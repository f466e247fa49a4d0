//! End-to-end tests for the application server.
//!
//! These tests bind real sockets:
//! - A wiremock server stands in for llama-server
//! - The dispatcher listens on a free local port
//! - Requests go over HTTP with reqwest

use llama_app_server::{
    api::DispatcherState,
    core::{BackendConfig, ServerSettings},
    AssistantHandler, BackendClient, DispatchError, RequestDispatcher,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn local_settings() -> ServerSettings {
    ServerSettings {
        host: "127.0.0.1".to_string(),
        request_timeout_secs: 10,
    }
}

struct RunningServer {
    dispatcher: Arc<RequestDispatcher>,
    task: JoinHandle<Result<(), DispatchError>>,
    base_url: String,
}

/// Start the assistant handler against `backend` and wait until `/health` answers.
async fn spawn_server(backend: &MockServer) -> RunningServer {
    let port = free_port();
    let config = BackendConfig::new(
        "/usr/local/bin",
        "/models/m.gguf",
        i64::from(backend.address().port()),
        i64::from(port),
    );
    let dispatcher = Arc::new(
        RequestDispatcher::with_settings(config, local_settings(), AssistantHandler::new())
            .unwrap(),
    );

    let runner = dispatcher.clone();
    let task = tokio::spawn(async move { runner.start().await });
    let base_url = format!("http://127.0.0.1:{port}");

    let client = reqwest::Client::new();
    for _ in 0..50 {
        if client
            .get(format!("{base_url}/health"))
            .send()
            .await
            .is_ok()
        {
            return RunningServer {
                dispatcher,
                task,
                base_url,
            };
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("dispatcher did not come up on port {port}");
}

#[tokio::test]
async fn test_health_and_echo_over_http() {
    let backend = MockServer::start().await;
    let server = spawn_server(&backend).await;
    let client = reqwest::Client::new();

    assert_eq!(server.dispatcher.state(), DispatcherState::Listening);

    let health: Value = client
        .get(format!("{}/health", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"status": "ok", "service": "app-server"}));

    let payload = json!({"action": "echo", "message": "hi"});
    let response = client
        .post(format!("{}/api", server.base_url))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), payload);

    server.dispatcher.stop();
    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .expect("start() should return after stop()")
        .unwrap()
        .unwrap();
    assert_eq!(server.dispatcher.state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn test_completion_through_backend() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Paris",
            "stop": true
        })))
        .expect(1)
        .mount(&backend)
        .await;

    let server = spawn_server(&backend).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api", server.base_url))
        .json(&json!({"action": "complete", "prompt": "Capital of France?"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"action": "complete", "result": "Paris"})
    );

    server.dispatcher.stop();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_chat_backend_down_is_500() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&backend)
        .await;

    let server = spawn_server(&backend).await;
    let response = reqwest::Client::new()
        .post(format!("{}/api", server.base_url))
        .json(&json!({"action": "chat", "message": "Hello"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "failed");
    assert!(body["error"].as_str().unwrap().contains("status: 503"));

    server.dispatcher.stop();
    server.task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_start_twice_is_invalid_state() {
    let backend = MockServer::start().await;
    let server = spawn_server(&backend).await;

    let err = server.dispatcher.start().await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidState("listening")));

    server.dispatcher.stop();
    server.task.await.unwrap().unwrap();

    let err = server.dispatcher.start().await.unwrap_err();
    assert!(matches!(err, DispatchError::InvalidState("stopped")));
}

#[tokio::test]
async fn test_bind_failure_names_port() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = occupied.local_addr().unwrap().port();

    let config = BackendConfig::new("/usr/local/bin", "/models/m.gguf", 8080, i64::from(port));
    let dispatcher =
        RequestDispatcher::with_settings(config, local_settings(), AssistantHandler::new())
            .unwrap();

    let err = dispatcher.start().await.unwrap_err();
    assert!(matches!(err, DispatchError::Bind { .. }), "got {err:?}");
    assert!(err
        .to_string()
        .starts_with(&format!("Failed to start server on port {port}")));
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn test_stop_lets_in_flight_request_finish() {
    let port = free_port();
    let config = BackendConfig::new("/usr/local/bin", "/models/m.gguf", 8080, i64::from(port));

    let entered = Arc::new(Notify::new());
    let handler_entered = entered.clone();
    let dispatcher = Arc::new(
        RequestDispatcher::with_settings(
            config,
            local_settings(),
            move |request: Value, _backend: Arc<BackendClient>| {
                let entered = handler_entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    anyhow::Ok(request)
                }
            },
        )
        .unwrap(),
    );

    let runner = dispatcher.clone();
    let server = tokio::spawn(async move { runner.start().await });
    let base_url = format!("http://127.0.0.1:{port}");

    let mut up = false;
    for _ in 0..50 {
        if reqwest::get(format!("{base_url}/health")).await.is_ok() {
            up = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(up, "dispatcher did not come up on port {port}");

    let in_flight = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("{base_url}/api"))
            .json(&json!({"slow": true}))
            .send()
            .await
    });

    entered.notified().await;
    dispatcher.stop();

    let response = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("in-flight request should complete")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"slow": true}));

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("start() should return once in-flight work drains")
        .unwrap()
        .unwrap();
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);

    let refused = tokio::net::TcpStream::connect(("127.0.0.1", port)).await;
    assert!(refused.is_err(), "listener still accepting after shutdown");
}
