//! ---
//! pc_section: "06-testing"
//! pc_subsection: "integration-tests"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "End-to-end HTTP tests against a supervised control surface."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use powerctl_core::testing::RecordingExecutor;
use powerctl_core::{PlatformSupport, PowerController};
use powerctl_lifecycle::{
    LifecycleState, ShutdownOutcome, Supervisor, SupervisorHandle, SupervisorSettings,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

async fn start(
    executor: Arc<RecordingExecutor>,
    platform: PlatformSupport,
    grace_period: Duration,
) -> SupervisorHandle {
    let controller = PowerController::new(executor, platform);
    let settings = SupervisorSettings::new("127.0.0.1:0".parse().unwrap(), grace_period);
    Supervisor::new(settings)
        .spawn(powerctl_api::router(controller))
        .await
        .unwrap()
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

async fn stop(handle: SupervisorHandle) -> ShutdownOutcome {
    let cancel = CancellationToken::new();
    cancel.cancel();
    handle.run_until_cancelled(cancel).await.unwrap()
}

#[tokio::test]
async fn delayed_shutdown_is_accepted() {
    let executor = Arc::new(RecordingExecutor::succeeding());
    let handle = start(
        executor.clone(),
        PlatformSupport::Supported,
        Duration::from_secs(1),
    )
    .await;

    let response = reqwest::Client::new()
        .post(url(handle.local_addr(), "/shutdown"))
        .json(&serde_json::json!({ "delaySeconds": 30 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.ends_with("It will run in 30s."), "{message}");
    assert_eq!(executor.calls(), vec![vec!["/s", "/t", "30"]]);

    assert_eq!(stop(handle).await, ShutdownOutcome::Clean);
}

#[tokio::test]
async fn spawn_failure_answers_generic_500() {
    let executor = Arc::new(RecordingExecutor::failing_to_spawn("shutdown.exe not found"));
    let handle = start(
        executor.clone(),
        PlatformSupport::Supported,
        Duration::from_secs(1),
    )
    .await;

    let response = reqwest::Client::new()
        .post(url(handle.local_addr(), "/restart"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Failed to execute power command.");
    assert_eq!(executor.calls(), vec![vec!["/r", "/t", "0"]]);

    stop(handle).await;
}

#[tokio::test]
async fn cancellation_with_slow_request_stops_within_grace() {
    let executor = Arc::new(RecordingExecutor::succeeding().with_latency(Duration::from_secs(5)));
    let grace = Duration::from_millis(50);
    let handle = start(executor.clone(), PlatformSupport::Supported, grace).await;
    let addr = handle.local_addr();
    let mut watch = handle.watch();

    let client = tokio::spawn(async move {
        reqwest::Client::new()
            .post(url(addr, "/shutdown"))
            .send()
            .await
    });
    executor.started().await;

    let cancel = CancellationToken::new();
    let runner = tokio::spawn(handle.run_until_cancelled(cancel.clone()));
    let started = Instant::now();
    cancel.cancel();

    let outcome = runner.await.unwrap().unwrap();
    let elapsed = started.elapsed();
    assert_eq!(outcome, ShutdownOutcome::TimedOut);
    assert_eq!(watch.reached(LifecycleState::Stopped).await, LifecycleState::Stopped);
    assert!(elapsed < grace + Duration::from_millis(500), "{elapsed:?}");

    // The connection is closed at the deadline, long before the command returns.
    let answer = tokio::time::timeout(Duration::from_secs(2), client)
        .await
        .expect("in-flight request outlived the grace period")
        .unwrap();
    match answer {
        Ok(response) => assert!(!response.status().is_success(), "{:?}", response.status()),
        Err(err) => assert!(!err.is_timeout(), "{err}"),
    }
    assert_eq!(executor.call_count(), 1);
}

#[tokio::test]
async fn concurrent_shutdowns_run_independently() {
    let executor = Arc::new(RecordingExecutor::succeeding().with_latency(Duration::from_millis(300)));
    let handle = start(
        executor.clone(),
        PlatformSupport::Supported,
        Duration::from_secs(1),
    )
    .await;
    let client = reqwest::Client::new();
    let target = url(handle.local_addr(), "/shutdown");

    let started = Instant::now();
    let (first, second) = tokio::join!(
        client
            .post(&target)
            .json(&serde_json::json!({ "delaySeconds": 10 }))
            .send(),
        client
            .post(&target)
            .json(&serde_json::json!({ "delaySeconds": 20 }))
            .send(),
    );
    assert_eq!(first.unwrap().status(), 200);
    assert_eq!(second.unwrap().status(), 200);
    // Both invocations overlapped rather than queueing behind each other.
    assert!(started.elapsed() < Duration::from_millis(550));

    let mut calls = executor.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![vec!["/s", "/t", "10"], vec!["/s", "/t", "20"]]
    );

    stop(handle).await;
}

#[tokio::test]
async fn wrong_method_and_unsupported_platform() {
    let executor = Arc::new(RecordingExecutor::succeeding());
    let handle = start(
        executor.clone(),
        PlatformSupport::Unsupported,
        Duration::from_secs(1),
    )
    .await;
    let client = reqwest::Client::new();

    let response = client
        .get(url(handle.local_addr(), "/restart-bios"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    let response = client
        .post(url(handle.local_addr(), "/restart-bios"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 501);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Power control commands are available only on Windows hosts."
    );

    let page = client
        .get(url(handle.local_addr(), "/"))
        .send()
        .await
        .unwrap();
    assert_eq!(page.status(), 200);
    assert!(page.text().await.unwrap().contains("/restart-bios"));

    assert_eq!(executor.call_count(), 0);
    stop(handle).await;
}
