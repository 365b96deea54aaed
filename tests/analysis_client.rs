mod common;

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use common::StubServer;
use screenmind_lib::analysis::{AnalysisClient, HealthStatus, HEALTH_CHECK_TIMEOUT};

const ANALYSIS_OK: &str = r#"{"data":{"analysis":"2+2=4","analysis_time":1.2}}"#;

#[tokio::test]
async fn health_is_online_when_the_endpoint_answers_200() {
    let server = StubServer::respond(200, r#"{"status":"ok"}"#).await;
    let client = AnalysisClient::new().unwrap();

    assert_eq!(client.check_health(&server.url).await, HealthStatus::Online);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/api/v1/health");
}

#[tokio::test]
async fn health_path_ignores_trailing_slash() {
    let server = StubServer::respond(200, "{}").await;
    let client = AnalysisClient::new().unwrap();

    let status = client.check_health(&format!("{}/", server.url)).await;
    assert_eq!(status, HealthStatus::Online);
    assert_eq!(server.requests()[0].path, "/api/v1/health");
}

#[tokio::test]
async fn health_is_offline_on_any_other_status() {
    let server = StubServer::respond(500, r#"{"detail":"starting"}"#).await;
    let client = AnalysisClient::new().unwrap();
    assert_eq!(client.check_health(&server.url).await, HealthStatus::Offline);
}

#[tokio::test]
async fn silent_server_times_out_rather_than_going_offline() {
    let server = StubServer::hang().await;
    let client = AnalysisClient::new().unwrap();

    let started = tokio::time::Instant::now();
    let status = client
        .check_health_within(&server.url, Duration::from_millis(200))
        .await;
    assert_eq!(status, HealthStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn default_health_timeout_is_fixed() {
    let server = StubServer::hang().await;
    let client = AnalysisClient::new().unwrap();

    let started = tokio::time::Instant::now();
    assert_eq!(client.check_health(&server.url).await, HealthStatus::TimedOut);
    assert!(started.elapsed() >= HEALTH_CHECK_TIMEOUT);
}

#[tokio::test]
async fn sent_hook_runs_before_the_answer_arrives() {
    let (server, gate) = StubServer::gated(200, ANALYSIS_OK).await;
    let client = AnalysisClient::new().unwrap();
    let upload = client.prepare(&server.url, vec![7; 200_000]).unwrap();

    let sent = Arc::new(AtomicBool::new(false));
    let exchange = {
        let sent = sent.clone();
        tokio::spawn(async move {
            client
                .execute_with(upload, Duration::from_secs(10), || async move {
                    sent.store(true, Ordering::SeqCst);
                })
                .await
        })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while !sent.load(Ordering::SeqCst) || server.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upload never reported as sent");
    // The server holds its answer, so only the upload can be done.
    assert!(!exchange.is_finished());
    assert!(server.requests()[0].body.len() > 200_000);

    gate.notify_one();
    let result = exchange.await.unwrap().unwrap();
    assert_eq!(result.analysis, "2+2=4");
}
