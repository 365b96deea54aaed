use std::{future::Future, time::Duration};

use anyhow::{Context, Result};
use futures_util::{stream, StreamExt};
use reqwest::{multipart, Body, Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::PipelineError;

use super::types::{AnalysisResult, AnalyzeEnvelope, ApiErrorBody};

/// Health checks only drive a status dot, so they give up quickly.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(3);

const ANALYZE_PATH: &str = "/api/v1/analyze";
const HEALTH_PATH: &str = "/api/v1/health";
const UPLOAD_FIELD: &str = "image";
const UPLOAD_FILENAME: &str = "screenshot.png";
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HealthStatus {
    Online,
    Offline,
    TimedOut,
}

/// A packaged upload that has not been sent yet.
pub struct PreparedUpload {
    request: RequestBuilder,
    url: String,
    sent: oneshot::Receiver<()>,
}

impl PreparedUpload {
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Clone)]
pub struct AnalysisClient {
    http: Client,
}

impl AnalysisClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("screenmind/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { http })
    }

    /// Package the PNG as multipart form content addressed to the analyze
    /// endpoint of `server_url`.
    pub fn prepare(&self, server_url: &str, png: Vec<u8>) -> Result<PreparedUpload, PipelineError> {
        let (sent_tx, sent_rx) = oneshot::channel();
        let length = png.len() as u64;
        let part = multipart::Part::stream_with_length(upload_body(png, sent_tx), length)
            .file_name(UPLOAD_FILENAME)
            .mime_str("image/png")
            .map_err(|err| PipelineError::UploadFailed(err.to_string()))?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        let url = endpoint(server_url, ANALYZE_PATH);
        Ok(PreparedUpload {
            request: self.http.post(&url).multipart(form),
            url,
            sent: sent_rx,
        })
    }

    /// Send the upload and wait for the parsed result. The whole exchange,
    /// body included, is bounded by `timeout`.
    pub async fn execute(
        &self,
        upload: PreparedUpload,
        timeout: Duration,
    ) -> Result<AnalysisResult, PipelineError> {
        self.execute_with(upload, timeout, || async {}).await
    }

    /// Like [`execute`](Self::execute), running `on_sent` once the image has
    /// gone out and only the server's answer is outstanding. A successful
    /// exchange always runs it.
    pub async fn execute_with<F, Fut>(
        &self,
        upload: PreparedUpload,
        timeout: Duration,
        on_sent: F,
    ) -> Result<AnalysisResult, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let PreparedUpload { request, sent, .. } = upload;
        let exchange = async move {
            let response = request
                .send()
                .await
                .map_err(|err| PipelineError::UploadFailed(describe(&err)))?;

            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|err| PipelineError::UploadFailed(describe(&err)))?;

            interpret(status, &body)
        };

        let tracked = async move {
            tokio::pin!(exchange);
            let finished_early = tokio::select! {
                biased;
                Ok(()) = sent => None,
                result = &mut exchange => Some(result),
            };

            match finished_early {
                None => {
                    on_sent().await;
                    exchange.await
                }
                Some(result) => {
                    if result.is_ok() {
                        on_sent().await;
                    }
                    result
                }
            }
        };

        match tokio::time::timeout(timeout, tracked).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::AnalysisTimeout(timeout.as_secs())),
        }
    }

    pub async fn analyze(
        &self,
        server_url: &str,
        png: Vec<u8>,
        timeout: Duration,
    ) -> Result<AnalysisResult, PipelineError> {
        let upload = self.prepare(server_url, png)?;
        self.execute(upload, timeout).await
    }

    pub async fn check_health(&self, server_url: &str) -> HealthStatus {
        self.check_health_within(server_url, HEALTH_CHECK_TIMEOUT).await
    }

    pub async fn check_health_within(&self, server_url: &str, timeout: Duration) -> HealthStatus {
        let url = endpoint(server_url, HEALTH_PATH);
        match tokio::time::timeout(timeout, self.http.get(&url).send()).await {
            Ok(Ok(response)) if response.status() == StatusCode::OK => HealthStatus::Online,
            Ok(Ok(response)) => {
                log::debug!("health check {url} answered {}", response.status());
                HealthStatus::Offline
            }
            Ok(Err(err)) => {
                log::debug!("health check {url} failed: {err}");
                HealthStatus::Offline
            }
            Err(_) => HealthStatus::TimedOut,
        }
    }
}

/// The PNG as a chunked body; `sent` fires when the last chunk is taken.
fn upload_body(png: Vec<u8>, sent: oneshot::Sender<()>) -> Body {
    let chunks: Vec<Vec<u8>> = png.chunks(UPLOAD_CHUNK_BYTES).map(<[u8]>::to_vec).collect();
    let last = chunks.len().saturating_sub(1);
    let mut sent = Some(sent);

    let body = stream::iter(chunks.into_iter().enumerate()).map(move |(index, chunk)| {
        if index == last {
            if let Some(sent) = sent.take() {
                let _ = sent.send(());
            }
        }
        Ok::<_, std::io::Error>(chunk)
    });
    Body::wrap_stream(body)
}

fn interpret(status: StatusCode, body: &[u8]) -> Result<AnalysisResult, PipelineError> {
    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message())
            .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
        return Err(PipelineError::AnalysisApiError {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_slice::<AnalyzeEnvelope>(body)
        .map(|envelope| envelope.data.normalized())
        .map_err(|err| PipelineError::MalformedResponse(err.to_string()))
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_connect() {
        format!("could not reach the analysis server: {err}")
    } else {
        err.to_string()
    }
}

pub(crate) fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), path)
}
