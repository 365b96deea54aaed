//! Serves bus requests on behalf of the orchestrator.

use tokio::task::JoinHandle;

use crate::bus::{CaptureReply, Request, RequestReceiver, Response};

use super::Orchestrator;

pub async fn handle_request(orchestrator: &Orchestrator, request: Request) -> Response {
    match request {
        Request::CaptureScreen => {
            let reply = match orchestrator.capture_and_wait().await {
                Ok(outcome) => outcome.to_reply(),
                Err(busy) => CaptureReply::failed(busy.to_string()),
            };
            Response::Capture(reply)
        }
        Request::GetLastResult => match orchestrator.get_last_outcome().await {
            Ok(outcome) => Response::LastResult(Box::new(outcome)),
            Err(err) => {
                log::error!("Failed to read result cache: {err:#}");
                Response::unavailable(format!("last result unavailable: {err:#}"))
            }
        },
    }
}

/// Answer requests until every bus handle is gone. Each request gets its own
/// task so a capture in flight does not hold up `GET_LAST_RESULT`.
pub fn serve(orchestrator: Orchestrator, mut requests: RequestReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = requests.recv().await {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let response = handle_request(&orchestrator, envelope.request).await;
                envelope.respond(response);
            });
        }
        log::debug!("Request channel closed");
    })
}
