//! Dedicated protocol session feeding the telemetry collector
//!
//! chromiumoxide hands each event type to its own listener channel, which
//! loses the order between types. Telemetry instead opens a second
//! connection to the browser, attaches a flat session to the crawled target
//! and reads every message off that one socket in wire order.

use anyhow::{Context, Result, anyhow};
use chromiumoxide::Connection;
use chromiumoxide::error::{CdpError, Result as CdpResult};
use chromiumoxide_cdp::cdp::browser_protocol::network::{self, GetResponseBodyParams, RequestId};
use chromiumoxide_cdp::cdp::browser_protocol::page as cdp_page;
use chromiumoxide_cdp::cdp::browser_protocol::target::{AttachToTargetParams, SessionId, TargetId};
use chromiumoxide_types::{CallId, CdpJsonEventMessage, Command, Message, MethodId, Response};
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::bodies::{BodySource, ResponseBody};
use super::collector::{CapturedTelemetry, TelemetryCollector};
use super::events::EventKind;
use crate::crawl_engine::CrawlError;

/// A raw protocol connection: commands go in, responses and events come out
/// in the order the browser sent them
pub trait CdpTransport:
    Stream<Item = CdpResult<Message<CdpJsonEventMessage>>> + Unpin + Send + 'static
{
    fn submit(
        &mut self,
        method: MethodId,
        session_id: Option<SessionId>,
        params: Value,
    ) -> serde_json::Result<CallId>;
}

impl CdpTransport for Connection<CdpJsonEventMessage> {
    fn submit(
        &mut self,
        method: MethodId,
        session_id: Option<SessionId>,
        params: Value,
    ) -> serde_json::Result<CallId> {
        self.submit_command(method, session_id, params)
    }
}

type Reply = oneshot::Sender<Result<Value>>;

struct CommandRequest {
    method: MethodId,
    session_id: Option<SessionId>,
    params: Value,
    reply: Reply,
}

/// Sends commands through the driver task
#[derive(Clone)]
struct CdpClient {
    commands: mpsc::UnboundedSender<CommandRequest>,
}

impl CdpClient {
    async fn call(&self, method: MethodId, session_id: Option<SessionId>, params: Value) -> Result<Value> {
        let (reply, response) = oneshot::channel();
        let label = method.clone();
        self.commands
            .send(CommandRequest {
                method,
                session_id,
                params,
                reply,
            })
            .map_err(|_| anyhow!("Telemetry connection closed before {label} was sent"))?;
        response
            .await
            .map_err(|_| anyhow!("Telemetry connection closed before {label} returned"))?
    }

    async fn execute<C: Command>(&self, command: C, session_id: Option<&SessionId>) -> Result<C::Response> {
        let method = command.identifier();
        let params = serde_json::to_value(&command).with_context(|| format!("Failed to encode {method}"))?;
        let value = self.call(method.clone(), session_id.cloned(), params).await?;
        C::response_from_value(value).with_context(|| format!("Unexpected {method} response"))
    }
}

fn into_result(response: Response) -> Result<Value> {
    match response.error {
        Some(error) => Err(anyhow!("{} ({})", error.message, error.code)),
        None => Ok(response.result.unwrap_or_else(|| json!({}))),
    }
}

/// Owns the transport: submits queued commands, resolves their replies and
/// forwards whitelisted events on one channel
///
/// Runs until every client is gone or the connection ends.
async fn drive<T: CdpTransport>(
    mut transport: T,
    mut commands: mpsc::UnboundedReceiver<CommandRequest>,
    events: mpsc::UnboundedSender<(EventKind, Value)>,
) {
    let mut pending: HashMap<CallId, Reply> = HashMap::new();

    loop {
        tokio::select! {
            request = commands.recv() => {
                let Some(request) = request else { break };
                match transport.submit(request.method.clone(), request.session_id, request.params) {
                    Ok(id) => {
                        pending.insert(id, request.reply);
                    }
                    Err(e) => {
                        let _ = request.reply.send(Err(anyhow!("Failed to submit {}: {e}", request.method)));
                    }
                }
            }
            message = transport.next() => match message {
                Some(Ok(Message::Response(response))) => {
                    if let Some(reply) = pending.remove(&response.id) {
                        let _ = reply.send(into_result(response));
                    }
                }
                Some(Ok(Message::Event(event))) => {
                    if let Some(kind) = EventKind::from_method(event.method.as_ref()) {
                        // Receiver gone means recording already stopped
                        let _ = events.send((kind, event.params));
                    }
                }
                Some(Err(CdpError::InvalidMessage(text, e))) => {
                    trace!(target: "pagegraph::telemetry", "Skipping unparsable message ({e}): {text}");
                }
                Some(Err(e)) => {
                    warn!(target: "pagegraph::telemetry", "Telemetry connection failed: {e}");
                    break;
                }
                None => {
                    debug!(target: "pagegraph::telemetry", "Telemetry connection closed");
                    break;
                }
            }
        }
    }
}

/// Records forwarded events until told to stop, then drains what was
/// already delivered
async fn record<B: BodySource>(
    mut collector: TelemetryCollector<B>,
    mut events: mpsc::UnboundedReceiver<(EventKind, Value)>,
    mut stop: oneshot::Receiver<()>,
) -> TelemetryCollector<B> {
    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            next = events.recv() => match next {
                Some((kind, params)) => collector.record(kind, params),
                None => break,
            },
        }
    }
    while let Ok((kind, params)) = events.try_recv() {
        collector.record(kind, params);
    }
    debug!(target: "pagegraph::telemetry", "Recorded {} events", collector.log().len());
    collector
}

/// Body source backed by `Network.getResponseBody` on the telemetry session
#[derive(Clone)]
struct SessionBodySource {
    client: CdpClient,
    session_id: SessionId,
}

impl BodySource for SessionBodySource {
    async fn fetch_body(&self, request_id: String) -> Result<ResponseBody> {
        let returns = self
            .client
            .execute(
                GetResponseBodyParams::new(RequestId::new(request_id.clone())),
                Some(&self.session_id),
            )
            .await
            .map_err(|e| CrawlError::BodyFetch {
                request_id,
                message: format!("{e:#}"),
            })?;
        Ok(ResponseBody {
            body: returns.body,
            base64_encoded: returns.base64_encoded,
        })
    }
}

/// A running capture attached to one target
///
/// Dropping the handle without `finish` aborts the capture and closes its
/// connection.
pub struct TelemetryHandle {
    stop: Option<oneshot::Sender<()>>,
    recorder: Option<JoinHandle<TelemetryCollector<SessionBodySource>>>,
    driver: JoinHandle<()>,
    client: CdpClient,
    settle_limit: Duration,
}

/// Open a telemetry session on `target_id` through the browser at `ws_url`
///
/// Must run before the first navigation so no early event is missed.
pub async fn attach(
    ws_url: &str,
    target_id: &TargetId,
    capture_bodies: bool,
    settle_limit: Duration,
) -> Result<TelemetryHandle> {
    let connection = Connection::<CdpJsonEventMessage>::connect(ws_url)
        .await
        .context("Failed to open telemetry connection")?;
    attach_with_transport(connection, target_id.clone(), capture_bodies, settle_limit).await
}

/// Attach over an already open transport
pub async fn attach_with_transport<T: CdpTransport>(
    transport: T,
    target_id: TargetId,
    capture_bodies: bool,
    settle_limit: Duration,
) -> Result<TelemetryHandle> {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    // On an early return the client drops and the driver winds down
    let driver = tokio::spawn(drive(transport, command_rx, event_tx));
    let client = CdpClient { commands };

    let session_id = client
        .execute(
            AttachToTargetParams {
                target_id,
                flatten: Some(true),
            },
            None,
        )
        .await
        .context("Failed to attach telemetry session")?
        .session_id;
    client
        .execute(network::EnableParams::default(), Some(&session_id))
        .await
        .context("Failed to enable Network domain")?;
    client
        .execute(cdp_page::EnableParams::default(), Some(&session_id))
        .await
        .context("Failed to enable Page domain")?;
    debug!(target: "pagegraph::telemetry", "Telemetry session {} attached", session_id.inner());

    let body_source = capture_bodies.then(|| SessionBodySource {
        client: client.clone(),
        session_id,
    });
    let (stop, stopped) = oneshot::channel();
    let recorder = tokio::spawn(record(TelemetryCollector::new(body_source), event_rx, stopped));

    Ok(TelemetryHandle {
        stop: Some(stop),
        recorder: Some(recorder),
        driver,
        client,
        settle_limit,
    })
}

impl TelemetryHandle {
    /// Stop recording, settle pending body fetches and return the capture
    pub async fn finish(mut self) -> Result<CapturedTelemetry> {
        // Every event sent before this reply has been forwarded once it arrives
        if let Err(e) = self.client.call("Target.getTargets".into(), None, json!({})).await {
            debug!(target: "pagegraph::telemetry", "Telemetry fence failed: {e:#}");
        }
        if let Some(stop) = self.stop.take() {
            // Receiver gone means the recorder already ended
            let _ = stop.send(());
        }
        let recorder = self
            .recorder
            .take()
            .ok_or_else(|| anyhow!("Telemetry recorder already taken"))?;
        let collector = recorder.await.context("Telemetry task failed")?;
        Ok(collector.finish(self.settle_limit).await)
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        if let Some(recorder) = self.recorder.take() {
            recorder.abort();
        }
        self.driver.abort();
    }
}
