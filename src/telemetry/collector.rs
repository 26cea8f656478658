//! Event log and body-merge logic of the telemetry collector
//!
//! The log is append-only and keeps exact delivery order. Export
//! concatenates page events and then network events, each in delivery order;
//! nothing is re-sorted by timestamp.

use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::bodies::{BodySource, PendingBodies, SettledBodies};
use super::events::{EventCategory, EventKind, RecordedEvent};

/// Captured events of one page, in delivery order
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<(EventCategory, RecordedEvent)>,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: EventKind, params: Value) {
        self.events.push((kind.category(), RecordedEvent::new(kind, params)));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Every event in exact delivery order, across categories
    pub fn iter(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter().map(|(_, event)| event)
    }

    pub fn network(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.category(EventCategory::Network)
    }

    pub fn page(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.category(EventCategory::Page)
    }

    fn category(&self, wanted: EventCategory) -> impl Iterator<Item = &RecordedEvent> {
        self.events
            .iter()
            .filter(move |(category, _)| *category == wanted)
            .map(|(_, event)| event)
    }
}

/// Records events and tracks body fetches for one capture window
pub struct TelemetryCollector<B> {
    log: EventLog,
    bodies: Option<PendingBodies<B>>,
}

impl<B: BodySource> TelemetryCollector<B> {
    /// `body_source` enables body capture when present
    #[must_use]
    pub fn new(body_source: Option<B>) -> Self {
        Self {
            log: EventLog::new(),
            bodies: body_source.map(PendingBodies::new),
        }
    }

    #[must_use]
    pub fn captures_bodies(&self) -> bool {
        self.bodies.is_some()
    }

    /// Append one event; a finished load also starts its body fetch
    pub fn record(&mut self, kind: EventKind, params: Value) {
        if kind == EventKind::LoadingFinished
            && let Some(bodies) = self.bodies.as_mut()
            && let Some(request_id) = params.get("requestId").and_then(Value::as_str)
        {
            bodies.spawn(request_id.to_string());
        }
        self.log.push(kind, params);
    }

    #[must_use]
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Settle every outstanding body fetch and hand back the capture
    pub async fn finish(self, settle_limit: Duration) -> CapturedTelemetry {
        let bodies = match self.bodies {
            Some(pending) => {
                debug!(
                    target: "pagegraph::telemetry",
                    "Settling {} pending body fetches",
                    pending.len()
                );
                pending.settle(settle_limit).await
            }
            None => SettledBodies::empty(),
        };
        CapturedTelemetry {
            log: self.log,
            bodies,
        }
    }
}

/// A finished capture: the event log plus settled bodies
#[derive(Debug)]
pub struct CapturedTelemetry {
    pub log: EventLog,
    pub bodies: SettledBodies,
}

impl CapturedTelemetry {
    /// Page events then network events, bodies merged into responses
    #[must_use]
    pub fn into_export(self) -> Vec<RecordedEvent> {
        let mut network: Vec<RecordedEvent> = self.log.network().cloned().collect();
        merge_bodies(&mut network, &self.bodies);

        self.log.page().cloned().chain(network).collect()
    }
}

/// Attach decoded bodies to matching `Network.responseReceived` events
///
/// Matching is by request id. A response with no settled body keeps its
/// `body` field unset.
pub fn merge_bodies(network: &mut [RecordedEvent], bodies: &SettledBodies) {
    if bodies.is_empty() {
        return;
    }
    for event in network.iter_mut() {
        if event.kind() != Some(EventKind::ResponseReceived) {
            continue;
        }
        let Some(body) = event.request_id().and_then(|id| bodies.get(id)) else {
            continue;
        };
        let decoded = body.decode();
        if let Some(response) = event.params.get_mut("response").and_then(Value::as_object_mut) {
            response.insert("body".to_string(), Value::String(decoded));
        }
    }
}
