//! Protocol event kinds captured during a crawl

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol domain an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Network,
    Page,
}

/// The fixed whitelist of subscribed events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RequestWillBeSent,
    RequestServedFromCache,
    DataReceived,
    ResponseReceived,
    ResourceChangedPriority,
    LoadingFinished,
    LoadingFailed,
    LoadEventFired,
    DomContentEventFired,
    FrameStartedLoading,
    FrameAttached,
    FrameScheduledNavigation,
}

impl EventKind {
    pub const NETWORK: [EventKind; 7] = [
        Self::RequestWillBeSent,
        Self::RequestServedFromCache,
        Self::DataReceived,
        Self::ResponseReceived,
        Self::ResourceChangedPriority,
        Self::LoadingFinished,
        Self::LoadingFailed,
    ];

    pub const PAGE: [EventKind; 5] = [
        Self::LoadEventFired,
        Self::DomContentEventFired,
        Self::FrameStartedLoading,
        Self::FrameAttached,
        Self::FrameScheduledNavigation,
    ];

    /// CDP method name, as it appears in exported logs
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::RequestWillBeSent => "Network.requestWillBeSent",
            Self::RequestServedFromCache => "Network.requestServedFromCache",
            Self::DataReceived => "Network.dataReceived",
            Self::ResponseReceived => "Network.responseReceived",
            Self::ResourceChangedPriority => "Network.resourceChangedPriority",
            Self::LoadingFinished => "Network.loadingFinished",
            Self::LoadingFailed => "Network.loadingFailed",
            Self::LoadEventFired => "Page.loadEventFired",
            Self::DomContentEventFired => "Page.domContentEventFired",
            Self::FrameStartedLoading => "Page.frameStartedLoading",
            Self::FrameAttached => "Page.frameAttached",
            Self::FrameScheduledNavigation => "Page.frameScheduledNavigation",
        }
    }

    #[must_use]
    pub const fn category(self) -> EventCategory {
        match self {
            Self::RequestWillBeSent
            | Self::RequestServedFromCache
            | Self::DataReceived
            | Self::ResponseReceived
            | Self::ResourceChangedPriority
            | Self::LoadingFinished
            | Self::LoadingFailed => EventCategory::Network,
            _ => EventCategory::Page,
        }
    }

    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        Self::NETWORK
            .into_iter()
            .chain(Self::PAGE)
            .find(|kind| kind.method() == method)
    }
}

/// One captured event: `{method, params}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub method: String,
    pub params: Value,
}

impl RecordedEvent {
    #[must_use]
    pub fn new(kind: EventKind, params: Value) -> Self {
        Self {
            method: kind.method().to_string(),
            params,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_method(&self.method)
    }

    /// Network request identifier carried by the event, if any
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        self.params.get("requestId").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_roundtrip() {
        for kind in EventKind::NETWORK.into_iter().chain(EventKind::PAGE) {
            assert_eq!(EventKind::from_method(kind.method()), Some(kind));
        }
        assert_eq!(EventKind::from_method("Network.webSocketCreated"), None);
    }

    #[test]
    fn test_categories() {
        assert!(EventKind::NETWORK.iter().all(|k| k.category() == EventCategory::Network));
        assert!(EventKind::PAGE.iter().all(|k| k.category() == EventCategory::Page));
    }

    #[test]
    fn test_request_id_lookup() {
        let event = RecordedEvent::new(EventKind::LoadingFinished, json!({"requestId": "42.1"}));
        assert_eq!(event.request_id(), Some("42.1"));
        let event = RecordedEvent::new(EventKind::LoadEventFired, json!({"timestamp": 1.0}));
        assert_eq!(event.request_id(), None);
    }
}
