//! Assembles a HAR log from the exported event list
//!
//! Entries are keyed by request id. A `requestWillBeSent` carrying a
//! `redirectResponse` closes the previous hop of the same id before opening
//! the next one. Requests that never got a response or a failure are dropped.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::Url;

use super::{
    Har, HarCache, HarContent, HarCreator, HarEntry, HarLog, HarNameValue, HarPage, HarPageTimings,
    HarPostData, HarRequest, HarResponse, HarTimings,
};
use crate::telemetry::{EventCategory, EventKind, RecordedEvent};

const HAR_VERSION: &str = "1.2";

/// Entry under construction, with the monotonic start kept aside
struct OpenEntry {
    entry: HarEntry,
    started: f64,
    has_response: bool,
}

struct OpenPage {
    page: HarPage,
    started: f64,
}

#[derive(Default)]
struct HarAssembler {
    include_text_bodies: bool,
    main_frame: Option<String>,
    pages: Vec<OpenPage>,
    open: HashMap<String, OpenEntry>,
    finished: Vec<OpenEntry>,
}

/// Build a HAR 1.2 document from captured events
///
/// Bodies merged into `response.body` become `content.text` only when
/// `include_text_bodies` is set.
#[must_use]
pub fn build_har(events: &[RecordedEvent], include_text_bodies: bool) -> Har {
    let mut assembler = HarAssembler {
        include_text_bodies,
        ..HarAssembler::default()
    };

    // Network events first so page ids exist before page timings land
    let (network, page): (Vec<_>, Vec<_>) = events
        .iter()
        .filter_map(|event| event.kind().map(|kind| (kind, &event.params)))
        .partition(|(kind, _)| kind.category() == EventCategory::Network);

    for (kind, params) in network {
        assembler.network_event(kind, params);
    }
    for (kind, params) in page {
        assembler.page_event(kind, params);
    }
    assembler.finish()
}

impl HarAssembler {
    fn network_event(&mut self, kind: EventKind, params: &Value) {
        let Some(request_id) = params.get("requestId").and_then(Value::as_str) else {
            return;
        };
        match kind {
            EventKind::RequestWillBeSent => self.request_will_be_sent(request_id, params),
            EventKind::ResponseReceived => {
                if let (Some(open), Some(response)) =
                    (self.open.get_mut(request_id), params.get("response"))
                {
                    apply_response(open, response, self.include_text_bodies);
                    if let Some(kind) = params.get("type").and_then(Value::as_str) {
                        open.entry.resource_type = Some(kind.to_string());
                    }
                }
            }
            EventKind::DataReceived => {
                if let Some(open) = self.open.get_mut(request_id) {
                    open.entry.response.content.size += int(params, "dataLength");
                }
            }
            EventKind::RequestServedFromCache => {
                if let Some(open) = self.open.get_mut(request_id) {
                    open.entry.from_cache = Some("memory".to_string());
                }
            }
            EventKind::ResourceChangedPriority => {
                if let Some(open) = self.open.get_mut(request_id)
                    && let Some(priority) = params.get("newPriority").and_then(Value::as_str)
                {
                    open.entry.priority = Some(priority.to_string());
                }
            }
            EventKind::LoadingFinished => {
                if let Some(mut open) = self.open.remove(request_id) {
                    let transferred = int(params, "encodedDataLength");
                    open.entry.response.transfer_size = transferred;
                    if open.entry.response.body_size < 0 {
                        open.entry.response.body_size = transferred;
                    }
                    close_timing(&mut open, params);
                    self.finished.push(open);
                }
            }
            EventKind::LoadingFailed => {
                if let Some(mut open) = self.open.remove(request_id) {
                    let error = params
                        .get("errorText")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string();
                    if !open.has_response {
                        open.entry.response.status = 0;
                        open.entry.response.status_text = error.clone();
                        open.has_response = true;
                    }
                    open.entry.error = Some(error);
                    close_timing(&mut open, params);
                    self.finished.push(open);
                }
            }
            _ => {}
        }
    }

    fn request_will_be_sent(&mut self, request_id: &str, params: &Value) {
        let Some(request) = params.get("request") else {
            return;
        };

        if let Some(redirect) = params.get("redirectResponse")
            && let Some(mut previous) = self.open.remove(request_id)
        {
            apply_response(&mut previous, redirect, false);
            close_timing(&mut previous, params);
            self.finished.push(previous);
        }

        let url = str_field(request, "url");
        let is_document = params.get("type").and_then(Value::as_str) == Some("Document");
        let frame_id = params.get("frameId").and_then(Value::as_str);
        let started = float(params, "timestamp");
        let wall_time = float(params, "wallTime");

        if is_document && frame_id.is_some() {
            if self.main_frame.is_none() {
                self.main_frame = frame_id.map(str::to_string);
            }
            // Only hops of the top frame start a page; redirects stay on theirs
            if frame_id == self.main_frame.as_deref() && params.get("redirectResponse").is_none() {
                self.pages.push(OpenPage {
                    page: HarPage {
                        started_date_time: iso_time(wall_time),
                        id: format!("page_{}", self.pages.len() + 1),
                        title: url.clone(),
                        page_timings: HarPageTimings::default(),
                    },
                    started,
                });
            }
        }

        let post_data = request
            .get("postData")
            .and_then(Value::as_str)
            .map(|text| HarPostData {
                mime_type: header_value(request.get("headers"), "content-type").unwrap_or_default(),
                text: text.to_string(),
            });
        let body_size = post_data.as_ref().map_or(0, |p| p.text.len() as i64);

        let entry = HarEntry {
            pageref: self.pages.last().map(|p| p.page.id.clone()),
            started_date_time: iso_time(wall_time),
            time: 0.0,
            request: HarRequest {
                method: str_field(request, "method"),
                query_string: query_string(&url),
                url,
                http_version: String::new(),
                cookies: Vec::new(),
                headers: headers(request.get("headers")),
                post_data,
                headers_size: -1,
                body_size,
            },
            response: HarResponse {
                status: 0,
                status_text: String::new(),
                http_version: String::new(),
                cookies: Vec::new(),
                headers: Vec::new(),
                content: HarContent {
                    size: 0,
                    mime_type: String::new(),
                    text: None,
                },
                redirect_url: String::new(),
                headers_size: -1,
                body_size: -1,
                transfer_size: 0,
            },
            cache: HarCache::default(),
            timings: HarTimings::default(),
            server_ip_address: None,
            request_id: request_id.to_string(),
            resource_type: params.get("type").and_then(Value::as_str).map(str::to_string),
            priority: request
                .get("initialPriority")
                .and_then(Value::as_str)
                .map(str::to_string),
            from_cache: None,
            error: None,
        };

        self.open.insert(
            request_id.to_string(),
            OpenEntry {
                entry,
                started,
                has_response: false,
            },
        );
    }

    fn page_event(&mut self, kind: EventKind, params: &Value) {
        let timestamp = float(params, "timestamp");
        let Some(current) = self.pages.last_mut() else {
            return;
        };
        let offset = ((timestamp - current.started) * 1000.0).max(0.0);
        match kind {
            EventKind::DomContentEventFired => {
                current.page.page_timings.on_content_load.get_or_insert(offset);
            }
            EventKind::LoadEventFired => {
                current.page.page_timings.on_load.get_or_insert(offset);
            }
            _ => {}
        }
    }

    fn finish(self) -> Har {
        let mut finished: Vec<OpenEntry> = self
            .finished
            .into_iter()
            .filter(|open| open.has_response)
            .collect();
        finished.sort_by(|a, b| a.started.total_cmp(&b.started));

        Har {
            log: HarLog {
                version: HAR_VERSION.to_string(),
                creator: HarCreator {
                    name: env!("CARGO_PKG_NAME").to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                pages: self.pages.into_iter().map(|p| p.page).collect(),
                entries: finished.into_iter().map(|open| open.entry).collect(),
            },
        }
    }
}

fn apply_response(open: &mut OpenEntry, response: &Value, include_text_bodies: bool) {
    let target = &mut open.entry;
    target.response.status = int(response, "status");
    target.response.status_text = str_field(response, "statusText");
    target.response.headers = headers(response.get("headers"));
    target.response.content.mime_type = str_field(response, "mimeType");
    target.response.redirect_url =
        header_value(response.get("headers"), "location").unwrap_or_default();

    let protocol = str_field(response, "protocol");
    let http_version = normalize_protocol(&protocol);
    target.response.http_version = http_version.clone();
    target.request.http_version = http_version;

    if let Some(ip) = response.get("remoteIPAddress").and_then(Value::as_str) {
        target.server_ip_address = Some(ip.trim_matches(['[', ']']).to_string());
    }
    if response.get("fromDiskCache").and_then(Value::as_bool) == Some(true) {
        target.from_cache = Some("disk".to_string());
    }
    if include_text_bodies && let Some(body) = response.get("body").and_then(Value::as_str) {
        target.response.content.text = Some(body.to_string());
        if target.response.content.size == 0 {
            target.response.content.size = body.len() as i64;
        }
    }
    if let Some(request_headers) = response.get("requestHeaders")
        && target.request.headers.is_empty()
    {
        target.request.headers = headers(Some(request_headers));
    }
    open.has_response = true;
}

fn close_timing(open: &mut OpenEntry, params: &Value) {
    let ended = float(params, "timestamp");
    let total = ((ended - open.started) * 1000.0).max(0.0);
    open.entry.time = total;
    open.entry.timings.receive = total;
}

fn normalize_protocol(protocol: &str) -> String {
    match protocol.to_ascii_lowercase().as_str() {
        "h2" => "HTTP/2.0".to_string(),
        "h3" | "h3-29" | "quic" => "HTTP/3.0".to_string(),
        "http/1.0" => "HTTP/1.0".to_string(),
        "http/1.1" => "HTTP/1.1".to_string(),
        "" => String::new(),
        other => other.to_string(),
    }
}

fn headers(raw: Option<&Value>) -> Vec<HarNameValue> {
    let Some(map) = raw.and_then(Value::as_object) else {
        return Vec::new();
    };
    map.iter()
        .flat_map(|(name, value)| split_header(name, value))
        .collect()
}

// Repeated headers arrive joined by newlines
fn split_header(name: &str, value: &Value) -> Vec<HarNameValue> {
    let joined = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    joined
        .split('\n')
        .map(|part| HarNameValue {
            name: name.to_string(),
            value: part.to_string(),
        })
        .collect()
}

fn header_value(raw: Option<&Value>, wanted: &str) -> Option<String> {
    raw.and_then(Value::as_object)
        .and_then(|map: &Map<String, Value>| {
            map.iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .and_then(|(_, value)| value.as_str())
        })
        .map(str::to_string)
}

fn query_string(url: &str) -> Vec<HarNameValue> {
    Url::parse(url)
        .map(|parsed| {
            parsed
                .query_pairs()
                .map(|(name, value)| HarNameValue {
                    name: name.into_owned(),
                    value: value.into_owned(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn iso_time(wall_time: f64) -> String {
    let secs = wall_time.trunc() as i64;
    let nanos = (wall_time.fract() * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn float(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: EventKind, params: Value) -> RecordedEvent {
        RecordedEvent::new(kind, params)
    }

    fn document_request(id: &str, url: &str, ts: f64) -> RecordedEvent {
        event(
            EventKind::RequestWillBeSent,
            json!({
                "requestId": id,
                "frameId": "F1",
                "type": "Document",
                "timestamp": ts,
                "wallTime": 1_700_000_000.0 + ts,
                "request": {"url": url, "method": "GET", "headers": {"Accept": "text/html"}}
            }),
        )
    }

    fn response(id: &str, status: i64, body: Option<&str>) -> RecordedEvent {
        let mut response = json!({
            "url": "https://example.com/",
            "status": status,
            "statusText": "OK",
            "mimeType": "text/html",
            "protocol": "h2",
            "remoteIPAddress": "[2001:db8::1]",
            "headers": {"Set-Cookie": "a=1\nb=2"}
        });
        if let Some(body) = body {
            response["body"] = json!(body);
        }
        event(
            EventKind::ResponseReceived,
            json!({"requestId": id, "type": "Document", "response": response}),
        )
    }

    fn finished(id: &str, ts: f64, bytes: i64) -> RecordedEvent {
        event(
            EventKind::LoadingFinished,
            json!({"requestId": id, "timestamp": ts, "encodedDataLength": bytes}),
        )
    }

    #[test]
    fn test_single_document_entry() {
        let events = vec![
            event(EventKind::DomContentEventFired, json!({"timestamp": 10.5})),
            document_request("1", "https://example.com/?q=rust", 10.0),
            response("1", 200, Some("<html></html>")),
            finished("1", 10.25, 512),
        ];
        let har = build_har(&events, true);

        assert_eq!(har.log.version, "1.2");
        assert_eq!(har.log.pages.len(), 1);
        assert_eq!(har.log.pages[0].page_timings.on_content_load, Some(500.0));

        let entry = &har.log.entries[0];
        assert_eq!(entry.pageref.as_deref(), Some("page_1"));
        assert_eq!(entry.response.status, 200);
        assert_eq!(entry.response.http_version, "HTTP/2.0");
        assert_eq!(entry.response.transfer_size, 512);
        assert_eq!(entry.response.content.text.as_deref(), Some("<html></html>"));
        assert_eq!(entry.server_ip_address.as_deref(), Some("2001:db8::1"));
        assert_eq!(entry.request.query_string[0].value, "rust");
        assert_eq!(entry.response.headers.len(), 2);
        assert!((entry.time - 250.0).abs() < 1e-6);
    }

    #[test]
    fn test_bodies_omitted_unless_requested() {
        let events = vec![
            document_request("1", "https://example.com/", 1.0),
            response("1", 200, Some("secret")),
            finished("1", 2.0, 10),
        ];
        let har = build_har(&events, false);
        assert!(har.log.entries[0].response.content.text.is_none());
    }

    #[test]
    fn test_redirect_splits_entries() {
        let mut hop = document_request("1", "https://example.com/next", 2.0);
        hop.params["redirectResponse"] = json!({
            "status": 302,
            "statusText": "Found",
            "headers": {"Location": "https://example.com/next"}
        });
        let events = vec![
            document_request("1", "https://example.com/", 1.0),
            hop,
            response("1", 200, None),
            finished("1", 3.0, 100),
        ];
        let har = build_har(&events, false);

        assert_eq!(har.log.entries.len(), 2);
        assert_eq!(har.log.entries[0].response.status, 302);
        assert_eq!(har.log.entries[0].response.redirect_url, "https://example.com/next");
        assert_eq!(har.log.entries[1].request.url, "https://example.com/next");
        assert_eq!(har.log.pages.len(), 1);
    }

    #[test]
    fn test_failed_and_unanswered_requests() {
        let events = vec![
            document_request("1", "https://example.com/", 1.0),
            event(
                EventKind::LoadingFailed,
                json!({"requestId": "1", "timestamp": 1.5, "errorText": "net::ERR_ABORTED"}),
            ),
            document_request("2", "https://example.com/pending", 2.0),
        ];
        let har = build_har(&events, false);

        assert_eq!(har.log.entries.len(), 1);
        assert_eq!(har.log.entries[0].error.as_deref(), Some("net::ERR_ABORTED"));
        assert_eq!(har.log.entries[0].response.status, 0);
    }

    #[test]
    fn test_serializes_har_field_names() {
        let events = vec![
            document_request("1", "https://example.com/", 1.0),
            response("1", 200, None),
            finished("1", 2.0, 10),
        ];
        let json = serde_json::to_value(build_har(&events, false)).unwrap();
        let entry = &json["log"]["entries"][0];
        assert!(entry.get("startedDateTime").is_some());
        assert!(entry.get("serverIPAddress").is_some());
        assert_eq!(entry["response"]["redirectURL"], "");
        assert_eq!(json["log"]["pages"][0]["startedDateTime"], "2023-11-14T22:13:21.000Z");
    }
}
