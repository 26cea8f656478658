use pagegraph_crawl::build_har;
use pagegraph_crawl::telemetry::{BodySource, EventKind, ResponseBody, TelemetryCollector};
use serde_json::json;
use std::time::Duration;

#[derive(Clone)]
struct StaticBody;

impl BodySource for StaticBody {
    async fn fetch_body(&self, request_id: String) -> anyhow::Result<ResponseBody> {
        match request_id.as_str() {
            "doc" => Ok(ResponseBody {
                body: "<html>ok</html>".to_string(),
                base64_encoded: false,
            }),
            other => Err(anyhow::anyhow!("no body for {other}")),
        }
    }
}

fn request(id: &str, url: &str, kind: &str, ts: f64) -> serde_json::Value {
    json!({
        "requestId": id,
        "frameId": "main",
        "type": kind,
        "timestamp": ts,
        "wallTime": 1_700_000_000.0 + ts,
        "request": {"url": url, "method": "GET", "headers": {}}
    })
}

fn response(id: &str, url: &str, mime: &str) -> serde_json::Value {
    json!({
        "requestId": id,
        "response": {"url": url, "status": 200, "statusText": "OK", "mimeType": mime, "headers": {}}
    })
}

#[tokio::test]
async fn test_collected_events_become_har_entries() {
    let mut collector = TelemetryCollector::new(Some(StaticBody));

    collector.record(EventKind::FrameStartedLoading, json!({"frameId": "main"}));
    collector.record(
        EventKind::RequestWillBeSent,
        request("doc", "https://example.com/", "Document", 1.0),
    );
    collector.record(EventKind::ResponseReceived, response("doc", "https://example.com/", "text/html"));
    collector.record(
        EventKind::RequestWillBeSent,
        request("img", "https://example.com/a.png", "Image", 1.1),
    );
    collector.record(EventKind::LoadingFinished, json!({"requestId": "doc", "timestamp": 1.2, "encodedDataLength": 15}));
    collector.record(EventKind::DomContentEventFired, json!({"timestamp": 1.3}));
    collector.record(EventKind::ResponseReceived, response("img", "https://example.com/a.png", "image/png"));
    collector.record(EventKind::LoadingFinished, json!({"requestId": "img", "timestamp": 1.4, "encodedDataLength": 900}));
    collector.record(EventKind::LoadEventFired, json!({"timestamp": 1.5}));

    let events = collector.finish(Duration::from_secs(5)).await.into_export();
    let har = build_har(&events, true);

    assert_eq!(har.log.pages.len(), 1);
    let timings = &har.log.pages[0].page_timings;
    assert!((timings.on_content_load.unwrap() - 300.0).abs() < 1e-6);
    assert!((timings.on_load.unwrap() - 500.0).abs() < 1e-6);

    assert_eq!(har.log.entries.len(), 2);
    let doc = &har.log.entries[0];
    assert_eq!(doc.request.url, "https://example.com/");
    assert_eq!(doc.response.content.text.as_deref(), Some("<html>ok</html>"));

    // Body fetch for the image failed; the entry survives without text
    let img = &har.log.entries[1];
    assert_eq!(img.response.content.mime_type, "image/png");
    assert!(img.response.content.text.is_none());
    assert_eq!(img.response.transfer_size, 900);
}
