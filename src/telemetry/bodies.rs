//! Out-of-band response body fetches
//!
//! Fetches are spawned into a join set when a request finishes loading and
//! must be settled before anything reads them. `SettledBodies` can only be
//! produced by `PendingBodies::settle`, so a merge that takes it cannot run
//! against an unsettled set.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Raw body as returned by the protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseBody {
    pub body: String,
    pub base64_encoded: bool,
}

impl ResponseBody {
    /// Body as a string, base64-decoded when flagged
    ///
    /// Binary payloads are decoded lossily.
    #[must_use]
    pub fn decode(&self) -> String {
        if !self.base64_encoded {
            return self.body.clone();
        }
        match STANDARD.decode(self.body.as_bytes()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                warn!(target: "pagegraph::telemetry", "Body flagged base64 but failed to decode: {e}");
                self.body.clone()
            }
        }
    }
}

/// Something that can fetch a response body by request id
pub trait BodySource: Clone + Send + Sync + 'static {
    fn fetch_body(&self, request_id: String) -> impl Future<Output = anyhow::Result<ResponseBody>> + Send;
}

/// Outstanding body fetches for one capture window
pub struct PendingBodies<B> {
    source: B,
    tasks: JoinSet<(String, anyhow::Result<ResponseBody>)>,
}

impl<B: BodySource> PendingBodies<B> {
    #[must_use]
    pub fn new(source: B) -> Self {
        Self {
            source,
            tasks: JoinSet::new(),
        }
    }

    /// Start fetching the body of `request_id` without blocking the caller
    pub fn spawn(&mut self, request_id: String) {
        let source = self.source.clone();
        self.tasks.spawn(async move {
            let result = source.fetch_body(request_id.clone()).await;
            (request_id, result)
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Await every outstanding fetch, bounded by `limit`
    ///
    /// Failed fetches are logged and left absent. Fetches still running when
    /// `limit` passes are aborted and likewise left absent.
    pub async fn settle(mut self, limit: Duration) -> SettledBodies {
        let mut bodies = HashMap::new();
        let outstanding = self.tasks.len();

        let drained = tokio::time::timeout(limit, async {
            while let Some(joined) = self.tasks.join_next().await {
                match joined {
                    Ok((request_id, Ok(body))) => {
                        bodies.insert(request_id, body);
                    }
                    Ok((request_id, Err(e))) => {
                        warn!(
                            target: "pagegraph::telemetry",
                            "Failed to fetch response body for {request_id}: {e:#}"
                        );
                    }
                    Err(e) => {
                        warn!(target: "pagegraph::telemetry", "Body fetch task failed: {e}");
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                target: "pagegraph::telemetry",
                "Gave up on {} body fetches after {:?}",
                self.tasks.len(),
                limit
            );
            self.tasks.abort_all();
        }

        debug!(
            target: "pagegraph::telemetry",
            "Settled {} of {} response bodies",
            bodies.len(),
            outstanding
        );
        SettledBodies(bodies)
    }
}

/// Response bodies whose fetches have all completed, keyed by request id
#[derive(Debug, Default)]
pub struct SettledBodies(HashMap<String, ResponseBody>);

impl SettledBodies {
    /// No bodies; used when body capture is off
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, request_id: &str) -> Option<&ResponseBody> {
        self.0.get(request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_and_base64() {
        let plain = ResponseBody {
            body: "hello".to_string(),
            base64_encoded: false,
        };
        assert_eq!(plain.decode(), "hello");

        let encoded = ResponseBody {
            body: STANDARD.encode("<html></html>"),
            base64_encoded: true,
        };
        assert_eq!(encoded.decode(), "<html></html>");
    }

    #[derive(Clone)]
    struct Never;

    impl BodySource for Never {
        async fn fetch_body(&self, _request_id: String) -> anyhow::Result<ResponseBody> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_gives_up_after_limit() {
        let mut pending = PendingBodies::new(Never);
        pending.spawn("1".to_string());
        let settled = pending.settle(Duration::from_secs(5)).await;
        assert!(settled.get("1").is_none());
    }
}
