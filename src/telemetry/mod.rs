//! Network and page telemetry capture
//!
//! Subscribes to a fixed whitelist of protocol events for one page, keeps
//! them in delivery order and optionally fetches response bodies out of
//! band. Bodies must be settled before the log is exported.

pub mod bodies;
pub mod cdp;
pub mod collector;
pub mod events;

pub use bodies::{BodySource, PendingBodies, ResponseBody, SettledBodies};
pub use cdp::{CdpTransport, TelemetryHandle, attach, attach_with_transport};
pub use collector::{CapturedTelemetry, EventLog, TelemetryCollector, merge_bodies};
pub use events::{EventCategory, EventKind, RecordedEvent};
