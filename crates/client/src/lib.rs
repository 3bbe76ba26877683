//! Client side of the museum kiosk worker.
//!
//! This crate provides the request router / cache manager, the upstream
//! fetch transport, the Content API client and the MQTT messaging client
//! used by the worker binary.

pub mod content;
pub mod fetch;
pub mod messaging;
pub mod worker;

pub use content::{ContentClient, ContentError, Exhibit, ExhibitFilter};
pub use fetch::{FetchClient, FetchConfig};
pub use messaging::{ConnectionState, LightAction, MessagingClient, MessagingError};
pub use worker::{CacheWorker, FetchOutcome, Network, Request, Response, ResponseSource, WorkerState};
