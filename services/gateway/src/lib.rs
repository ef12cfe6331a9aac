//! # Signal Gateway
//!
//! Process shell around the strategy pipeline: tracing setup, the webhook
//! intake and the wiring that starts the K-line scheduler, the dispatch
//! consumer and the optional copy-trade follower.

pub mod logging;
pub mod runtime;
pub mod webhook;

pub use runtime::{run, Components, DRAIN_GRACE};
pub use webhook::{routes, sign, verify_signature, WebhookState};
