//! Web server module for handling inbound pub/sub webhooks.
//!
//! This module provides the synchronous webhook path:
//! - Receives SNS-style envelopes
//! - Authenticates them (topic allow-list + signature)
//! - Routes by message kind and processes notifications to completion
//! - Responds only when the whole call has run

pub mod certs;
pub mod handlers;
pub mod signature;

pub use certs::{CertCache, CertFetcher, HttpCertFetcher};
pub use handlers::{health, sns_webhook, AppState, HealthResponse, WebhookResponse};
pub use signature::{canonical_string, cert_url_allowed, SignatureError, SignatureVerifier};
