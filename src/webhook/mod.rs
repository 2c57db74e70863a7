//! # Admission Webhook
//!
//! Validating webhook enforcing cross-record invariants before records are persisted.

mod server;
mod validator;

pub use server::{review, router, start_webhook_server};
pub use validator::{Rejection, SiblingLookup, Validator};
