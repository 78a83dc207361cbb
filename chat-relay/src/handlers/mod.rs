//! HTTP handlers for the chat relay.

pub mod app;
pub mod chat;
pub mod metrics;
