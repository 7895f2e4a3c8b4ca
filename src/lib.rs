#![deny(missing_docs)]

//! Core library for the DB service: an HTTP gateway over OpenSearch neural search.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Gateway request metrics.
pub mod metrics;
/// OpenSearch REST client.
pub mod opensearch;
/// Startup provisioning of the ML Commons embedding pipeline.
pub mod provisioning;
/// Gateway operations backing the HTTP surface.
pub mod service;
