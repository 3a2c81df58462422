//! Maiconsoft - client-side router and request layer
//!
//! Role and permission gated page routing over a typed route table, plus an
//! HTTP client with response caching, retry with backoff and coalescing of
//! concurrent identical reads. It exposes all modules for testing purposes.

pub mod access;
pub mod api;
pub mod console;
pub mod errors;
pub mod http;
pub mod router;
pub mod session;
pub mod settings;
