//! HTTP/JSON surface of the confab signaling coordinator
//!
//! Thin axum handlers over [`confab_signal::Coordinator`]: session and room
//! management plus the polling-based signaling protocol. Errors are
//! delivered in-band as `{"error": <message>}` with HTTP 200 — the contract
//! existing clients rely on.

pub mod http;
