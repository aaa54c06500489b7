#![forbid(unsafe_code)]

//! SkillGate gateway node.
//!
//! Thin HTTP transport over the core services: request binding, error → status
//! mapping, per-client rate limiting, Prometheus metrics, and graceful
//! shutdown. All integers that may be chain-sized cross the wire as decimal
//! strings; addresses as `0x`-hex.

pub mod config;
pub mod http_server;
pub mod metrics;
