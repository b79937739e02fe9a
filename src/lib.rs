//! Turnstile - Admission-Control Rate Limiting Gateway
//!
//! This crate implements an admission-control gateway: callers ask whether
//! a key may perform another unit of work within a duration, given a limit,
//! and receive an allow/deny decision with remaining quota or retry delay.
//! Counting runs against a shared Redis store when reachable, falling back
//! per-call to an in-process store, behind an HMAC-authenticated HTTP API.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
