//! # ledgercast
//!
//! `ledgercast` is a real-time fan-out broadcaster with a small account-balance
//! service in front of it. Published payloads are delivered to every live
//! WebSocket subscriber of their topic, and a subscriber that cannot keep up
//! is disconnected instead of slowing everyone else down.
//!
//! ## Core Modules
//!
//! - `broker`: the topic registry, fan-out with slow-consumer eviction, and the
//!   process-wide publish rate limiter.
//! - `client`: subscriber state and the per-connection drain session.
//! - `account`: in-memory balances whose deposits publish balance updates.
//! - `config`: loading and merging configuration.
//! - `transport`: HTTP routes and the WebSocket connection adapter.
//! - `utils`: error types and logging setup.

pub mod account;
pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
