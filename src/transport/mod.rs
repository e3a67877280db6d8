//! The `transport` module is responsible for handling network communication
//! with clients.
//!
//! - `http`: axum routes for balances, deposits and health, with CORS and
//!   request tracing.
//! - `websocket`: the connection adapter that upgrades subscribers and hands
//!   them to a [`Session`](crate::client::Session).
//! - `server`: builds the application from [`Settings`](crate::config::Settings)
//!   and serves it.

pub mod http;
pub mod server;
pub mod websocket;

pub use server::{build_app, serve};
