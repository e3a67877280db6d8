//! The broadcaster core: topic registry, fan-out and publish rate limiting.

pub mod engine;
pub mod limiter;
pub mod message;
pub mod topic;

pub use engine::{Broker, Dispatch, Registration};
pub use limiter::PublishLimiter;
pub use message::Message;
