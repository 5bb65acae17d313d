//! # arbiter-stream — backpressured observability fanout
//!
//! Subscribers register a filter and a per-second delivery cap; the
//! fanout replays the matching tail of recent events, then delivers
//! live events and periodic spend/health rollups through a
//! token-bucket-limited, backlog-bounded channel per subscriber.

#![deny(missing_docs)]

pub mod fanout;
pub mod filter;
pub mod replay;
pub mod subscription;
pub mod wire;

pub use fanout::{FanoutConfig, StreamFanout};
pub use filter::StreamFilter;
pub use replay::{ReplayBuffer, ReplayConfig};
pub use subscription::Subscription;
pub use wire::{ServerMessage, StreamError, SubscribeRequest};
