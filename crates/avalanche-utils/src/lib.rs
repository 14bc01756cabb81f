//! Utilities shared by the Avalanche consensus crates.
//!
//! - [`Bag`]: a multiset with threshold tracking
//! - [`logging`]: tracing subscriber setup

pub mod bag;
pub mod logging;

pub use bag::Bag;
pub use logging::{LogConfig, LogLevel};
