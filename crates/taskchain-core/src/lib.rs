pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod network;
pub mod paths;
pub mod pattern;
pub mod provision;
pub mod schedule;
pub mod synth;
pub mod topology;

pub use error::{Result, TaskchainError};
