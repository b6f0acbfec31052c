pub mod config;
pub mod error;
pub mod executor;
pub mod manager;
pub mod metrics;
pub mod server;
pub mod shard;
pub mod types;

pub use config::Config;
pub use error::{BridgeError, Result};
