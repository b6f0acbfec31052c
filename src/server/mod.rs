pub mod api;

pub use api::{routes, ShardApi};
