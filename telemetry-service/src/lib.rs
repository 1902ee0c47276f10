pub mod broadcast;
pub mod bucketize;
pub mod config;
pub mod cost;
pub mod error;
pub mod export;
pub mod http;
pub mod ingest;
pub mod metrics_server;
pub mod observability;
pub mod range;
pub mod store;
pub mod summary;

pub use error::EngineError;
