pub mod config;
pub mod db;
pub mod dispatch;
pub mod ingest;
pub mod mcp;
pub mod models;
pub mod normalizer;
pub mod protocol;
pub mod query;
pub mod tools;
