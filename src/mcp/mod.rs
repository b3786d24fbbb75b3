pub mod server;

pub use server::{serve_stdio, BridgeServer};
