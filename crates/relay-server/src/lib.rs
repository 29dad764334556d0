//! relay-server - non-async HTTP server built on the relay reactor
//!
//! - `listener`: accepts connections and hands them to `connection`
//! - `connection`: per-connection request parsing and response dispatch
//! - `routes`: the default route tree served when no custom one is wired in

pub mod connection;
pub mod listener;
pub mod routes;
