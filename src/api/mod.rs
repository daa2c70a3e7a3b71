//! Project-management API: entity types, endpoints and the typed client.

mod client;
pub mod endpoints;
pub mod types;

pub use client::TaskboardClient;
