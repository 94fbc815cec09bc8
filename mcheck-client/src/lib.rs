pub mod client;

pub use client::{MemcacheClient, MemcacheConnector};
