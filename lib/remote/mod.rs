mod client;
mod error_mapping;

pub use client::{HttpPingProbe, WarehouseApiClient};
