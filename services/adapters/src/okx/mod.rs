//! OKX v5 REST implementation of [`crate::Exchange`]

mod client;
mod exchange;
mod models;

pub use client::{sign, Credentials, OkxClient, OkxClientConfig};
pub use exchange::OkxExchange;
