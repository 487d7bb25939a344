// Network implementation of the store and auth contracts.

mod client;
pub mod listener;

pub use client::HttpClient;
pub use listener::ReconnectConfig;
