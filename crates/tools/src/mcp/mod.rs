pub mod client;
pub mod provider;

pub use client::McpClient;
pub use provider::McpToolProvider;
