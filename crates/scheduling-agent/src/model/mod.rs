//! Model reasoning client: transport, retry loop and token accounting.

mod client;
mod transport;
mod usage;

pub use client::{ModelClient, ModelResponse};
pub use transport::{HttpTransport, ModelRequest, ModelTransport, RawCompletion, TransportError};
pub use usage::{estimate_cost, TokenUsage};
