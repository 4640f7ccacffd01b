//! Business logic services for the gateway.
//!
//! This module contains the provider registry (routing a model name to an
//! adapter) and the streaming relay.

pub mod provider_registry;
pub mod relay;

// Re-export commonly used types
pub use provider_registry::ProviderRegistry;
pub use relay::{ChunkTemplate, RelayConfig, RelayOutcome, StreamRelay};
