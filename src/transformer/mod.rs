//! Transformer module for protocol conversion.
//!
//! This module holds the vendor-neutral Standard Model and the pure
//! conversions between it and each vendor's wire format.
//!
//! ```text
//! Client Request
//!     ↓
//! StandardRequest  ── validate()
//!     ↓
//! [openai::build_request | gemini::build_request]
//!     ↓
//! Vendor API
//!     ↓
//! [openai::parse_response | gemini::parse_response]   (or sse + delta_text)
//!     ↓
//! StandardResponse / StreamChunk
//! ```

pub mod gemini;
pub mod openai;
pub mod sse;
pub mod standard;

pub use sse::{SseDecoder, DONE_MARKER};
pub use standard::*;
