//! # Ports Layer
//!
//! Trait definitions for the hexagonal architecture.
//! - **Inbound (Driving)**: API that callers use
//! - **Outbound (Driven)**: Backends and the native hardware API this crate drives

pub mod inbound;
pub mod outbound;
