//! # Adapters Module
//!
//! Infrastructure adapters implementing the outbound ports.
//!
//! - `protocol`: newline-delimited JSON codec for the helper
//! - `event`: one-shot broadcast event
//! - `supervisor`: helper process, pipes and background tasks
//! - `remote`: backend brokered by a helper process
//! - `local`: backend driving a hardware device directly
//! - `software`: in-memory P-256 device

pub mod event;
pub mod local;
pub mod protocol;
pub mod remote;
pub mod software;
pub mod supervisor;
