//! # Domain Layer
//!
//! Pure logic with no I/O dependencies.
//! This is the inner layer of the hexagonal architecture.

pub mod entities;
pub mod errors;
pub mod state;
pub mod verify;
