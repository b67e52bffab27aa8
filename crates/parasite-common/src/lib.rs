//! # Parasite Common
//!
//! Shared types, errors, and digests for the Memory Parasite Protocol.
//!
//! ## Core Types
//!
//! - [`Infection`]: a proposal sent from one agent to another, with a one-way lifecycle
//! - [`InfectionPayload`]: message, optional code snippet, context and priority
//! - [`InfectionKind`] / [`InfectionState`]: proposal classification and lifecycle state
//!
//! ## Crypto
//!
//! - [`crypto::digest`]: BLAKE3 content digests used as external verifiable references

pub mod crypto;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ParasiteError, Result, TransitionError};
pub use types::{
    ids::next_time_ordered_id,
    infection::{Infection, InfectionKind, InfectionPayload, InfectionState},
};

/// Lowest proposal priority
pub const MIN_PRIORITY: u8 = 1;

/// Highest proposal priority
pub const MAX_PRIORITY: u8 = 10;

/// Priority used when a proposal does not state one
pub const DEFAULT_PRIORITY: u8 = 5;
