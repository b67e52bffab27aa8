//! Content digests for the Memory Parasite Protocol
//!
//! This module provides BLAKE3 digests used as stable, externally verifiable
//! references for proposals and mutations.

pub mod digest;

pub use digest::{digest_value, digest_text, short_digest};
