//! Core data types for the Memory Parasite Protocol

pub mod ids;
pub mod infection;
