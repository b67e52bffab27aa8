//! Domain logic for agent reasoning
//!
//! - Request and result types
//! - Prompt construction per mode
//! - Response interpretation, quote repair and plain-text verdicts

pub mod interpreter;
pub mod prompts;
pub mod repair;
pub mod request;
pub mod verdict;
