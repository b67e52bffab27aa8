//! Infrastructure: providers, rate limiting and retry

pub mod providers;
pub mod rate_limiter;
pub mod retry;
