//! Prometheus metrics for the inference orchestrator

use prometheus::{IntCounter, IntCounterVec, Opts, Registry};

/// Counters for provider calls and fallbacks
#[derive(Clone)]
pub struct OrchestratorMetrics {
    /// Calls per provider, labelled by outcome (`ok`, `rate_limited`, `timeout`, ...)
    pub provider_calls: IntCounterVec,
    /// Times the orchestrator moved past a failed provider
    pub fallbacks: IntCounter,
    /// Calls where every provider failed
    pub exhausted: IntCounter,
}

impl OrchestratorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            provider_calls: IntCounterVec::new(
                Opts::new("parasite_provider_calls_total", "Provider calls by outcome"),
                &["provider", "outcome"],
            )?,
            fallbacks: IntCounter::new(
                "parasite_provider_fallbacks_total",
                "Fallbacks to the next provider",
            )?,
            exhausted: IntCounter::new(
                "parasite_providers_exhausted_total",
                "Calls where every provider failed",
            )?,
        })
    }

    pub fn register(&self, registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(self.provider_calls.clone()))?;
        registry.register(Box::new(self.fallbacks.clone()))?;
        registry.register(Box::new(self.exhausted.clone()))?;
        Ok(())
    }

    pub(crate) fn record_call(&self, provider: &str, outcome: &str) {
        self.provider_calls
            .with_label_values(&[provider, outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_count() {
        let registry = Registry::new();
        let metrics = OrchestratorMetrics::new().unwrap();
        metrics.register(&registry).unwrap();

        metrics.record_call("groq", "ok");
        metrics.record_call("groq", "ok");
        metrics.fallbacks.inc();

        assert_eq!(metrics.provider_calls.with_label_values(&["groq", "ok"]).get(), 2);
        assert_eq!(metrics.fallbacks.get(), 1);
        assert!(!registry.gather().is_empty());
    }
}
