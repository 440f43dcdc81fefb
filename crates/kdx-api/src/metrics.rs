//! Prometheus registry behind `/metrics`.
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    calls: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let calls = IntCounterVec::new(
            Opts::new("kdx_rpc_calls_total", "Procedure calls by path and outcome"),
            &["path", "outcome"],
        )?;
        registry.register(Box::new(calls.clone()))?;
        Ok(Self { registry, calls })
    }

    pub fn record_call(&self, path: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.calls.with_label_values(&[path, outcome]).inc();
    }

    pub fn call_count(&self, path: &str, outcome: &str) -> u64 {
        self.calls.with_label_values(&[path, outcome]).get()
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_encoding() {
        let metrics = Metrics::new().unwrap();
        metrics.record_call("greeting.hello", true);
        metrics.record_call("greeting.hello", true);
        metrics.record_call("echo.reject", false);

        assert_eq!(metrics.call_count("greeting.hello", "ok"), 2);
        assert_eq!(metrics.call_count("echo.reject", "error"), 1);

        let text = metrics.encode().unwrap();
        assert!(text.contains("kdx_rpc_calls_total"));
        assert!(text.contains("path=\"greeting.hello\""));
    }
}
