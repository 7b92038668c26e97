//! Process-wide prometheus counters for the bot pipeline.

use std::sync::OnceLock;

use prometheus::{Encoder, IntCounter, Opts, TextEncoder};

const NAMESPACE: &str = "hyprbot";

/// Counters shared by the ingress and worker roles.
pub struct Metrics {
    /// Jobs accepted onto the stream.
    pub enqueued_jobs: IntCounter,
    /// Jobs that finished successfully.
    pub processed_jobs: IntCounter,
    /// Jobs that failed an attempt.
    pub failed_jobs: IntCounter,
    /// Platform updates received, before dedup.
    pub updates_total: IntCounter,
}

static GLOBAL: OnceLock<Metrics> = OnceLock::new();

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))
        .unwrap_or_else(|e| panic!("bad counter opts {name}: {e}"));
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .unwrap_or_else(|e| panic!("register {name}: {e}"));
    counter
}

/// The process-singleton metrics set, registered on first use.
pub fn global() -> &'static Metrics {
    GLOBAL.get_or_init(|| Metrics {
        enqueued_jobs: counter("queue_enqueued_total", "Total jobs enqueued to the stream"),
        processed_jobs: counter("queue_processed_total", "Total jobs successfully processed"),
        failed_jobs: counter("queue_failed_total", "Total jobs failed during processing"),
        updates_total: counter("telegram_updates_total", "Total telegram updates received"),
    })
}

/// Render the default registry in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() {
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_register_once_and_expose() {
        let m = global();
        let before = m.enqueued_jobs.get();
        m.enqueued_jobs.inc();
        assert_eq!(m.enqueued_jobs.get(), before + 1);

        // Second call returns the same instances.
        let again = global();
        assert_eq!(again.enqueued_jobs.get(), before + 1);

        let text = gather_text();
        assert!(text.contains("hyprbot_queue_enqueued_total"));
        assert!(text.contains("hyprbot_telegram_updates_total"));
    }
}
