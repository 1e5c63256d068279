use crate::health::Snapshot;
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    started_at_unix: i64,
    pub host_cpu_load_per_core: Gauge,
    pub host_available_memory_gigabytes: Gauge,
    pub host_disk_free_gigabytes: Gauge,
    pub host_load_window_minutes: Gauge,
    pub host_healthy: Gauge,
    pub agent_uptime_seconds: Gauge,
    pub agent_scrape_count_total: Counter,
    pub agent_sample_errors_total: CounterVec,
    pub agent_last_sample_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let host_cpu_load_per_core = Gauge::with_opts(opts!(
            "host_cpu_load_per_core",
            "Load average of the selected window divided by logical cores"
        ))?;
        let host_available_memory_gigabytes = Gauge::with_opts(opts!(
            "host_available_memory_gigabytes",
            "Available memory in decimal gigabytes"
        ))?;
        let host_disk_free_gigabytes = Gauge::with_opts(opts!(
            "host_disk_free_gigabytes",
            "Free space on the watched volume in decimal gigabytes"
        ))?;
        let host_load_window_minutes = Gauge::with_opts(opts!(
            "host_load_window_minutes",
            "Load-average window used for the last sample"
        ))?;
        let host_healthy = Gauge::with_opts(opts!(
            "host_healthy",
            "1 when every threshold held at the last sample, 0 otherwise"
        ))?;
        let agent_uptime_seconds =
            Gauge::with_opts(opts!("agent_uptime_seconds", "Agent uptime in seconds"))?;
        let agent_scrape_count_total = Counter::with_opts(opts!(
            "agent_scrape_count_total",
            "Number of /metrics scrapes served"
        ))?;
        let agent_sample_errors_total = CounterVec::new(
            opts!(
                "agent_sample_errors_total",
                "Failed host samples by source"
            ),
            &["source"],
        )?;
        let agent_last_sample_timestamp_seconds = Gauge::with_opts(opts!(
            "agent_last_sample_timestamp_seconds",
            "Unix time of the last successful sample"
        ))?;

        register(&registry, &host_cpu_load_per_core)?;
        register(&registry, &host_available_memory_gigabytes)?;
        register(&registry, &host_disk_free_gigabytes)?;
        register(&registry, &host_load_window_minutes)?;
        register(&registry, &host_healthy)?;
        register(&registry, &agent_uptime_seconds)?;
        register(&registry, &agent_scrape_count_total)?;
        register(&registry, &agent_sample_errors_total)?;
        register(&registry, &agent_last_sample_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            started_at_unix: now_unix(),
            host_cpu_load_per_core,
            host_available_memory_gigabytes,
            host_disk_free_gigabytes,
            host_load_window_minutes,
            host_healthy,
            agent_uptime_seconds,
            agent_scrape_count_total,
            agent_sample_errors_total,
            agent_last_sample_timestamp_seconds,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot) {
        self.host_cpu_load_per_core.set(snapshot.cpu_utilization);
        self.host_available_memory_gigabytes
            .set(snapshot.available_memory);
        self.host_disk_free_gigabytes.set(snapshot.disk_space);
        self.host_load_window_minutes
            .set(f64::from(snapshot.interval));
        self.host_healthy
            .set(if snapshot.is_healthy { 1.0 } else { 0.0 });
        self.agent_last_sample_timestamp_seconds
            .set(now_unix() as f64);
    }

    pub fn inc_scrape_count(&self) {
        self.agent_scrape_count_total.inc();
    }

    pub fn inc_sample_error(&self, source: &str) {
        self.agent_sample_errors_total
            .with_label_values(&[source])
            .inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let uptime = now_unix().saturating_sub(self.started_at_unix);
        self.agent_uptime_seconds.set(uptime as f64);

        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
