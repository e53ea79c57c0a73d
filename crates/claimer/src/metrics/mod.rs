use prometheus::{CounterVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

pub struct MetricsContext {
    pub bundles: IntCounterVec,
    pub claimed_usd: CounterVec,
    pub cycle_duration: Histogram,
    pub registry: Registry,
}

impl MetricsContext {
    pub fn new() -> Result<Self, prometheus::Error> {
        // result: claimed, failed, skipped, unprofitable, no_adapter, simulated
        let bundles = IntCounterVec::new(
            Opts::new("claimer_bundles_total", "Bundles processed by outcome"),
            &["chain", "protocol", "result"],
        )?;
        let claimed_usd = CounterVec::new(
            Opts::new("claimer_claimed_usd_total", "USD value of successful claims"),
            &["chain", "protocol"],
        )?;
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "claimer_cycle_duration_seconds",
                "Duration of one discovery-to-execution cycle",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        let registry = Registry::new();
        registry.register(Box::new(bundles.clone()))?;
        registry.register(Box::new(claimed_usd.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;

        Ok(Self {
            bundles,
            claimed_usd,
            cycle_duration,
            registry,
        })
    }

    pub fn record_bundle(&self, chain: &str, protocol: &str, result: &str) {
        self.bundles
            .with_label_values(&[chain, protocol, result])
            .inc();
    }

    pub fn record_claimed(&self, chain: &str, protocol: &str, usd: f64) {
        if usd.is_finite() && usd > 0.0 {
            self.claimed_usd
                .with_label_values(&[chain, protocol])
                .inc_by(usd);
        }
    }

    pub fn observe_cycle(&self, seconds: f64) {
        self.cycle_duration.observe(seconds);
    }

    pub fn export_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}
