use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatch_ops_total: IntCounterVec,
    pub dispatch_op_latency_seconds: HistogramVec,
    pub rides_active: IntGauge,
    pub connected_sessions: IntGauge,
    pub location_pings_total: IntCounter,
    pub breadcrumbs_pruned_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatch_ops_total = IntCounterVec::new(
            Opts::new("dispatch_ops_total", "Dispatch operations by op and outcome"),
            &["op", "outcome"],
        )
        .expect("valid dispatch_ops_total metric");

        let dispatch_op_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_op_latency_seconds",
                "Latency of dispatch operations in seconds",
            ),
            &["op"],
        )
        .expect("valid dispatch_op_latency_seconds metric");

        let rides_active = IntGauge::new(
            "rides_active",
            "Rides currently in a non-terminal state",
        )
        .expect("valid rides_active metric");

        let connected_sessions = IntGauge::new(
            "connected_sessions",
            "Currently connected realtime sessions",
        )
        .expect("valid connected_sessions metric");

        let location_pings_total =
            IntCounter::new("location_pings_total", "Driver position updates received")
                .expect("valid location_pings_total metric");

        let breadcrumbs_pruned_total = IntCounter::new(
            "breadcrumbs_pruned_total",
            "Breadcrumbs removed by the retention janitor",
        )
        .expect("valid breadcrumbs_pruned_total metric");

        registry
            .register(Box::new(dispatch_ops_total.clone()))
            .expect("register dispatch_ops_total");
        registry
            .register(Box::new(dispatch_op_latency_seconds.clone()))
            .expect("register dispatch_op_latency_seconds");
        registry
            .register(Box::new(rides_active.clone()))
            .expect("register rides_active");
        registry
            .register(Box::new(connected_sessions.clone()))
            .expect("register connected_sessions");
        registry
            .register(Box::new(location_pings_total.clone()))
            .expect("register location_pings_total");
        registry
            .register(Box::new(breadcrumbs_pruned_total.clone()))
            .expect("register breadcrumbs_pruned_total");

        Self {
            registry,
            dispatch_ops_total,
            dispatch_op_latency_seconds,
            rides_active,
            connected_sessions,
            location_pings_total,
            breadcrumbs_pruned_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
