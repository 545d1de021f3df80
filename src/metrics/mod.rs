use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Tenant lifecycle operations (outcome counts, latency)
// - Compensating actions taken after partial failures
// - Messages delivered to tenant consumers
// - Broker reconnect attempts and link state
//
// Scraped via GET /metrics on the HTTP API.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Lifecycle Metrics
    pub tenant_operations: IntCounterVec,
    pub tenant_operation_duration: HistogramVec,
    pub compensations: IntCounterVec,

    // Queue Metrics
    pub messages_consumed: IntCounter,

    // Broker Connection Metrics
    pub broker_reconnect_attempts: IntCounter,
    pub broker_connection_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let tenant_operations = IntCounterVec::new(
            Opts::new("tenant_operations_total", "Tenant lifecycle operations by outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(tenant_operations.clone()))?;

        let tenant_operation_duration = HistogramVec::new(
            HistogramOpts::new("tenant_operation_duration_seconds", "Tenant lifecycle operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(tenant_operation_duration.clone()))?;

        let compensations = IntCounterVec::new(
            Opts::new("tenant_compensations_total", "Compensating actions after partial failures"),
            &["step", "outcome"],
        )?;
        registry.register(Box::new(compensations.clone()))?;

        let messages_consumed = IntCounter::new(
            "queue_messages_consumed_total",
            "Messages delivered to tenant queue consumers",
        )?;
        registry.register(Box::new(messages_consumed.clone()))?;

        let broker_reconnect_attempts = IntCounter::new(
            "broker_reconnect_attempts_total",
            "Broker reconnection attempts",
        )?;
        registry.register(Box::new(broker_reconnect_attempts.clone()))?;

        let broker_connection_state = IntGauge::new(
            "broker_connection_state",
            "Broker link state (0=Lost, 1=Reconnecting, 2=Connected)",
        )?;
        registry.register(Box::new(broker_connection_state.clone()))?;

        Ok(Self {
            registry,
            tenant_operations,
            tenant_operation_duration,
            compensations,
            messages_consumed,
            broker_reconnect_attempts,
            broker_connection_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome and latency of one lifecycle operation.
    pub fn observe_operation(&self, operation: &str, success: bool, seconds: f64) {
        let outcome = if success { "success" } else { "failure" };
        self.tenant_operations
            .with_label_values(&[operation, outcome])
            .inc();
        self.tenant_operation_duration
            .with_label_values(&[operation])
            .observe(seconds);
    }

    pub fn record_compensation(&self, step: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.compensations.with_label_values(&[step, outcome]).inc();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}
