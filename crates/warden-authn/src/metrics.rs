use prometheus::{
    HistogramVec, IntCounterVec, Registry, register_histogram_vec_with_registry,
    register_int_counter_vec_with_registry,
};

/// Authentication metrics for monitoring
#[derive(Clone)]
pub struct AuthMetrics {
    /// Counter for authentication attempts by authenticator and result
    pub authentications_total: IntCounterVec,

    /// Counter for signing-key cache hits
    pub cache_hits_total: IntCounterVec,

    /// Counter for signing-key cache misses
    pub cache_misses_total: IntCounterVec,

    /// Counter for identity-provider HTTP requests
    pub provider_requests_total: IntCounterVec,

    /// Histogram for end-to-end authentication duration
    pub authentication_duration_seconds: HistogramVec,
}

impl AuthMetrics {
    /// Creates the metric set and registers it with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (duplicate
    /// registration is the usual cause).
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let authentications_total = register_int_counter_vec_with_registry!(
            "warden_authentications_total",
            "Total number of authentication attempts",
            &["authenticator", "result"],
            registry
        )?;

        let cache_hits_total = register_int_counter_vec_with_registry!(
            "warden_auth_cache_hits_total",
            "Total number of signing key cache hits",
            &["cache_type"],
            registry
        )?;

        let cache_misses_total = register_int_counter_vec_with_registry!(
            "warden_auth_cache_misses_total",
            "Total number of signing key cache misses",
            &["cache_type"],
            registry
        )?;

        let provider_requests_total = register_int_counter_vec_with_registry!(
            "warden_auth_provider_requests_total",
            "Total number of identity provider requests",
            &["operation", "result"],
            registry
        )?;

        let authentication_duration_seconds = register_histogram_vec_with_registry!(
            "warden_authentication_duration_seconds",
            "Duration of authentication in seconds",
            &["authenticator"],
            registry
        )?;

        Ok(Self {
            authentications_total,
            cache_hits_total,
            cache_misses_total,
            provider_requests_total,
            authentication_duration_seconds,
        })
    }

    /// Record a successful authentication
    pub fn record_success(&self, authenticator: &str) {
        self.authentications_total.with_label_values(&[authenticator, "success"]).inc();
    }

    /// Record a failed authentication
    pub fn record_failure(&self, authenticator: &str) {
        self.authentications_total.with_label_values(&[authenticator, "failure"]).inc();
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self, cache_type: &str) {
        self.cache_hits_total.with_label_values(&[cache_type]).inc();
    }

    /// Record a cache miss
    pub fn record_cache_miss(&self, cache_type: &str) {
        self.cache_misses_total.with_label_values(&[cache_type]).inc();
    }

    /// Record an identity-provider request outcome
    pub fn record_provider_request(&self, operation: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.provider_requests_total.with_label_values(&[operation, result]).inc();
    }

    /// Start timing an authentication
    pub fn start_authentication_timer(&self, authenticator: &str) -> prometheus::HistogramTimer {
        self.authentication_duration_seconds.with_label_values(&[authenticator]).start_timer()
    }
}
