//! prometheus meters for invocations and webhook deliveries

use once_cell::sync::OnceCell;
use prometheus::{
	exponential_buckets, histogram_opts, opts, register_histogram, register_int_counter_vec,
	Histogram, IntCounterVec,
};

static DELIVERY_METRICS: OnceCell<DeliveryMetrics> = OnceCell::new();
static INVOCATION_METRICS: OnceCell<InvocationMetrics> = OnceCell::new();

#[derive(Debug)]
/// prometheus meters for the webhook client
pub struct DeliveryMetrics {
	/// delivery attempts by outcome
	deliveries: IntCounterVec,
	/// time spent waiting for the webhook
	duration: Histogram,
}

impl DeliveryMetrics {
	/// registers the meters on first use
	pub fn global() -> Result<&'static Self, prometheus::Error> {
		DELIVERY_METRICS.get_or_try_init(|| {
			let deliveries = register_int_counter_vec!(
				opts!("deliveries_total", "total number of webhook delivery attempts")
					.namespace("klaxon")
					.subsystem("webhook"),
				&["outcome"]
			)?;

			let duration = register_histogram!(histogram_opts!(
				"request_duration_seconds",
				"time until the webhook answered",
				exponential_buckets(0.01, 2., 12)?
			)
			.namespace("klaxon")
			.subsystem("webhook"))?;

			Ok(Self { deliveries, duration })
		})
	}

	pub fn record_delivery(&self, outcome: &str) {
		self.deliveries.with_label_values(&[outcome]).inc();
	}

	pub fn duration(&self) -> &Histogram {
		&self.duration
	}
}

#[derive(Debug)]
/// prometheus meters for the invocation endpoint
pub struct InvocationMetrics {
	invocations: IntCounterVec,
}

impl InvocationMetrics {
	/// registers the meters on first use
	pub fn global() -> Result<&'static Self, prometheus::Error> {
		INVOCATION_METRICS.get_or_try_init(|| {
			let invocations = register_int_counter_vec!(
				opts!("invocations_total", "total number of handled alarm events")
					.namespace("klaxon")
					.subsystem("invocation_endpoint"),
				&["outcome"]
			)?;

			Ok(Self { invocations })
		})
	}

	pub fn record_invocation(&self, success: bool) {
		let outcome = if success { "success" } else { "failure" };
		self.invocations.with_label_values(&[outcome]).inc();
	}
}
