//! posts rendered messages to the slack incoming webhook
//!
//! Every message gets exactly one attempt, retrying is left to whoever
//! invoked us.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::{
	header::{CONTENT_LENGTH, CONTENT_TYPE},
	StatusCode,
};
use thiserror::Error;
use url::Url;

use crate::{message::Message, metrics::DeliveryMetrics};

/// Error occuring while delivering a [Message]
#[derive(Error, Debug)]
pub enum DeliveryError {
	#[error("failed to serialize message: {0}")]
	Serialize(#[source] serde_json::Error),
	/// no complete response was received
	#[error("failed to post message to webhook: {0}")]
	Transport(#[source] reqwest::Error),
	/// the webhook answered with 4xx
	#[error("Error posting message to webhook: {}", status_line(.status, .status_text))]
	Client { status: u16, status_text: String, body: String },
	/// the webhook answered with 5xx
	#[error("Server error when processing message: {}", status_line(.status, .status_text))]
	Server { status: u16, status_text: String, body: String },
}

/// `<code> - <text>`, or just the code when there is no text
pub fn status_line(status: &u16, status_text: &str) -> String {
	if status_text.is_empty() {
		status.to_string()
	} else {
		format!("{status} - {status_text}")
	}
}

impl DeliveryError {
	/// label used for the delivery metric
	fn outcome(&self) -> &'static str {
		match self {
			DeliveryError::Serialize(_) | DeliveryError::Transport(_) => "transport_error",
			DeliveryError::Client { .. } => "client_error",
			DeliveryError::Server { .. } => "server_error",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// the webhooks answer
pub struct DeliveryResult {
	pub status: StatusCode,
	pub body: String,
}

impl DeliveryResult {
	/// reason phrase of the status code, empty for unknown codes
	pub fn status_text(&self) -> &'static str {
		self.status.canonical_reason().unwrap_or_default()
	}

	/// Classifies the answer: everything below 400 counts as delivered.
	pub fn classify(self) -> Result<Self, DeliveryError> {
		let status = self.status.as_u16();
		let status_text = self.status_text().to_owned();

		match status {
			0..=399 => Ok(self),
			400..=499 => Err(DeliveryError::Client { status, status_text, body: self.body }),
			_ => Err(DeliveryError::Server { status, status_text, body: self.body }),
		}
	}
}

#[derive(Debug, Clone)]
/// http client bound to one webhook url
pub struct WebhookClient {
	client: reqwest::Client,
	url: Url,
	metrics: &'static DeliveryMetrics,
}

impl WebhookClient {
	pub fn new(url: Url) -> Result<Self> {
		// a redirect would be a second request, the 3xx itself is the answer
		let client = reqwest::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.context("failed to build http client")?;
		let metrics = DeliveryMetrics::global().context("failed to register webhook metrics")?;

		Ok(Self { client, url, metrics })
	}

	/// Posts `message` as JSON and waits for the complete response.
	///
	/// # Arguments
	///
	/// * `message` - the rendered message
	pub async fn deliver(&self, message: &Message) -> Result<DeliveryResult, DeliveryError> {
		let result = self.post(message).await.and_then(DeliveryResult::classify);

		match &result {
			Ok(_) => self.metrics.record_delivery("delivered"),
			Err(err) => self.metrics.record_delivery(err.outcome()),
		}

		result
	}

	async fn post(&self, message: &Message) -> Result<DeliveryResult, DeliveryError> {
		let body = Bytes::from(serde_json::to_vec(message).map_err(DeliveryError::Serialize)?);

		tracing::debug!(url = %self.url, bytes = body.len(), "posting message to webhook");

		let _timer = self.metrics.duration().start_timer();

		let response = self
			.client
			.post(self.url.clone())
			.header(CONTENT_TYPE, "application/json")
			.header(CONTENT_LENGTH, body.len())
			.body(body)
			.send()
			.await
			.map_err(DeliveryError::Transport)?;

		let status = response.status();
		let body = response.text().await.map_err(DeliveryError::Transport)?;

		tracing::debug!(status = status.as_u16(), "webhook answered");

		Ok(DeliveryResult { status, body })
	}
}
