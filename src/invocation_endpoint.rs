use std::{
	net::{IpAddr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	body::Bytes,
	extract::{Extension, Json},
	http::StatusCode,
	routing::post,
	Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::{
	metrics::InvocationMetrics,
	notifier::{NotifyError, Notifier},
};

#[derive(Debug, Deserialize, Clone)]
pub struct InvocationEndpointSettings {
	pub bind_address: IpAddr,
	pub port: u16,
}

impl InvocationEndpointSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}
}

struct State {
	notifier: Notifier,
	metrics: &'static InvocationMetrics,
}

/// Turns the outcome of an invocation into the answer of the endpoint:
/// `null` on success, otherwise the error message as a JSON string.
fn completion(result: Result<(), NotifyError>) -> (StatusCode, Json<Value>) {
	match result {
		Ok(()) => (StatusCode::OK, Json(Value::Null)),
		Err(err) => {
			let status = match err {
				NotifyError::Parse(_) => StatusCode::BAD_REQUEST,
				NotifyError::HookUrlMissing | NotifyError::Delivery(_) => {
					StatusCode::INTERNAL_SERVER_ERROR
				}
			};

			(status, Json(Value::String(err.to_string())))
		}
	}
}

async fn invocation_handler(
	Extension(state): Extension<Arc<State>>,
	event: Bytes,
) -> (StatusCode, Json<Value>) {
	let State { notifier, metrics } = &*state;

	let result = notifier.handle(&event).await;

	if let Err(err) = &result {
		tracing::debug!("invocation failed: {:?}", err);
	}
	metrics.record_invocation(result.is_ok());

	completion(result)
}

/// Serves one invocation per `POST /` until the server crashes.
///
/// # Arguments
///
/// * `settings` - where to listen
///
/// * `notifier` - handles the events, shared by all invocations
pub async fn run_invocation_endpoint(
	settings: &InvocationEndpointSettings,
	notifier: Notifier,
) -> Result<()> {
	let metrics = InvocationMetrics::global().context("failed to register invocation metrics")?;
	let state = Arc::new(State { notifier, metrics });
	let addr = settings.to_socket_addr();

	let app = Router::new().route("/", post(invocation_handler)).layer(Extension(state));

	tracing::info!(%addr, "listening for alarm events");

	axum::Server::bind(&addr)
		.serve(app.into_make_service())
		.await
		.context("invocation endpoint crashed")?;

	Ok(())
}
