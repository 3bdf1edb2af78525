//! Handles a single alarm event: parse, render, deliver.

use anyhow::Result;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::{
	alarm::{Alarm, AlarmParseError},
	message::Message,
	webhook::{status_line, DeliveryError, WebhookClient},
};

#[derive(Debug, Deserialize, Clone)]
/// where rendered alarms are posted to
pub struct WebhookSettings {
	/// slack incoming webhook, invocations fail while this is unset
	#[serde(default)]
	pub url: Option<Url>,
	/// channel the messages are posted to
	pub channel: String,
}

/// Reasons an invocation fails. Client side delivery errors are not among
/// them, those are only logged.
#[derive(Error, Debug)]
pub enum NotifyError {
	#[error("Hook URL has not been set.")]
	HookUrlMissing,
	#[error(transparent)]
	Parse(#[from] AlarmParseError),
	#[error(transparent)]
	Delivery(#[from] DeliveryError),
}

#[derive(Debug, Clone)]
pub struct Notifier {
	channel: String,
	client: Option<WebhookClient>,
}

impl Notifier {
	pub fn new(settings: &WebhookSettings) -> Result<Self> {
		let client = match &settings.url {
			Some(url) => Some(WebhookClient::new(url.clone())?),
			None => {
				tracing::warn!("no webhook url configured, every alarm will be rejected");
				None
			}
		};

		Ok(Self { channel: settings.channel.clone(), client })
	}

	/// Forwards the alarm contained in `event` to the webhook.
	///
	/// Returns once the webhook answered. An answer with a 4xx status is
	/// logged but still counts as handled.
	///
	/// # Arguments
	///
	/// * `event` - raw sns event as received by the invocation endpoint
	pub async fn handle(&self, event: &[u8]) -> Result<(), NotifyError> {
		let client = self.client.as_ref().ok_or(NotifyError::HookUrlMissing)?;

		let event_text = String::from_utf8_lossy(event);
		let event_text = event_text.trim();
		tracing::info!(event = event_text, "received event");

		let alarm = Alarm::from_event(event)?;
		let message = Message::from_alarm(&alarm, &self.channel);

		match client.deliver(&message).await {
			Ok(result) => {
				tracing::info!(
					alarm = %alarm.name,
					state = %alarm.new_state,
					status = result.status.as_u16(),
					"alarm delivered"
				);
				Ok(())
			}
			Err(DeliveryError::Client { status, status_text, body }) => {
				tracing::error!(
					%body,
					event = event_text,
					"Error posting message to webhook: {}",
					status_line(&status, &status_text)
				);
				Ok(())
			}
			Err(err) => {
				tracing::error!(error = %err, event = event_text, "failed to deliver alarm");
				Err(err.into())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{
		io,
		sync::{Arc, Mutex},
	};

	use httptest::{all_of, matchers::*, responders::*, Expectation, Server};
	use serde_json::{json, Value};
	use tracing_subscriber::fmt::MakeWriter;

	use super::*;

	/// collects everything the fmt subscriber writes
	#[derive(Clone, Default)]
	struct LogBuffer(Arc<Mutex<Vec<u8>>>);

	impl LogBuffer {
		fn contents(&self) -> String {
			String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
		}
	}

	impl io::Write for LogBuffer {
		fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
			self.0.lock().unwrap().extend_from_slice(buf);
			Ok(buf.len())
		}

		fn flush(&mut self) -> io::Result<()> {
			Ok(())
		}
	}

	impl<'a> MakeWriter<'a> for LogBuffer {
		type Writer = LogBuffer;

		fn make_writer(&'a self) -> Self::Writer {
			self.clone()
		}
	}

	fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
		let logs = LogBuffer::default();
		let subscriber =
			tracing_subscriber::fmt().with_writer(logs.clone()).with_ansi(false).finish();

		(logs, tracing::subscriber::set_default(subscriber))
	}

	fn event() -> Vec<u8> {
		let alarm = json!({
			"AlarmName": "api-5xx",
			"NewStateValue": "ALARM",
			"OldStateValue": "OK",
			"StateChangeTime": "2022-08-15T14:59:30.000+0000",
			"NewStateReason": "Threshold Crossed: 2 datapoints were greater than the threshold (10.0).",
		});

		json!({ "Records": [{ "Sns": { "Message": alarm.to_string() } }] }).to_string().into_bytes()
	}

	fn raw(event: Value) -> Vec<u8> {
		event.to_string().into_bytes()
	}

	fn notifier(server: &Server) -> Notifier {
		Notifier::new(&WebhookSettings {
			url: Some(Url::parse(&server.url_str("/hook")).unwrap()),
			channel: "#alerts".to_owned(),
		})
		.unwrap()
	}

	fn webhook_answers(server: &Server, status: u16) {
		server.expect(
			Expectation::matching(request::method_path("POST", "/hook"))
				.respond_with(status_code(status)),
		);
	}

	#[tokio::test]
	async fn missing_hook_url_fails_without_io() {
		// no expectations: any request would fail the test when the server is dropped
		let _server = Server::run();
		let notifier = Notifier::new(&WebhookSettings { url: None, channel: "#alerts".to_owned() })
			.unwrap();

		let err = notifier.handle(&event()).await.unwrap_err();
		assert!(matches!(err, NotifyError::HookUrlMissing));
		assert_eq!(err.to_string(), "Hook URL has not been set.");

		// the guard runs before the event is looked at
		let err = notifier.handle(b"garbage").await.unwrap_err();
		assert!(matches!(err, NotifyError::HookUrlMissing));
	}

	#[tokio::test]
	async fn delivered_alarm_succeeds() {
		let server = Server::run();
		server.expect(
			Expectation::matching(all_of![
				request::method_path("POST", "/hook"),
				request::body(json_decoded(eq(json!({
					"channel": "#alerts",
					"attachments": [{
						"pretext": "<!channel> An AWS error has occurred!",
						"color": "danger",
						"title": "api-5xx",
						"fields": [
							{ "title": "CurrentState", "value": "ALARM", "short": true },
							{ "title": "OldState", "value": "OK", "short": true },
							{
								"title": "Reason",
								"value": "Threshold Crossed: 2 datapoints were greater than the threshold (10.0)."
							},
							{ "title": "DateTime", "value": "2022-08-15 23:59:30" },
						],
					}],
				})))),
			])
			.respond_with(status_code(200)),
		);
		let (logs, _guard) = capture_logs();

		notifier(&server).handle(&event()).await.unwrap();

		assert!(!logs.contents().contains("ERROR"));
	}

	#[tokio::test]
	async fn client_error_is_logged_but_succeeds() {
		let server = Server::run();
		webhook_answers(&server, 404);
		let (logs, _guard) = capture_logs();

		notifier(&server).handle(&event()).await.unwrap();

		let logs = logs.contents();
		assert!(logs.contains("ERROR"));
		assert!(logs.contains("404 - Not Found"));
		assert!(logs.contains("api-5xx"));
	}

	#[tokio::test]
	async fn server_error_fails() {
		let server = Server::run();
		webhook_answers(&server, 500);
		let (logs, _guard) = capture_logs();

		let err = notifier(&server).handle(&event()).await.unwrap_err();

		assert!(matches!(err, NotifyError::Delivery(DeliveryError::Server { status: 500, .. })));
		assert_eq!(
			err.to_string(),
			"Server error when processing message: 500 - Internal Server Error"
		);
		assert!(logs.contents().contains("ERROR"));
	}

	#[tokio::test]
	async fn malformed_event_fails_before_delivery() {
		let server = Server::run();

		let err = notifier(&server).handle(&raw(json!({ "Records": [] }))).await.unwrap_err();
		assert!(matches!(err, NotifyError::Parse(AlarmParseError::NoRecords)));

		let err = notifier(&server)
			.handle(&raw(json!({ "Records": [{ "Sns": { "Message": "{" } }] })))
			.await
			.unwrap_err();
		assert!(matches!(err, NotifyError::Parse(AlarmParseError::InvalidMessage(_))));
	}
}
