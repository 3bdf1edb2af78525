//! cloudwatch alarm relay that forwards sns notifications into a slack
//! incoming webhook
//!
//! Every `POST /` to the invocation endpoint carries one sns event. The alarm
//! in its first record is rendered into a slack attachment and posted to the
//! configured webhook exactly once.

use anyhow::{Context, Result};
use notifier::Notifier;
use settings::Settings;

mod alarm;
mod invocation_endpoint;
mod log;
mod message;
mod metrics;
mod notifier;
mod settings;
mod telemetry_endpoint;
mod webhook;

/// exit the complete program if one thread panics
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		default_panic(info);
		std::process::exit(1);
	}));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	setup_panic_handler();

	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	let notifier = Notifier::new(&settings.webhook).context("failed to construct notifier")?;

	let telemetry_settings = settings.telemetry_endpoint.clone();
	tokio::spawn(async move {
		#[allow(clippy::expect_used)]
		telemetry_endpoint::run_telemetry_endpoint(&telemetry_settings)
			.await
			.expect("telemetry endpoint failed to start or crashed");
	});

	invocation_endpoint::run_invocation_endpoint(&settings.invocation_endpoint, notifier).await
}
