use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::{
	invocation_endpoint::InvocationEndpointSettings, log::LogSettings, notifier::WebhookSettings,
	telemetry_endpoint::TelemetryEndpointSettings,
};

const DEFAULT_CONFIG_PATH: &str = "./config.yaml";

/// prefix of environment variables overriding the config file, e.g.
/// `KLAXON_WEBHOOK__URL`
const ENV_PREFIX: &str = "KLAXON";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub webhook: WebhookSettings,
	pub log: LogSettings,
	pub invocation_endpoint: InvocationEndpointSettings,
	pub telemetry_endpoint: TelemetryEndpointSettings,
}

impl Settings {
	/// Reads command line arguments, the config file and the environment.
	/// Called once at startup, the result is handed to everything that needs
	/// configuration.
	pub fn load() -> Result<Self> {
		let opts = Command::new(clap::crate_name!())
			.version(clap::crate_version!())
			.about(clap::crate_description!())
			.author(clap::crate_authors!())
			.args(&[
				Arg::new("config")
					.help("path of config file")
					.takes_value(true)
					.short('c')
					.long("config")
					.default_value(DEFAULT_CONFIG_PATH),
				Arg::new("level")
					.help("log level")
					.possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
					.ignore_case(true)
					.takes_value(true)
					.long("log"),
			])
			.get_matches();

		let config_path = opts.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);

		// the default path may be absent, a path given explicitly may not
		let config_file = File::with_name(config_path).required(opts.occurrences_of("config") > 0);

		let builder = Config::builder()
			.add_source(config_file)
			.add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"));

		Self::from_builder(builder, opts.value_of("level"))
	}

	fn from_builder(builder: ConfigBuilder<DefaultState>, level: Option<&str>) -> Result<Self> {
		let conf = builder
			.set_default("log.level", "info")?
			.set_default("invocation_endpoint.bind_address", "0.0.0.0")?
			.set_default("invocation_endpoint.port", 8080)?
			.set_default("telemetry_endpoint.bind_address", "127.0.0.1")?
			.set_default("telemetry_endpoint.port", 9090)?
			.build()
			.context("can't load config")?;

		let mut settings: Settings = conf.try_deserialize().context("can't load config")?;

		if let Some(level) = level {
			settings.log.level = level.to_string();
		}

		Ok(settings)
	}
}

#[cfg(test)]
mod tests {
	use std::net::{IpAddr, Ipv4Addr};

	use config::FileFormat;

	use super::*;

	fn from_yaml(yaml: &str, level: Option<&str>) -> Result<Settings> {
		Settings::from_builder(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml)), level)
	}

	#[test]
	fn applies_defaults() {
		let settings = from_yaml(
			"
webhook:
  url: https://hooks.slack.com/services/T000/B000/XXXX
  channel: '#alerts'
",
			None,
		)
		.unwrap();

		assert_eq!(
			settings.webhook.url.unwrap().as_str(),
			"https://hooks.slack.com/services/T000/B000/XXXX"
		);
		assert_eq!(settings.webhook.channel, "#alerts");
		assert_eq!(settings.log.level, "info");
		assert_eq!(settings.invocation_endpoint.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
		assert_eq!(settings.invocation_endpoint.port, 8080);
		assert_eq!(settings.telemetry_endpoint.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
		assert_eq!(settings.telemetry_endpoint.port, 9090);
	}

	#[test]
	fn hook_url_is_optional() {
		let settings = from_yaml("webhook: { channel: '#alerts' }", None).unwrap();

		assert!(settings.webhook.url.is_none());
	}

	#[test]
	fn channel_is_required() {
		assert!(from_yaml("webhook: { url: 'https://example.com/hook' }", None).is_err());
	}

	#[test]
	fn invalid_hook_url_is_rejected() {
		assert!(from_yaml("webhook: { url: 'not a url', channel: '#alerts' }", None).is_err());
	}

	#[test]
	fn command_line_overrides_log_level() {
		let settings = from_yaml(
			"
webhook:
  channel: '#alerts'
log:
  level: warn
invocation_endpoint:
  port: 3000
",
			Some("Debug"),
		)
		.unwrap();

		assert_eq!(settings.log.level, "Debug");
		assert_eq!(settings.invocation_endpoint.port, 3000);
	}
}
