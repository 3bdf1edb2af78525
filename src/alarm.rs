//! data structures for deserializing incoming alarm notifications
//!
//! An invocation receives an SNS event whose first record carries the
//! cloudwatch alarm as a JSON encoded string in `Sns.Message`.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Error occuring while turning a raw event into an [Alarm]
#[derive(Error, Debug)]
pub enum AlarmParseError {
	/// the event is not JSON shaped like `{ Records: [ { Sns: { Message } } ] }`
	#[error("event is not an sns notification: {0}")]
	InvalidEvent(#[source] serde_json::Error),
	/// the event contains no notification record
	#[error("event contains no records")]
	NoRecords,
	/// the sns message is not a cloudwatch alarm
	#[error("sns message is not a cloudwatch alarm: {0}")]
	InvalidMessage(#[source] serde_json::Error),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
/// the event handed to a single invocation
pub struct SnsEvent {
	pub records: Vec<SnsRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SnsRecord {
	#[serde(rename = "Sns")]
	pub sns: SnsEnvelope,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
/// sns notification envelope, everything except `Message` is only used for
/// diagnostics
pub struct SnsEnvelope {
	#[serde(default)]
	pub message_id: Option<String>,
	#[serde(default)]
	pub topic_arn: Option<String>,
	#[serde(default)]
	pub subject: Option<String>,
	#[serde(default)]
	pub timestamp: Option<String>,
	/// JSON encoded cloudwatch alarm
	pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
/// state of a cloudwatch alarm
pub enum AlarmState {
	Ok,
	Alarm,
	InsufficientData,
	/// any state cloudwatch may add in the future, kept verbatim
	Other(String),
}

impl AlarmState {
	pub fn as_str(&self) -> &str {
		match self {
			AlarmState::Ok => "OK",
			AlarmState::Alarm => "ALARM",
			AlarmState::InsufficientData => "INSUFFICIENT_DATA",
			AlarmState::Other(state) => state.as_str(),
		}
	}
}

impl From<String> for AlarmState {
	fn from(state: String) -> Self {
		match state.as_str() {
			"OK" => AlarmState::Ok,
			"ALARM" => AlarmState::Alarm,
			"INSUFFICIENT_DATA" => AlarmState::InsufficientData,
			_ => AlarmState::Other(state),
		}
	}
}

impl fmt::Display for AlarmState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
/// a cloudwatch alarm state change
pub struct Alarm {
	#[serde(rename = "AlarmName")]
	pub name: String,
	#[serde(rename = "NewStateValue")]
	pub new_state: AlarmState,
	#[serde(rename = "OldStateValue")]
	pub old_state: AlarmState,
	#[serde(rename = "StateChangeTime", deserialize_with = "deserialize_state_change_time")]
	pub state_change_time: DateTime<Utc>,
	#[serde(rename = "NewStateReason")]
	pub reason: String,
}

/// cloudwatch writes offsets without a colon (`+0000`), which RFC 3339 does
/// not allow
const CLOUDWATCH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

fn parse_state_change_time(time: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(time)
		.or_else(|_| DateTime::parse_from_str(time, CLOUDWATCH_TIME_FORMAT))
		.map(|time| time.with_timezone(&Utc))
		.ok()
}

fn deserialize_state_change_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
	D: Deserializer<'de>,
{
	let time = String::deserialize(deserializer)?;

	parse_state_change_time(&time).ok_or_else(|| {
		serde::de::Error::invalid_value(
			serde::de::Unexpected::Str(&time),
			&"an ISO-8601 timestamp like 2019-11-13T04:05:21.052+0000",
		)
	})
}

impl Alarm {
	/// Extracts the alarm from the first record of an invocation event.
	/// Further records are ignored.
	///
	/// # Arguments
	///
	/// * `event` - the raw event the invocation received
	pub fn from_event(event: &[u8]) -> Result<Self, AlarmParseError> {
		let event: SnsEvent =
			serde_json::from_slice(event).map_err(AlarmParseError::InvalidEvent)?;

		if event.records.len() > 1 {
			tracing::debug!(
				records = event.records.len(),
				"event contains more than one record, only the first one is processed"
			);
		}

		let record = event.records.into_iter().next().ok_or(AlarmParseError::NoRecords)?;

		tracing::debug!(
			message_id = record.sns.message_id.as_deref().unwrap_or_default(),
			topic_arn = record.sns.topic_arn.as_deref().unwrap_or_default(),
			subject = record.sns.subject.as_deref().unwrap_or_default(),
			published = record.sns.timestamp.as_deref().unwrap_or_default(),
			"extracting alarm from sns notification"
		);

		serde_json::from_str(&record.sns.message).map_err(AlarmParseError::InvalidMessage)
	}
}
