//! Renders alarms into slack incoming webhook messages.

use chrono::FixedOffset;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, AlarmState};

/// text shown above every attachment, `<!channel>` notifies the whole channel
pub const PRETEXT: &str = "<!channel> An AWS error has occurred!";

/// format of the `DateTime` field
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// state change times are shown in UTC+9
#[allow(clippy::expect_used)]
static DISPLAY_OFFSET: Lazy<FixedOffset> =
	Lazy::new(|| FixedOffset::east_opt(9 * 3600).expect("UTC+9 is a valid offset"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// attachment color tags understood by slack
pub enum Color {
	Good,
	Danger,
}

impl From<&AlarmState> for Color {
	fn from(state: &AlarmState) -> Self {
		match state {
			AlarmState::Ok => Color::Good,
			_ => Color::Danger,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// labeled value inside an attachment
pub struct Field {
	pub title: String,
	pub value: String,
	/// slack places short fields side by side
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub short: Option<bool>,
}

impl Field {
	fn short(title: &str, value: impl Into<String>) -> Self {
		Self { title: title.to_owned(), value: value.into(), short: Some(true) }
	}

	fn long(title: &str, value: impl Into<String>) -> Self {
		Self { title: title.to_owned(), value: value.into(), short: None }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
	pub pretext: String,
	pub color: Color,
	pub title: String,
	pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// payload posted to the webhook
pub struct Message {
	pub channel: String,
	pub attachments: Vec<Attachment>,
}

impl Message {
	/// Renders an alarm into a message with a single attachment.
	///
	/// # Arguments
	///
	/// * `alarm` - the alarm to render
	///
	/// * `channel` - slack channel the message is posted to
	pub fn from_alarm(alarm: &Alarm, channel: &str) -> Self {
		let date_time =
			alarm.state_change_time.with_timezone(&*DISPLAY_OFFSET).format(DATE_TIME_FORMAT);

		let attachment = Attachment {
			pretext: PRETEXT.to_owned(),
			color: Color::from(&alarm.new_state),
			title: alarm.name.clone(),
			fields: vec![
				Field::short("CurrentState", alarm.new_state.as_str()),
				Field::short("OldState", alarm.old_state.as_str()),
				Field::long("Reason", alarm.reason.as_str()),
				Field::long("DateTime", date_time.to_string()),
			],
		};

		Self { channel: channel.to_owned(), attachments: vec![attachment] }
	}
}
