use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::error::Error;

/// Lifecycle of a search document. Stages only move forward; `Error` is a
/// terminal sink reachable from any stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStatus {
	New,
	HydeComplete,
	SearchComplete,
	RankAndReasoningComplete,
	Error,
}
impl SearchStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::New => "NEW",
			Self::HydeComplete => "HYDE_COMPLETE",
			Self::SearchComplete => "SEARCH_COMPLETE",
			Self::RankAndReasoningComplete => "RANK_AND_REASONING_COMPLETE",
			Self::Error => "ERROR",
		}
	}

	pub fn parse(raw: &str) -> Result<Self, Error> {
		match raw {
			"NEW" => Ok(Self::New),
			"HYDE_COMPLETE" => Ok(Self::HydeComplete),
			"SEARCH_COMPLETE" => Ok(Self::SearchComplete),
			"RANK_AND_REASONING_COMPLETE" => Ok(Self::RankAndReasoningComplete),
			"ERROR" => Ok(Self::Error),
			_ => Err(Error::InvalidArgument(format!("Unknown search status: {raw}."))),
		}
	}
}
impl std::fmt::Display for SearchStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Append-only audit trail entry kept inside the document itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchEvent {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	pub stage: String,
	pub message: String,
	pub timestamp: String,
}
impl SearchEvent {
	pub fn new(id: Option<String>, stage: &str, message: &str, at: OffsetDateTime) -> Self {
		Self { id, stage: stage.to_string(), message: message.to_string(), timestamp: iso8601(at) }
	}
}

/// Canonical shape of a freshly created search document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
	pub search_id: String,
	pub user_id: String,
	pub query: String,
	#[serde(default)]
	pub flags: Value,
	pub status: SearchStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub hyde_analysis: Option<Value>,
	#[serde(default)]
	pub metrics: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<Value>,
	#[serde(default)]
	pub events: Vec<SearchEvent>,
	pub created_at: String,
	pub updated_at: String,
}
impl SearchDocument {
	pub fn new(
		search_id: &str,
		user_id: &str,
		query: &str,
		flags: Value,
		now: OffsetDateTime,
	) -> Self {
		let timestamp = iso8601(now);

		Self {
			search_id: search_id.to_string(),
			user_id: user_id.to_string(),
			query: query.to_string(),
			flags,
			status: SearchStatus::New,
			hyde_analysis: None,
			metrics: Map::new(),
			error: None,
			events: vec![SearchEvent::new(None, "INIT", "Search initiated", now)],
			created_at: timestamp.clone(),
			updated_at: timestamp,
		}
	}
}

/// Reads the status string out of a raw document.
pub fn status_of(doc: &Value) -> Result<SearchStatus, Error> {
	let raw = doc
		.get("status")
		.and_then(Value::as_str)
		.ok_or_else(|| Error::InvalidArgument("Document is missing a status.".to_string()))?;

	SearchStatus::parse(raw)
}

/// Applies dotted-path assignments to a document. Each path replaces the
/// value at that location; intermediate objects are created on demand, and a
/// non-object intermediate is replaced rather than descended into.
pub fn apply_set_fields(doc: &mut Value, fields: &Map<String, Value>) {
	for (path, value) in fields {
		let mut cursor = &mut *doc;
		let mut parts = path.split('.').peekable();

		while let Some(part) = parts.next() {
			let taken = cursor;
			let object = match taken {
				Value::Object(object) => object,
				_ => break,
			};

			if parts.peek().is_none() {
				object.insert(part.to_string(), value.clone());
				break;
			}

			let slot = object.entry(part.to_string()).or_insert_with(|| Value::Object(Map::new()));

			if !slot.is_object() {
				*slot = Value::Object(Map::new());
			}

			cursor = slot;
		}
	}
}

/// Appends events to the document's `events` array, creating it if absent.
pub fn append_events(doc: &mut Value, events: &[SearchEvent]) -> Result<(), Error> {
	if events.is_empty() {
		return Ok(());
	}

	let Some(object) = doc.as_object_mut() else {
		return Err(Error::InvalidArgument("Document is not an object.".to_string()));
	};
	let slot = object.entry("events".to_string()).or_insert_with(|| Value::Array(Vec::new()));

	if !slot.is_array() {
		*slot = Value::Array(Vec::new());
	}
	if let Some(array) = slot.as_array_mut() {
		for event in events {
			array.push(serde_json::to_value(event)?);
		}
	}

	Ok(())
}

pub fn iso8601(at: OffsetDateTime) -> String {
	at.format(&Rfc3339).unwrap_or_else(|_| at.to_string())
}
