//! Extraction of well-formed results from free-form LLM text.
//!
//! Completion output is adversarial: fenced, truncated, occasionally
//! malformed. Every parse path here degrades to a well-defined empty or
//! partial value instead of propagating an error, and recovery is reported
//! as an observable outcome rather than silently swallowed.

use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;

use crate::breakdown::QueryBreakdown;

static LOCATION_BLOCK: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<location>\s*(.*?)</location>").expect("static pattern"));
static LOCATION_NAME: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<name>(.*?)</name>").expect("static pattern"));
static LOCATION_ALT_NAME: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<alt_name>(.*?)</alt_name>").expect("static pattern"));
static KEYWORDS_BLOCK: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<keywords>\s*(.*?)</keywords>").expect("static pattern"));
static KEYWORD_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?is)<keyword>\s*<name>(.*?)</name>\s*<description>(.*?)</description>\s*</keyword>")
		.expect("static pattern")
});

/// Result of a structured-output parse. `Recovered` means the caller gets a
/// usable (possibly empty) value, with the diagnostic kept alongside so that
/// "I recovered" is testable instead of an exception caught and dropped.
#[derive(Clone, Debug)]
pub enum ParseOutcome<T> {
	Parsed(T),
	Recovered { value: T, reason: String },
}
impl<T> ParseOutcome<T> {
	pub fn recovered(value: T, reason: impl Into<String>) -> Self {
		Self::Recovered { value, reason: reason.into() }
	}

	pub fn value(&self) -> &T {
		match self {
			Self::Parsed(value) | Self::Recovered { value, .. } => value,
		}
	}

	pub fn into_value(self) -> T {
		match self {
			Self::Parsed(value) | Self::Recovered { value, .. } => value,
		}
	}

	pub fn is_recovered(&self) -> bool {
		matches!(self, Self::Recovered { .. })
	}

	pub fn reason(&self) -> Option<&str> {
		match self {
			Self::Parsed(_) => None,
			Self::Recovered { reason, .. } => Some(reason.as_str()),
		}
	}
}

/// One location with its generated alternative names, in response order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationAltNames {
	pub name: String,
	pub alt_names: Vec<String>,
}

/// Strips a single leading markdown fence (```xml, ```json or bare ```) and
/// a single trailing fence, then trims.
pub fn strip_fences(raw: &str) -> &str {
	let text = raw.trim();
	let text = text
		.strip_prefix("```xml")
		.or_else(|| text.strip_prefix("```json"))
		.or_else(|| text.strip_prefix("```"))
		.unwrap_or(text);
	let text = text.strip_suffix("```").unwrap_or(text);

	text.trim()
}

/// Extracts a `QueryBreakdown` from raw completion text: locates the first
/// `{` and the last `}`, slices between them, and deserializes. Any failure
/// recovers to the complete, validly-shaped empty breakdown.
pub fn parse_breakdown(raw: &str) -> ParseOutcome<QueryBreakdown> {
	let text = strip_fences(raw);
	let Some(start) = text.find('{') else {
		return ParseOutcome::recovered(QueryBreakdown::empty(), "No JSON object in response.");
	};
	let Some(end) = text.rfind('}') else {
		return ParseOutcome::recovered(QueryBreakdown::empty(), "Unterminated JSON object.");
	};
	if end < start {
		return ParseOutcome::recovered(QueryBreakdown::empty(), "Unterminated JSON object.");
	}

	match serde_json::from_str::<QueryBreakdown>(&text[start..=end]) {
		Ok(breakdown) => ParseOutcome::Parsed(breakdown),
		Err(err) => ParseOutcome::recovered(
			QueryBreakdown::empty(),
			format!("Breakdown JSON did not parse: {err}."),
		),
	}
}

/// Parses the location alt-names response: the `<output>` span, then every
/// `<location>` child's `<name>` and `<alt_name>` entries. Missing or
/// unterminated `<output>` recovers to an empty list.
pub fn parse_location_output(raw: &str) -> ParseOutcome<Vec<LocationAltNames>> {
	let text = strip_fences(raw);
	let Some(start) = text.find("<output>") else {
		return ParseOutcome::recovered(Vec::new(), "No <output> tag in response.");
	};
	let Some(end) = text[start..].find("</output>") else {
		return ParseOutcome::recovered(Vec::new(), "Unterminated <output> tag.");
	};
	let span = &text[start..start + end];
	let mut results = Vec::new();

	for block in LOCATION_BLOCK.captures_iter(span) {
		let body = &block[1];
		let Some(name) = LOCATION_NAME.captures(body).map(|cap| cap[1].trim().to_string())
		else {
			continue;
		};

		if name.is_empty() {
			continue;
		}

		let alt_names = LOCATION_ALT_NAME
			.captures_iter(body)
			.map(|cap| cap[1].trim().to_string())
			.filter(|alt| !alt.is_empty())
			.collect();

		results.push(LocationAltNames { name, alt_names });
	}

	ParseOutcome::Parsed(results)
}

/// Parses the keyword-description response into a name→description map.
///
/// The strict pass requires the documented `<keywords>` wrapper; when that
/// is absent or empty the whole text is scanned with a lenient entry
/// pattern, and a non-empty result is reported as recovered.
pub fn parse_keyword_output(raw: &str) -> ParseOutcome<HashMap<String, String>> {
	let text = strip_fences(raw);

	if let Some(block) = KEYWORDS_BLOCK.captures(text) {
		let entries = collect_keyword_entries(&block[1]);

		if !entries.is_empty() {
			return ParseOutcome::Parsed(entries);
		}
	}

	let entries = collect_keyword_entries(text);

	if entries.is_empty() {
		ParseOutcome::recovered(entries, "No keyword entries in response.")
	} else {
		ParseOutcome::recovered(entries, "Keyword entries matched outside a <keywords> block.")
	}
}

fn collect_keyword_entries(text: &str) -> HashMap<String, String> {
	let mut entries = HashMap::new();

	for cap in KEYWORD_ENTRY.captures_iter(text) {
		let name = cap[1].trim().to_string();

		if name.is_empty() {
			continue;
		}

		entries.insert(name, cap[2].trim().to_string());
	}

	entries
}
