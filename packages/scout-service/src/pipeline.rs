//! The idempotent analysis pipeline: validate the request, lazily create the
//! search document, run analysis, and record the result behind a status
//! guard so replays never double-apply.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use scout_storage::models::{self, SearchDocument, SearchEvent, SearchStatus, iso8601};

use crate::ScoutService;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
	#[serde(default)]
	pub search_id: Option<String>,
	#[serde(default, alias = "user_id")]
	pub user_id: Value,
	#[serde(default)]
	pub query: Option<String>,
	#[serde(default)]
	pub flags: Value,
}

#[derive(Clone, Debug, Serialize)]
pub struct PipelineResponse {
	#[serde(rename = "statusCode")]
	pub status_code: u16,
	#[serde(rename = "searchId", skip_serializing_if = "Option::is_none")]
	pub search_id: Option<String>,
	pub success: bool,
	pub processing_time: f64,
	pub timestamp: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl PipelineResponse {
	fn ok(search_id: &str, started: Instant, note: Option<String>) -> Self {
		Self {
			status_code: 200,
			search_id: Some(search_id.to_string()),
			success: true,
			processing_time: started.elapsed().as_secs_f64(),
			timestamp: iso8601(OffsetDateTime::now_utc()),
			note,
			error: None,
		}
	}

	fn failed(status_code: u16, search_id: Option<&str>, started: Instant, error: String) -> Self {
		Self {
			status_code,
			search_id: search_id.map(str::to_string),
			success: false,
			processing_time: started.elapsed().as_secs_f64(),
			timestamp: iso8601(OffsetDateTime::now_utc()),
			note: None,
			error: Some(error),
		}
	}
}

/// Accepts a plain string, a `{"$oid": "..."}` wrapper, or a number; trims
/// and rejects anything empty or otherwise shaped.
pub fn normalize_user_id(raw: &Value) -> Option<String> {
	let raw = match raw {
		Value::Object(map) => map.get("$oid")?,
		other => other,
	};

	match raw {
		Value::String(s) => {
			let trimmed = s.trim();

			(!trimmed.is_empty()).then(|| trimmed.to_string())
		},
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

impl ScoutService {
	/// Runs the full pipeline for one request and reports the outcome as an
	/// HTTP-shaped response. Never returns an `Err`; failures are encoded in
	/// the status code.
	pub async fn run(&self, request: PipelineRequest) -> PipelineResponse {
		let started = Instant::now();
		let user_id = normalize_user_id(&request.user_id);
		let (Some(search_id), Some(user_id), Some(query)) = (
			request.search_id.as_deref().map(str::trim).filter(|s| !s.is_empty()),
			user_id,
			request.query.as_deref().map(str::trim).filter(|s| !s.is_empty()),
		) else {
			return PipelineResponse::failed(
				400,
				None,
				started,
				"Missing required fields: searchId, userId, and query".to_string(),
			);
		};

		tracing::info!(search_id, query, "Processing analysis request.");

		if let Err(response) = self.ensure_document(search_id, &user_id, query, &request, started).await
		{
			return *response;
		}

		let opts = self.analysis_options(&request.flags);
		let analysis_started = Instant::now();
		let breakdown = self.analyze_query(query, &opts).await;
		let analysis_secs = analysis_started.elapsed().as_secs_f64();

		tracing::info!(seconds = analysis_secs, "Analysis completed.");

		let now = OffsetDateTime::now_utc();
		let mut set_fields = Map::new();

		set_fields.insert(
			"hydeAnalysis".to_string(),
			serde_json::json!({
				"queryBreakdown": breakdown.query_breakdown,
				"response": breakdown.response,
				"processingTime": analysis_secs,
			}),
		);
		set_fields
			.insert("status".to_string(), Value::String(SearchStatus::HydeComplete.as_str().to_string()));
		set_fields.insert("metrics.hydeMs".to_string(), serde_json::json!(analysis_secs * 1_000.0));
		set_fields.insert("updatedAt".to_string(), Value::String(iso8601(now)));

		let events = [SearchEvent::new(
			Some(format!("HYDE:{search_id}")),
			"HYDE",
			"HyDE analysis completed",
			now,
		)];
		let update = self
			.store
			.update(
				search_id,
				&set_fields,
				&events,
				Some(&[SearchStatus::New, SearchStatus::HydeComplete]),
			)
			.await;

		match update {
			Ok(_) => PipelineResponse::ok(search_id, started, None),
			Err(err) if err.is_conflict() => self.resolve_conflict(search_id, started, err).await,
			Err(err) => {
				tracing::error!(search_id, error = %err, "Failed to record analysis result.");
				self.mark_error(search_id, &err.to_string()).await;

				PipelineResponse::failed(
					500,
					Some(search_id),
					started,
					format!("Internal server error: {err}"),
				)
			},
		}
	}

	/// Loads the search document, creating a fresh `NEW` one when absent.
	/// A concurrent creation racing us is fine; the status guard on the
	/// later update keeps the result single-writer.
	async fn ensure_document(
		&self,
		search_id: &str,
		user_id: &str,
		query: &str,
		request: &PipelineRequest,
		started: Instant,
	) -> Result<(), Box<PipelineResponse>> {
		match self.store.get(search_id).await {
			Ok(Some(_)) => Ok(()),
			Ok(None) => {
				tracing::info!(search_id, "Creating initial search document.");

				let flags = if request.flags.is_null() {
					serde_json::json!({})
				} else {
					request.flags.clone()
				};
				let doc = SearchDocument::new(
					search_id,
					user_id,
					query,
					flags,
					OffsetDateTime::now_utc(),
				);
				let doc = serde_json::to_value(&doc).unwrap_or_default();

				match self.store.create(&doc).await {
					Ok(()) => Ok(()),
					Err(err) if err.is_conflict() => Ok(()),
					Err(err) => Err(Box::new(PipelineResponse::failed(
						502,
						Some(search_id),
						started,
						format!("Failed to create search document: {err}"),
					))),
				}
			},
			Err(err) => Err(Box::new(PipelineResponse::failed(
				502,
				Some(search_id),
				started,
				format!("Failed to load search document: {err}"),
			))),
		}
	}

	/// A guarded-update conflict is only fatal when the document is not
	/// already complete; a replay of finished work reports success.
	async fn resolve_conflict(
		&self,
		search_id: &str,
		started: Instant,
		err: scout_storage::Error,
	) -> PipelineResponse {
		let current = self.store.get(search_id).await;

		if let Ok(Some(doc)) = current
			&& models::status_of(&doc).is_ok_and(|status| status == SearchStatus::HydeComplete)
		{
			tracing::info!(search_id, "Search document already processed, replay is a no-op.");

			return PipelineResponse::ok(
				search_id,
				started,
				Some("Already processed (idempotent)".to_string()),
			);
		}

		PipelineResponse::failed(
			409,
			Some(search_id),
			started,
			format!("Failed to update search document: {err}"),
		)
	}

	/// Best-effort transition to the terminal `ERROR` status. A failure here
	/// is logged and dropped; the caller's error response already carries
	/// the diagnosis.
	async fn mark_error(&self, search_id: &str, message: &str) {
		let now = OffsetDateTime::now_utc();
		let mut set_fields = Map::new();

		set_fields.insert(
			"status".to_string(),
			Value::String(SearchStatus::Error.as_str().to_string()),
		);
		set_fields.insert(
			"error".to_string(),
			serde_json::json!({
				"stage": "HYDE",
				"message": message,
				"occurredAt": iso8601(now),
			}),
		);
		set_fields.insert("updatedAt".to_string(), Value::String(iso8601(now)));

		let events = [SearchEvent::new(None, "HYDE", &format!("Error: {message}"), now)];

		if let Err(err) = self.store.update(search_id, &set_fields, &events, None).await {
			tracing::error!(search_id, error = %err, "Failed to record error state.");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_ids_unwrap_oid_objects() {
		assert_eq!(
			normalize_user_id(&serde_json::json!({ "$oid": "64fe0a" })),
			Some("64fe0a".to_string())
		);
		assert_eq!(normalize_user_id(&serde_json::json!(" u-1 ")), Some("u-1".to_string()));
		assert_eq!(normalize_user_id(&serde_json::json!(42)), Some("42".to_string()));
		assert_eq!(normalize_user_id(&serde_json::json!("   ")), None);
		assert_eq!(normalize_user_id(&Value::Null), None);
		assert_eq!(normalize_user_id(&serde_json::json!({ "oid": "x" })), None);
	}

	#[test]
	fn requests_accept_snake_case_user_id() {
		let request: PipelineRequest = serde_json::from_value(serde_json::json!({
			"searchId": "s-1",
			"user_id": "u-1",
			"query": "rust engineers",
		}))
		.expect("request should deserialize");

		assert_eq!(normalize_user_id(&request.user_id), Some("u-1".to_string()));
		assert_eq!(request.search_id.as_deref(), Some("s-1"));
	}
}
