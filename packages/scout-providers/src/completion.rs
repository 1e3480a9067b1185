use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use scout_config::LlmProviderConfig;

/// Per-call options layered over a catalog entry. The catalog owns model
/// names and budgets; callers only tune the request shape.
#[derive(Clone, Debug, Default)]
pub struct CompletionOptions {
	/// Retry the request against the catalog entry's fallback model when the
	/// primary model exhausts its attempt budget.
	pub fallback: bool,
	pub temperature: Option<f32>,
	pub stop: Option<Vec<String>>,
	pub response_format: Option<Value>,
}

/// Requests a chat completion and returns the first choice's text content.
///
/// The primary model gets `cfg.max_attempts` tries; if all fail and
/// `opts.fallback` is set, the fallback model gets one try before the
/// original error is surfaced.
pub async fn complete(
	cfg: &LlmProviderConfig,
	messages: &[Value],
	opts: &CompletionOptions,
) -> Result<String> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let mut last_err = None;

	for attempt in 1..=cfg.max_attempts {
		match request_model(&client, &url, cfg, &cfg.model, messages, opts).await {
			Ok(content) => return Ok(content),
			Err(err) => {
				tracing::warn!(
					model = %cfg.model,
					attempt,
					error = %err,
					"Completion attempt failed.",
				);

				last_err = Some(err);
			},
		}
	}

	if opts.fallback && let Some(fallback_model) = cfg.fallback_model.as_deref() {
		tracing::warn!(model = %fallback_model, "Retrying completion with fallback model.");

		match request_model(&client, &url, cfg, fallback_model, messages, opts).await {
			Ok(content) => return Ok(content),
			Err(err) => {
				tracing::error!(model = %fallback_model, error = %err, "Fallback model failed.");
			},
		}
	}

	Err(last_err.unwrap_or_else(|| eyre::eyre!("Completion failed without an attempt.")))
}

async fn request_model(
	client: &Client,
	url: &str,
	cfg: &LlmProviderConfig,
	model: &str,
	messages: &[Value],
	opts: &CompletionOptions,
) -> Result<String> {
	let body = build_request_body(cfg, model, messages, opts);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_content(json)
}

fn build_request_body(
	cfg: &LlmProviderConfig,
	model: &str,
	messages: &[Value],
	opts: &CompletionOptions,
) -> Value {
	let mut body = serde_json::json!({
		"model": model,
		"messages": messages,
	});
	let Some(object) = body.as_object_mut() else {
		return body;
	};

	if let Some(max_tokens) = cfg.max_tokens {
		object.insert("max_tokens".to_string(), max_tokens.into());
	}
	if let Some(temperature) = opts.temperature.or(cfg.temperature) {
		object.insert("temperature".to_string(), serde_json::json!(temperature));
	}
	if let Some(stop) = opts.stop.as_ref() {
		object.insert("stop".to_string(), serde_json::json!(stop));
	}
	if let Some(response_format) = opts.response_format.as_ref() {
		object.insert("response_format".to_string(), response_format.clone());
	}

	body
}

fn parse_completion_content(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(|content| content.to_string())
		.ok_or_else(|| eyre::eyre!("Completion response is missing text content."))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_cfg() -> LlmProviderConfig {
		serde_json::from_value(serde_json::json!({
			"model": "primary-model",
			"fallback_model": "fallback-model",
			"api_base": "http://localhost:9",
			"api_key": "secret",
			"max_tokens": 256,
			"temperature": 0.5,
		}))
		.expect("test config should deserialize")
	}

	#[test]
	fn parses_first_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "hello" } },
				{ "message": { "content": "ignored" } }
			]
		});
		assert_eq!(parse_completion_content(json).expect("parse failed"), "hello");
	}

	#[test]
	fn missing_content_is_an_error() {
		let json = serde_json::json!({ "choices": [] });
		assert!(parse_completion_content(json).is_err());
	}

	#[test]
	fn request_body_honors_options_over_catalog() {
		let cfg = test_cfg();
		let opts = CompletionOptions {
			fallback: true,
			temperature: Some(0.0),
			stop: Some(vec!["</output>".to_string()]),
			response_format: Some(serde_json::json!({ "type": "json_object" })),
		};
		let body = build_request_body(&cfg, &cfg.model, &[], &opts);

		assert_eq!(body["model"], "primary-model");
		assert_eq!(body["max_tokens"], 256);
		assert_eq!(body["temperature"], 0.0);
		assert_eq!(body["stop"][0], "</output>");
		assert_eq!(body["response_format"]["type"], "json_object");
	}

	#[test]
	fn request_body_falls_back_to_catalog_temperature() {
		let cfg = test_cfg();
		let body = build_request_body(&cfg, &cfg.model, &[], &CompletionOptions::default());

		assert_eq!(body["temperature"], serde_json::json!(0.5));
		assert!(body.get("stop").is_none());
	}
}
