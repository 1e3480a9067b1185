use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub analysis: Analysis,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub catalog: HashMap<String, LlmProviderConfig>,
}

/// One catalog entry. The pipeline only ever refers to entries by their
/// catalog key; raw model names never leave this crate's consumers.
#[derive(Clone, Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub model: String,
	pub fallback_model: Option<String>,
	pub api_base: String,
	pub api_key: String,
	#[serde(default = "default_completion_path")]
	pub path: String,
	pub max_tokens: Option<u32>,
	pub temperature: Option<f32>,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct Analysis {
	pub hyde_provider: String,
	pub description_provider: String,
	#[serde(default)]
	pub alternative_skills: bool,
	#[serde(default = "default_max_concurrent_queries")]
	pub max_concurrent_queries: u32,
}

fn default_completion_path() -> String {
	"/chat/completions".to_string()
}

fn default_max_attempts() -> u32 {
	1
}

fn default_timeout_ms() -> u64 {
	60_000
}

fn default_max_concurrent_queries() -> u32 {
	5
}
